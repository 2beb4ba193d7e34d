use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    categories::CategoryRule,
    tracking::{
        health::DEFAULT_UNHEALTHY_AFTER, insights::InsightsConfig,
        scheduler::DEFAULT_TRACKING_INTERVAL,
    },
};

/// Tracking settings, read from a camelCase JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackingConfig {
    /// Seconds between probes. Out of range values are clamped when tracking starts.
    pub tracking_interval: f64,
    /// Checked by callers before they start tracking.
    pub enable_application_tracking: bool,
    /// Consecutive probe failures after which tracking is reported unhealthy.
    pub unhealthy_after: u32,
    pub insights: InsightsConfig,
    /// Extra category rules, consulted before the built-in ones.
    pub categories: Vec<CategoryRule>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_interval: DEFAULT_TRACKING_INTERVAL.as_secs_f64(),
            enable_application_tracking: true,
            unhealthy_after: DEFAULT_UNHEALTHY_AFTER,
            insights: InsightsConfig::default(),
            categories: vec![],
        }
    }
}

impl TrackingConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}
