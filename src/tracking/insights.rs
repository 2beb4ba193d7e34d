//! Productivity signals derived on demand from a usage snapshot.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    categories::CategoryResolver,
    probe::AppIdentity,
    utils::{
        percentage::percent_of,
        time::{as_seconds, seconds_ser},
    },
};

use super::aggregator::UsageShare;

/// Switching rate is meaningless for short sessions.
const SWITCH_RULE_MIN_SESSION: Duration = Duration::minutes(10);

/// Which categories count as productive or distracting, and the thresholds of the
/// recommendation rules. Categories listed in neither set are neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InsightsConfig {
    pub productive_categories: Vec<String>,
    pub distraction_categories: Vec<String>,
    /// Share of the session (percent) above which the top distraction is called out.
    pub distraction_share_threshold: u8,
    /// Focus score below which distraction-related advice is given.
    pub focus_floor: u8,
    /// Focus score below which the session as a whole is flagged.
    pub low_focus_floor: u8,
    pub max_switches_per_hour: u32,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            productive_categories: ["development", "productivity", "design"]
                .map(String::from)
                .to_vec(),
            distraction_categories: ["media", "communication", "other"]
                .map(String::from)
                .to_vec(),
            distraction_share_threshold: 10,
            focus_floor: 70,
            low_focus_floor: 40,
            max_switches_per_hour: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInsight {
    pub app: AppIdentity,
    pub category: Arc<str>,
    pub icon: Arc<str>,
    pub is_recognized: bool,
    #[serde(rename = "seconds", with = "seconds_ser")]
    pub time: Duration,
    pub percentage: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub productive: Vec<AppInsight>,
    pub distraction: Vec<AppInsight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub focus_score: u8,
    pub productive_apps: Vec<AppInsight>,
    pub distraction_apps: Vec<AppInsight>,
    pub recommendations: Vec<String>,
}

/// Session-wide figures the rules need besides the per-app breakdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionActivity {
    pub total_elapsed: Duration,
    pub switch_count: u64,
}

impl SessionActivity {
    fn switches_per_hour(&self) -> Option<f64> {
        if self.total_elapsed < SWITCH_RULE_MIN_SESSION {
            return None;
        }
        Some(self.switch_count as f64 * 3600. / as_seconds(self.total_elapsed))
    }
}

pub struct InsightsEngine {
    config: InsightsConfig,
}

impl InsightsEngine {
    pub fn new(config: InsightsConfig) -> Self {
        Self { config }
    }

    fn is_in(categories: &[String], category: &str) -> bool {
        categories.iter().any(|v| v.eq_ignore_ascii_case(category))
    }

    /// Splits the usage into productive and distracting applications, keeping the snapshot's
    /// most-used-first order.
    pub fn classify(
        &self,
        usage: &[UsageShare],
        resolver: &dyn CategoryResolver,
    ) -> Classification {
        let mut classification = Classification::default();

        for share in usage {
            let app = &share.record.app;
            let info = resolver.resolve(&app.bundle_id, &app.display_name);
            let insight = AppInsight {
                app: app.clone(),
                category: info.category,
                icon: info.icon,
                is_recognized: info.is_recognized,
                time: share.record.cumulative,
                percentage: share.percentage,
            };

            if Self::is_in(&self.config.productive_categories, &insight.category) {
                classification.productive.push(insight);
            } else if Self::is_in(&self.config.distraction_categories, &insight.category) {
                classification.distraction.push(insight);
            }
        }

        classification
    }

    /// Percentage of the tracked time spent in productive applications, 0 when nothing was
    /// tracked.
    pub fn focus_score(&self, productive: &[AppInsight], total_elapsed: Duration) -> u8 {
        let productive_time = productive
            .iter()
            .fold(Duration::zero(), |ac, v| ac + v.time);
        percent_of(productive_time, total_elapsed)
    }

    pub fn recommendations(
        &self,
        classification: &Classification,
        focus_score: u8,
        activity: &SessionActivity,
    ) -> Vec<String> {
        let config = &self.config;
        let mut recommendations = vec![];

        if let Some(top) = classification.distraction.first() {
            if top.percentage > config.distraction_share_threshold
                && focus_score < config.focus_floor
            {
                recommendations.push(format!(
                    "{} took {}% of this session. Consider limiting it while you focus.",
                    top.app.display_name, top.percentage
                ));
            }
        }

        if activity.total_elapsed > Duration::zero() && focus_score < config.low_focus_floor {
            recommendations.push(format!(
                "Only {focus_score}% of tracked time went to productive apps. Try closing distracting apps before the next session."
            ));
        }

        if let Some(rate) = activity.switches_per_hour() {
            if focus_score < config.focus_floor && rate > f64::from(config.max_switches_per_hour) {
                recommendations.push(format!(
                    "You switched apps about {} times per hour. Batching messages and breaks reduces context switching.",
                    rate.round() as u64
                ));
            }
        }

        recommendations
    }

    #[instrument(skip_all)]
    pub fn insights(
        &self,
        usage: &[UsageShare],
        activity: SessionActivity,
        resolver: &dyn CategoryResolver,
    ) -> Insight {
        let classification = self.classify(usage, resolver);
        let focus_score = self.focus_score(&classification.productive, activity.total_elapsed);
        let recommendations = self.recommendations(&classification, focus_score, &activity);

        Insight {
            focus_score,
            productive_apps: classification.productive,
            distraction_apps: classification.distraction,
            recommendations,
        }
    }
}
