use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::{error::TrackingError, utils::time::seconds_ser};

pub const DEFAULT_UNHEALTHY_AFTER: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the probe's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthState {
    pub is_healthy: bool,
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<LastError>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "uptimeSeconds", with = "seconds_ser")]
    pub uptime: Duration,
}

/// Tracks probe failures. `error_count` is lifetime history and never goes down, while
/// `consecutive_failures` is what decides health: a success clears it.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    error_count: u64,
    consecutive_failures: u32,
    last_error: Option<LastError>,
    started_at: DateTime<Utc>,
    unhealthy_after: u32,
}

impl HealthMonitor {
    pub fn new(started_at: DateTime<Utc>, unhealthy_after: u32) -> Self {
        Self {
            error_count: 0,
            consecutive_failures: 0,
            last_error: None,
            started_at,
            unhealthy_after: unhealthy_after.max(1),
        }
    }

    pub fn record_error(&mut self, error: &TrackingError, at: DateTime<Utc>) {
        self.error_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(LastError {
            message: error.to_string(),
            timestamp: at,
        });

        if self.consecutive_failures == self.unhealthy_after {
            warn!(
                "Tracking became unhealthy after {} consecutive failures: {error}",
                self.consecutive_failures
            );
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures < self.unhealthy_after
    }

    pub fn health(&self, now: DateTime<Utc>) -> HealthState {
        HealthState {
            is_healthy: self.is_healthy(),
            error_count: self.error_count,
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            started_at: self.started_at,
            uptime: (now - self.started_at).max(Duration::zero()),
        }
    }
}

#[cfg(test)]
mod health_tests {
    use anyhow::anyhow;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{DEFAULT_UNHEALTHY_AFTER, HealthMonitor};
    use crate::error::TrackingError;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 5, 12, 0, 0).unwrap()
    }

    fn probe_error() -> TrackingError {
        TrackingError::Probe(anyhow!("permission denied"))
    }

    #[test]
    fn success_after_failure_streak_restores_health() {
        let mut monitor = HealthMonitor::new(start(), DEFAULT_UNHEALTHY_AFTER);
        for i in 0..10 {
            monitor.record_error(&probe_error(), start() + Duration::seconds(i));
        }
        assert!(!monitor.is_healthy());

        monitor.record_success();
        let health = monitor.health(start() + Duration::seconds(11));
        assert_eq!(health.error_count, 10);
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.is_healthy);
        assert_eq!(health.uptime, Duration::seconds(11));
        let last_error = health.last_error.unwrap();
        assert_eq!(last_error.timestamp, start() + Duration::seconds(9));
        assert!(last_error.message.contains("permission denied"));
    }

    #[test]
    fn unhealthy_only_at_threshold() {
        let mut monitor = HealthMonitor::new(start(), 3);
        monitor.record_error(&probe_error(), start());
        monitor.record_error(&probe_error(), start());
        assert!(monitor.is_healthy());
        monitor.record_error(&probe_error(), start());
        assert!(!monitor.is_healthy());
    }

    #[test]
    fn fresh_monitor_is_healthy() {
        let health = HealthMonitor::new(start(), DEFAULT_UNHEALTHY_AFTER).health(start());
        assert!(health.is_healthy);
        assert_eq!(health.error_count, 0);
        assert!(health.last_error.is_none());
    }
}
