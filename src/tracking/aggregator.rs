use std::{cmp::Reverse, collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    probe::AppIdentity,
    utils::{percentage::distribute_percentages, time::seconds_ser},
};

/// Accumulated usage of a single application within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub app: AppIdentity,
    #[serde(rename = "cumulativeSeconds", with = "seconds_ser")]
    pub cumulative: Duration,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub sample_count: u64,
    #[serde(skip)]
    order: u64,
}

impl UsageRecord {
    fn new(app: AppIdentity, at: DateTime<Utc>, order: u64) -> Self {
        Self {
            app,
            cumulative: Duration::zero(),
            first_seen_at: at,
            last_seen_at: at,
            sample_count: 0,
            order,
        }
    }

    /// Ranking used by snapshots: most time first, then earliest seen, then first observed.
    fn rank_key(&self) -> (Reverse<Duration>, DateTime<Utc>, u64) {
        (Reverse(self.cumulative), self.first_seen_at, self.order)
    }
}

/// A [UsageRecord] annotated with its share of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageShare {
    #[serde(flatten)]
    pub record: UsageRecord,
    pub percentage: u8,
}

/// Per-application time accounting for one session.
///
/// The sum of every record's `cumulative` is always exactly `total_elapsed`: both are only
/// ever changed together by the same duration.
#[derive(Debug, Default, Clone)]
pub struct UsageAggregator {
    records: HashMap<Arc<str>, UsageRecord>,
    total_elapsed: Duration,
    current_app: Option<AppIdentity>,
    switch_count: u64,
    next_order: u64,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits `elapsed` to `app` and makes it the current application. Observing a different
    /// application than the current one closes the previous open interval.
    pub fn observe(&mut self, app: &AppIdentity, elapsed: Duration, at: DateTime<Utc>) {
        let elapsed = elapsed.max(Duration::zero());

        if self
            .current_app
            .as_ref()
            .is_some_and(|current| current.bundle_id != app.bundle_id)
        {
            self.switch_count += 1;
        }

        let next_order = &mut self.next_order;
        let record = self
            .records
            .entry(app.bundle_id.clone())
            .or_insert_with(|| {
                *next_order += 1;
                UsageRecord::new(app.clone(), at, *next_order)
            });

        // Display names can change between probes (e.g. after an update), keep the latest one.
        record.app.display_name = app.display_name.clone();
        record.cumulative += elapsed;
        record.last_seen_at = at;
        record.sample_count += 1;
        self.total_elapsed += elapsed;
        self.current_app = Some(app.clone());
    }

    /// Credits `elapsed` to the current application without counting a sample. Used to close
    /// the open interval when a new probe comes in and when a session stops.
    pub fn extend_current(&mut self, elapsed: Duration, at: DateTime<Utc>) {
        let elapsed = elapsed.max(Duration::zero());
        let Some(current) = &self.current_app else {
            return;
        };
        if let Some(record) = self.records.get_mut(&current.bundle_id) {
            record.cumulative += elapsed;
            record.last_seen_at = at;
            self.total_elapsed += elapsed;
        }
    }

    fn ranked(&self) -> Vec<&UsageRecord> {
        let mut records = self.records.values().collect::<Vec<_>>();
        records.sort_by_key(|v| v.rank_key());
        records
    }

    /// Records ordered from the most used down, with percentages summing to exactly 100.
    /// Empty while no time has been accounted.
    pub fn snapshot(&self) -> Vec<UsageShare> {
        let ranked = self.ranked();
        let durations = ranked.iter().map(|v| v.cumulative).collect::<Vec<_>>();
        let percentages = distribute_percentages(&durations, self.total_elapsed);

        ranked
            .into_iter()
            .zip(percentages)
            .map(|(record, percentage)| UsageShare {
                record: record.clone(),
                percentage,
            })
            .collect()
    }

    pub fn most_used(&self) -> Option<UsageRecord> {
        self.records.values().min_by_key(|v| v.rank_key()).cloned()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total_elapsed(&self) -> Duration {
        self.total_elapsed
    }

    pub fn current_app(&self) -> Option<&AppIdentity> {
        self.current_app.as_ref()
    }

    pub fn app_count(&self) -> usize {
        self.records.len()
    }

    /// How many times the current application changed.
    pub fn switch_count(&self) -> u64 {
        self.switch_count
    }
}
