//! The tracking engine. [TrackingService] owns one polling loop at a time and exposes the
//! consumer API; the submodules hold the pieces it is built from:
//!  - [scheduler] drives ticks on a fixed anchor.
//!  - [aggregator] accounts time per application.
//!  - [health] follows probe failures.
//!  - [insights] turns a usage snapshot into productivity signals.
//!
//! Every tick runs probe → update under a single lock acquisition for the update, so readers
//! never see half of a tick.

pub mod aggregator;
pub mod health;
pub mod insights;
pub mod scheduler;

use std::{
    future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use aggregator::{UsageAggregator, UsageRecord, UsageShare};
use chrono::{DateTime, Duration, Utc};
use health::{HealthMonitor, HealthState};
use insights::{Insight, InsightsEngine, SessionActivity};
use scheduler::{PollScheduler, clamp_interval};
use serde::Serialize;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, trace};

use crate::{
    categories::CategoryResolver,
    config::TrackingConfig,
    error::TrackingError,
    probe::{AppIdentity, ForegroundProbe},
    utils::{
        clock::Clock,
        time::{format_duration, seconds_ser, to_delta},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Running,
    Stopped,
}

/// How a new session treats the usage of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    /// Discard previous usage. This is what [TrackingService::start_tracking] does.
    Fresh,
    /// Keep accumulating on top of the previous session's usage.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStats {
    #[serde(rename = "sessionDurationSeconds", with = "seconds_ser")]
    pub session_duration: Duration,
    /// Share of ticks whose probe succeeded, 0 before the first tick.
    pub tracking_accuracy: f64,
    #[serde(rename = "averageSecondsPerApp", with = "seconds_ser")]
    pub average_time_per_app: Duration,
    pub total_ticks: u64,
    pub successful_ticks: u64,
}

/// Final state handed out by [TrackingService::stop_tracking].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub usage: Vec<UsageShare>,
    pub health: HealthState,
    pub stats: TrackingStats,
}

#[derive(Debug, Default, Clone, Copy)]
struct TickCounters {
    total: u64,
    successful: u64,
}

struct TrackerState {
    phase: SessionPhase,
    usage: UsageAggregator,
    health: HealthMonitor,
    ticks: TickCounters,
    session_started: Option<Instant>,
    session_ended: Option<Instant>,
    /// Wall time the last stop was reported at. Redundant stops report health as of this time.
    stopped_at: Option<DateTime<Utc>>,
    /// Time up to which elapsed time has been credited to an application.
    accounted_until: Instant,
}

struct ActiveSession {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking probe must not take the accounting down with it.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_tick(
    state: &Mutex<TrackerState>,
    probe: &Mutex<Box<dyn ForegroundProbe>>,
    clock: &dyn Clock,
) {
    let probed = lock(probe).probe();
    let instant = clock.instant();
    let now = clock.time();

    let mut state = lock(state);
    if state.phase != SessionPhase::Running {
        return;
    }
    state.ticks.total += 1;

    match probed {
        Ok(app) => {
            // The open interval belongs to the application that held focus during it, which is
            // the one seen by the previous successful probe. Time before any successful probe
            // belongs to no application.
            let elapsed = to_delta(instant.saturating_duration_since(state.accounted_until));
            state.accounted_until = instant;
            state.usage.extend_current(elapsed, now);
            state.usage.observe(&app, Duration::zero(), now);
            state.health.record_success();
            state.ticks.successful += 1;
            trace!("Observed {}, closed an interval of {elapsed}", app.bundle_id);
        }
        Err(e) => {
            let error = TrackingError::Probe(e);
            debug!("{error:?}");
            state.health.record_error(&error, now);
        }
    }
}

/// Long-lived tracking service. Create it once and reuse it across sessions; share it by
/// reference or `Arc`.
pub struct TrackingService {
    state: Arc<Mutex<TrackerState>>,
    probe: Arc<Mutex<Box<dyn ForegroundProbe>>>,
    resolver: Arc<dyn CategoryResolver>,
    clock: Arc<dyn Clock>,
    insights: InsightsEngine,
    /// Serializes start/stop. Held across the wait for the loop to finish.
    session: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl TrackingService {
    pub fn new(
        config: TrackingConfig,
        probe: Box<dyn ForegroundProbe>,
        resolver: Arc<dyn CategoryResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = TrackerState {
            phase: SessionPhase::Idle,
            usage: UsageAggregator::new(),
            health: HealthMonitor::new(clock.time(), config.unhealthy_after),
            ticks: TickCounters::default(),
            session_started: None,
            session_ended: None,
            stopped_at: None,
            accounted_until: clock.instant(),
        };

        Self {
            state: Arc::new(Mutex::new(state)),
            probe: Arc::new(Mutex::new(probe)),
            resolver,
            clock,
            insights: InsightsEngine::new(config.insights),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts a fresh session polling every `interval_seconds`. Invalid intervals are clamped,
    /// and a session that is already running is stopped and replaced.
    pub async fn start_tracking(&self, interval_seconds: f64) {
        self.start_session(interval_seconds, SessionStart::Fresh).await
    }

    #[instrument(skip(self))]
    pub async fn start_session(&self, interval_seconds: f64, start: SessionStart) {
        let interval = clamp_interval(interval_seconds);
        let mut session = self.session.lock().await;

        if let Some(active) = session.take() {
            info!("Tracking is already running, replacing the session");
            self.finish(active).await;
        }

        {
            let mut state = lock(&self.state);
            if start == SessionStart::Fresh {
                state.usage.reset();
                state.ticks = TickCounters::default();
            }
            let now = self.clock.instant();
            state.accounted_until = now;
            state.session_started = Some(now);
            state.session_ended = None;
            state.stopped_at = None;
            state.phase = SessionPhase::Running;
        }

        let shutdown = CancellationToken::new();
        let scheduler = PollScheduler::new(interval, shutdown.clone(), self.clock.clone());
        let state = self.state.clone();
        let probe = self.probe.clone();
        let clock = self.clock.clone();
        let handle = tokio::spawn(
            scheduler
                .run(move || future::ready(run_tick(&state, &probe, clock.as_ref())))
                .instrument(info_span!("tracking_session")),
        );

        *session = Some(ActiveSession { shutdown, handle });
    }

    /// Stops the running session and returns its final state. Waits for an in-flight tick,
    /// then credits the time since the last successful probe to the last known application.
    /// Stopping when nothing runs changes nothing and returns the same report again.
    pub async fn stop_tracking(&self) -> SessionReport {
        let mut session = self.session.lock().await;
        match session.take() {
            Some(active) => self.finish(active).await,
            None => {
                let error = TrackingError::State("tracking is not running".into());
                debug!("Ignoring stop: {error}");
                let mut state = lock(&self.state);
                if state.stopped_at.is_none() {
                    state.stopped_at = Some(self.clock.time());
                }
            }
        }
        drop(session);
        self.report()
    }

    async fn finish(&self, active: ActiveSession) {
        active.shutdown.cancel();
        if let Err(e) = active.handle.await {
            error!("Tracking loop ended abnormally {e:?}");
        }

        let instant = self.clock.instant();
        let now = self.clock.time();
        let mut state = lock(&self.state);
        let pending = to_delta(instant.saturating_duration_since(state.accounted_until));
        state.usage.extend_current(pending, now);
        state.accounted_until = instant;
        state.session_ended = Some(instant);
        state.stopped_at = Some(now);
        state.phase = SessionPhase::Stopped;

        info!(
            "Tracking stopped, {} tracked across {} app(s)",
            format_duration(state.usage.total_elapsed()),
            state.usage.app_count()
        );
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.state).phase
    }

    pub fn is_tracking(&self) -> bool {
        self.phase() == SessionPhase::Running
    }

    /// Usage of the current (or last) session, most used first.
    pub fn current_usage(&self) -> Vec<UsageShare> {
        lock(&self.state).usage.snapshot()
    }

    /// Application reported by the most recent successful probe.
    pub fn current_application(&self) -> Option<AppIdentity> {
        lock(&self.state).usage.current_app().cloned()
    }

    pub fn most_used_application(&self) -> Option<UsageRecord> {
        lock(&self.state).usage.most_used()
    }

    pub fn tracking_health(&self) -> HealthState {
        lock(&self.state).health.health(self.clock.time())
    }

    pub fn tracking_stats(&self) -> TrackingStats {
        let state = lock(&self.state);
        self.stats(&state)
    }

    pub fn productivity_insights(&self) -> Insight {
        let (usage, activity) = {
            let state = lock(&self.state);
            let activity = SessionActivity {
                total_elapsed: state.usage.total_elapsed(),
                switch_count: state.usage.switch_count(),
            };
            (state.usage.snapshot(), activity)
        };
        self.insights
            .insights(&usage, activity, self.resolver.as_ref())
    }

    fn stats(&self, state: &TrackerState) -> TrackingStats {
        let session_duration = match (state.session_started, state.session_ended) {
            (Some(started), Some(ended)) => to_delta(ended.saturating_duration_since(started)),
            (Some(started), None) => {
                to_delta(self.clock.instant().saturating_duration_since(started))
            }
            (None, _) => Duration::zero(),
        };

        let TickCounters { total, successful } = state.ticks;
        let tracking_accuracy = if total == 0 {
            0.
        } else {
            successful as f64 / total as f64
        };

        let apps = i32::try_from(state.usage.app_count()).unwrap_or(i32::MAX);
        let average_time_per_app = if apps == 0 {
            Duration::zero()
        } else {
            state.usage.total_elapsed() / apps
        };

        TrackingStats {
            session_duration,
            tracking_accuracy,
            average_time_per_app,
            total_ticks: total,
            successful_ticks: successful,
        }
    }

    fn report(&self) -> SessionReport {
        let state = lock(&self.state);
        let reported_at = state.stopped_at.unwrap_or_else(|| self.clock.time());
        SessionReport {
            usage: state.usage.snapshot(),
            health: state.health.health(reported_at),
            stats: self.stats(&state),
        }
    }
}

#[cfg(test)]
mod service_tests {
    use std::{sync::Arc, time::Duration as StdDuration};

    use anyhow::anyhow;
    use chrono::Duration;

    use super::{SessionPhase, SessionStart, TrackingService};
    use crate::{
        categories::CategoryTable,
        config::TrackingConfig,
        probe::{AppIdentity, ForegroundProbe, MockForegroundProbe},
        utils::{clock::TestClock, logging::TEST_LOGGING},
    };

    /// Probe that walks through `script` in a loop. `None` entries fail.
    fn scripted_probe(script: &[Option<&'static str>]) -> Box<dyn ForegroundProbe> {
        let mut probe = MockForegroundProbe::new();
        let mut steps = script.to_vec().into_iter().cycle();
        probe
            .expect_probe()
            .returning(move || match steps.next().flatten() {
                Some(id) => Ok(AppIdentity::new(id, id)),
                None => Err(anyhow!("no focused window")),
            });
        Box::new(probe)
    }

    fn service(script: &[Option<&'static str>]) -> TrackingService {
        TrackingService::new(
            TrackingConfig::default(),
            scripted_probe(script),
            Arc::new(CategoryTable::builtin()),
            Arc::new(TestClock::new()),
        )
    }

    async fn run_for(millis: u64) {
        tokio::time::sleep(StdDuration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_accounts_every_second() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a"), Some("com.a"), Some("com.b")]);

        service.start_tracking(1.).await;
        assert!(service.is_tracking());
        run_for(5500).await;
        let report = service.stop_tracking().await;

        assert_eq!(service.phase(), SessionPhase::Stopped);
        assert_eq!(report.usage.len(), 2);
        // Focus: a [0, 2), b [2, 3), a [3, 5), b [5, 5.5).
        let a = &report.usage[0];
        assert_eq!(&*a.record.app.bundle_id, "com.a");
        assert_eq!(a.record.cumulative, Duration::seconds(4));
        assert_eq!(a.record.sample_count, 4);
        assert_eq!(a.percentage, 73);
        let b = &report.usage[1];
        assert_eq!(b.record.cumulative, Duration::milliseconds(1500));
        assert_eq!(b.record.sample_count, 2);
        assert_eq!(b.percentage, 27);

        assert_eq!(report.stats.session_duration, Duration::milliseconds(5500));
        assert_eq!(report.stats.total_ticks, 6);
        assert_eq!(report.stats.tracking_accuracy, 1.);
        assert_eq!(report.stats.average_time_per_app, Duration::milliseconds(2750));
    }

    #[tokio::test(start_paused = true)]
    async fn switch_credits_previous_app_until_the_switch() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a"), Some("com.b")]);

        service.start_tracking(1.).await;
        run_for(1500).await;
        let report = service.stop_tracking().await;

        assert_eq!(report.usage.len(), 2);
        assert_eq!(&*report.usage[0].record.app.bundle_id, "com.a");
        assert_eq!(report.usage[0].record.cumulative, Duration::seconds(1));
        assert_eq!(report.usage[0].percentage, 67);
        assert_eq!(&*report.usage[1].record.app.bundle_id, "com.b");
        assert_eq!(report.usage[1].record.cumulative, Duration::milliseconds(500));
        assert_eq!(report.usage[1].percentage, 33);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_gap_belongs_to_last_known_app() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a"), None, None, Some("com.b")]);

        service.start_tracking(1.).await;
        run_for(3500).await;
        let report = service.stop_tracking().await;

        let a = &report.usage[0];
        assert_eq!(&*a.record.app.bundle_id, "com.a");
        assert_eq!(a.record.cumulative, Duration::seconds(3));
        assert_eq!(a.record.sample_count, 1);
        let b = &report.usage[1];
        assert_eq!(b.record.cumulative, Duration::milliseconds(500));
        assert_eq!(report.health.error_count, 2);
        assert_eq!(report.stats.successful_ticks, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_recorded_and_recovered() {
        *TEST_LOGGING;
        let mut script = vec![None; 10];
        script.push(Some("com.a"));
        let service = service(&script);

        service.start_tracking(1.).await;
        run_for(3500).await;
        let health = service.tracking_health();
        assert!(!health.is_healthy);
        assert_eq!(health.consecutive_failures, 4);
        assert!(service.current_application().is_none());
        assert!(service.is_tracking());

        run_for(7000).await;
        let report = service.stop_tracking().await;

        assert_eq!(report.health.error_count, 10);
        assert_eq!(report.health.consecutive_failures, 0);
        assert!(report.health.is_healthy);
        // No application was known before the first success, so only the time after it counts.
        assert_eq!(report.usage[0].record.cumulative, Duration::milliseconds(500));
        assert_eq!(report.usage[0].percentage, 100);
        assert_eq!(report.stats.total_ticks, 11);
        assert_eq!(report.stats.successful_ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_keeps_current_application() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a"), None]);

        service.start_tracking(1.).await;
        run_for(1500).await;

        assert_eq!(
            service.current_application(),
            Some(AppIdentity::new("com.a", "com.a"))
        );
        assert_eq!(service.tracking_health().error_count, 1);
        service.stop_tracking().await;
    }

    #[tokio::test(start_paused = true)]
    async fn restart_begins_with_empty_usage() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a")]);

        service.start_tracking(1.).await;
        run_for(2500).await;
        assert!(!service.stop_tracking().await.usage.is_empty());

        service.start_tracking(1.).await;
        assert!(service.current_usage().is_empty());
        assert!(service.most_used_application().is_none());
        assert!(service.current_application().is_none());
        service.stop_tracking().await;
    }

    #[tokio::test(start_paused = true)]
    async fn merge_keeps_previous_usage_without_the_gap() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a")]);

        service.start_tracking(1.).await;
        run_for(2500).await;
        service.stop_tracking().await;

        run_for(10_000).await;
        service.start_session(1., SessionStart::Merge).await;
        run_for(1500).await;
        let report = service.stop_tracking().await;

        assert_eq!(report.usage[0].record.cumulative, Duration::seconds(4));
        assert_eq!(report.usage[0].record.sample_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_stop_is_a_no_op() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a"), None]);

        let idle = service.stop_tracking().await;
        assert!(idle.usage.is_empty());
        assert_eq!(service.phase(), SessionPhase::Idle);

        run_for(2000).await;
        assert_eq!(idle, service.stop_tracking().await);

        service.start_tracking(1.).await;
        run_for(3500).await;
        let first = service.stop_tracking().await;
        run_for(60_000).await;
        let second = service.stop_tracking().await;

        assert_eq!(first, second);
        assert_eq!(first.health.uptime, Duration::milliseconds(5500));
        assert!(!service.is_tracking());
        // Live health keeps moving, the report does not.
        assert_eq!(service.tracking_health().uptime, Duration::milliseconds(65_500));
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_running_replaces_session() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a")]);

        service.start_tracking(1.).await;
        run_for(2500).await;
        service.start_tracking(2.).await;
        assert!(service.current_usage().is_empty());

        run_for(4500).await;
        let report = service.stop_tracking().await;

        assert_eq!(report.usage[0].record.cumulative, Duration::milliseconds(4500));
        assert_eq!(report.stats.total_ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_interval_falls_back_to_minimum() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a")]);

        service.start_tracking(0.).await;
        run_for(3500).await;
        let report = service.stop_tracking().await;

        assert_eq!(report.stats.total_ticks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_interval_keeps_the_loop_alive() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a")]);

        service.start_tracking(1e19).await;
        run_for(90_000).await;
        assert!(service.is_tracking());
        assert_eq!(service.tracking_stats().total_ticks, 1);

        let report = service.stop_tracking().await;
        assert_eq!(report.stats.total_ticks, 1);
        assert_eq!(report.usage[0].record.cumulative, Duration::seconds(90));
        assert_eq!(service.phase(), SessionPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn infinite_interval_uses_default() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a")]);

        service.start_tracking(f64::INFINITY).await;
        run_for(10_500).await;
        let report = service.stop_tracking().await;

        assert_eq!(report.stats.total_ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn readers_see_whole_ticks_while_running() {
        *TEST_LOGGING;
        let service = service(&[Some("com.a")]);

        service.start_tracking(1.).await;
        run_for(2500).await;

        let usage = service.current_usage();
        assert_eq!(usage.len(), 1);
        assert_eq!(usage[0].record.cumulative, Duration::seconds(2));
        assert_eq!(usage[0].percentage, 100);
        assert_eq!(
            service.tracking_stats().session_duration,
            Duration::milliseconds(2500)
        );
        service.stop_tracking().await;
    }

    #[tokio::test(start_paused = true)]
    async fn insights_follow_usage() {
        *TEST_LOGGING;
        let service = service(&[Some("nvim"), Some("nvim"), Some("spotify"), Some("spotify")]);
        assert_eq!(service.productivity_insights().focus_score, 0);

        service.start_tracking(1.).await;
        run_for(3500).await;
        service.stop_tracking().await;

        let insight = service.productivity_insights();
        assert_eq!(insight.focus_score, 57);
        assert_eq!(&*insight.productive_apps[0].app.bundle_id, "nvim");
        assert_eq!(&*insight.distraction_apps[0].app.bundle_id, "spotify");
        assert_eq!(insight.recommendations.len(), 1);
    }
}
