use std::{future::Future, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{error::TrackingError, utils::clock::Clock};

pub const MIN_TRACKING_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TRACKING_INTERVAL: Duration = Duration::from_secs(5);
pub const MAX_TRACKING_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Checks a requested polling interval.
pub fn validate_interval(seconds: f64) -> Result<Duration, TrackingError> {
    if !seconds.is_finite() || seconds <= 0. {
        return Err(TrackingError::Config(format!(
            "tracking interval must be a positive number of seconds, got {seconds}"
        )));
    }
    if seconds > MAX_TRACKING_INTERVAL.as_secs_f64() {
        return Err(TrackingError::Config(format!(
            "tracking interval {seconds}s is above the {}s maximum",
            MAX_TRACKING_INTERVAL.as_secs()
        )));
    }
    let interval = Duration::try_from_secs_f64(seconds)
        .map_err(|e| TrackingError::Config(format!("tracking interval {seconds}s: {e}")))?;
    if interval < MIN_TRACKING_INTERVAL {
        return Err(TrackingError::Config(format!(
            "tracking interval {seconds}s is below the {}s minimum",
            MIN_TRACKING_INTERVAL.as_secs()
        )));
    }
    Ok(interval)
}

/// Like [validate_interval] but never fails: out of range values are clamped into
/// `MIN_TRACKING_INTERVAL..=MAX_TRACKING_INTERVAL` and values that aren't numbers at all fall
/// back to the default.
pub fn clamp_interval(seconds: f64) -> Duration {
    validate_interval(seconds).unwrap_or_else(|e| {
        let interval = if !seconds.is_finite() {
            DEFAULT_TRACKING_INTERVAL
        } else if seconds > MAX_TRACKING_INTERVAL.as_secs_f64() {
            MAX_TRACKING_INTERVAL
        } else {
            MIN_TRACKING_INTERVAL
        };
        warn!("{e}, using {}s instead", interval.as_secs_f64());
        interval
    })
}

/// Drives the tracking ticks. Tick `n` is due at `anchor + n * interval`, so time spent inside
/// a tick never shifts the following ones.
pub struct PollScheduler {
    interval: Duration,
    shutdown: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl PollScheduler {
    pub fn new(interval: Duration, shutdown: CancellationToken, clock: Arc<dyn Clock>) -> Self {
        Self {
            interval: interval.clamp(MIN_TRACKING_INTERVAL, MAX_TRACKING_INTERVAL),
            shutdown,
            clock,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When tick `tick` is due, or `None` if that lies beyond what an [Instant] can hold.
    fn due(&self, anchor: Instant, tick: u32) -> Option<Instant> {
        self.interval
            .checked_mul(tick)
            .and_then(|offset| anchor.checked_add(offset))
    }

    /// Runs ticks until the shutdown token is cancelled. A tick in progress always runs to
    /// completion, cancellation is only observed between ticks.
    pub async fn run<F, Fut>(self, mut on_tick: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let anchor = self.clock.instant();
        let mut tick: u32 = 0;
        info!("Tracking every {:?}", self.interval);

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            on_tick().await;

            tick = tick.saturating_add(1);
            let now = self.clock.instant();
            let mut due = self.due(anchor, tick);
            if due.is_some_and(|v| v <= now) {
                let behind = now.duration_since(anchor).as_nanos() / self.interval.as_nanos();
                let next = u32::try_from(behind + 1).unwrap_or(u32::MAX);
                warn!(
                    "Tick overran its slot, skipping {} tick(s)",
                    next.saturating_sub(tick)
                );
                tick = next;
                due = self.due(anchor, tick);
            }

            let Some(due) = due else {
                error!("Tick {tick} can't be scheduled, waiting for the session to stop");
                self.shutdown.cancelled().await;
                break;
            };

            tokio::select! {
                // The in-flight tick has finished by now, so stopping here never loses its
                // update.
                _ = self.shutdown.cancelled() => break,
                _ = self.clock.sleep_until(due) => ()
            }
        }
        debug!("Tracking loop stopped after {tick} tick(s)");
    }
}
