//! Error kinds produced by the tracking core.
//!
//! None of these escape `start_tracking`/`stop_tracking`: probe failures are recorded by the
//! health monitor, invalid intervals are clamped and redundant lifecycle calls are no-ops.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackingError {
    /// Transient failure of the OS foreground query.
    #[error("Foreground probe failed: {0}")]
    Probe(#[source] anyhow::Error),

    #[error("Invalid tracking configuration: {0}")]
    Config(String),

    #[error("Invalid lifecycle transition: {0}")]
    State(String),
}
