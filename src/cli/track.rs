use std::{sync::Arc, time::Duration};

use anyhow::{Result, bail};
use serde::Serialize;
use tokio::select;
use tracing::{info, warn};

use crate::{
    categories::CategoryTable,
    config::TrackingConfig,
    probe::GenericForegroundProbe,
    tracking::{SessionReport, TrackingService, insights::Insight},
    utils::clock::DefaultClock,
};

use super::{report::format_report, shutdown::wait_for_session_end};

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, clap::Args)]
pub struct TrackCommand {
    #[arg(
        long,
        short,
        help = "Seconds between probes. Overrides trackingInterval from the configuration"
    )]
    interval: Option<f64>,
    #[arg(
        long,
        short,
        help = "Stop after this many seconds. Runs until Ctrl-C when omitted"
    )]
    duration: Option<u64>,
    #[arg(long, help = "Print the result as JSON")]
    json: bool,
}

#[derive(Serialize)]
struct TrackOutput<'a> {
    report: &'a SessionReport,
    insight: &'a Insight,
}

/// Runs a single tracking session and prints what it found.
pub async fn process_track_command(
    config: TrackingConfig,
    TrackCommand {
        interval,
        duration,
        json,
    }: TrackCommand,
) -> Result<()> {
    if !config.enable_application_tracking {
        bail!("Application tracking is disabled in the configuration");
    }

    let probe = GenericForegroundProbe::new()?;
    let resolver = Arc::new(CategoryTable::with_rules(config.categories.clone()));
    let interval = interval.unwrap_or(config.tracking_interval);
    let service = TrackingService::new(config, Box::new(probe), resolver, Arc::new(DefaultClock));

    service.start_tracking(interval).await;
    info!("Tracking started");
    watch_session(&service, duration.map(Duration::from_secs)).await;

    let report = service.stop_tracking().await;
    let insight = service.productivity_insights();

    if json {
        let output = TrackOutput {
            report: &report,
            insight: &insight,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", format_report(&report, &insight));
    }
    Ok(())
}

/// Waits for the session to end, surfacing a sustained unhealthy probe as an advisory. The
/// session keeps running regardless.
async fn watch_session(service: &TrackingService, limit: Option<Duration>) {
    let end = wait_for_session_end(limit);
    tokio::pin!(end);
    let mut check = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    let mut advised = false;

    loop {
        select! {
            _ = &mut end => break,
            _ = check.tick() => {
                let health = service.tracking_health();
                if !health.is_healthy && !advised {
                    let reason = health
                        .last_error
                        .map(|v| v.message)
                        .unwrap_or_default();
                    warn!("Tracking is unhealthy: {reason}");
                    eprintln!(
                        "warning: focused application can't be detected ({reason}), usage may be incomplete"
                    );
                }
                advised = !health.is_healthy;
            }
        }
    }
}
