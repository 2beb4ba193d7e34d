use std::time::Duration;

use tokio::select;
use tracing::{error, info};

/// Resolves when the session should end: after `limit` if one is given, or when the process
/// receives Ctrl-C.
pub async fn wait_for_session_end(limit: Option<Duration>) {
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Can't listen for Ctrl-C {e:?}");
            // Without a signal handler only the time limit can end the session.
            std::future::pending::<()>().await;
        }
    };

    match limit {
        Some(limit) => select! {
            _ = interrupted => info!("Interrupted, stopping tracking"),
            _ = tokio::time::sleep(limit) => info!("Session time is up"),
        },
        None => interrupted.await,
    }
}
