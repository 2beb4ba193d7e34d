use std::{path::Path, sync::LazyLock};

use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{
    EnvFilter,
    fmt::{format::FmtSpan, writer::MakeWriterExt},
};

pub const LOG_PREFIX: &str = "focus-tracker";

fn env_filter(log_level: Option<LevelFilter>) -> EnvFilter {
    let level = log_level
        .map(|v| v.to_string())
        .unwrap_or_else(|| std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));

    EnvFilter::new(format!(
        "{}={level}",
        env!("CARGO_PKG_NAME").replace("-", "_"),
    ))
}

/// Installs the global subscriber. Console output is written when `show_std` is set, and a
/// daily rotating log file is kept when `log_dir` is given.
pub fn enable_logging(
    log_dir: Option<&Path>,
    log_level: Option<LevelFilter>,
    show_std: bool,
) -> Result<()> {
    let console = std::io::stderr.with_filter(move |_| show_std);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(log_level))
        .with_span_events(FmtSpan::CLOSE);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::Builder::new()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix(LOG_PREFIX)
                .build(dir)?;
            builder.with_writer(console.and(appender)).pretty().init();
        }
        None => builder.with_writer(console).pretty().init(),
    }
    Ok(())
}

pub static TEST_LOGGING: LazyLock<()> = LazyLock::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::TRACE)
        .with_test_writer()
        .pretty()
        .try_init();
});
