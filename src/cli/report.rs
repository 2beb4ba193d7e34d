use ansi_term::Colour::{Green, Red, Yellow};

use crate::{
    tracking::{SessionReport, insights::Insight},
    utils::time::format_duration,
};

/// Human readable summary of a finished session.
pub fn format_report(report: &SessionReport, insight: &Insight) -> String {
    let mut lines = vec![];

    if report.usage.is_empty() {
        lines.push("No application usage was recorded".to_string());
    }
    lines.extend(report.usage.iter().map(|share| {
        format!(
            "{}%\t{}\t{}",
            share.percentage,
            format_duration(share.record.cumulative),
            share.record.app.display_name
        )
    }));
    lines.push(String::new());

    let stats = &report.stats;
    lines.push(format!("Session\t\t{}", format_duration(stats.session_duration)));
    lines.push(format!(
        "Accuracy\t{}% of {} probes",
        (stats.tracking_accuracy * 100.).round() as u32,
        stats.total_ticks
    ));

    let health = &report.health;
    let status = if health.is_healthy {
        Green.paint("healthy").to_string()
    } else {
        Red.paint(format!(
            "unhealthy, {} consecutive failures",
            health.consecutive_failures
        ))
        .to_string()
    };
    lines.push(format!("Health\t\t{status} ({} errors)", health.error_count));

    lines.push(format!("Focus score\t{}", insight.focus_score));
    lines.extend(
        insight
            .recommendations
            .iter()
            .map(|recommendation| format!("{} {recommendation}", Yellow.paint("*"))),
    );

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
