//! Watch command - periodic refresh with per-cycle summaries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use connwatch_core::{RefreshReport, RefreshScheduler};

pub async fn run(interval: Option<u64>, json: bool) -> Result<()> {
    let (monitor, settings) = super::build_monitor().await?;
    let monitor = Arc::new(monitor);

    let period = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| settings.refresh_interval());

    let handle = RefreshScheduler::new(monitor, period).spawn(move |report| {
        print_cycle(report, json);
    });

    tokio::signal::ctrl_c().await?;
    handle.abort();
    Ok(())
}

fn print_cycle(report: &RefreshReport, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(report) {
            println!("{}", line);
        }
        return;
    }

    let mut line = format!(
        "[{}] {} connections ({} TCP, {} UDP), {} processes",
        Local::now().format("%H:%M:%S"),
        report.summary.total,
        report.summary.tcp,
        report.summary.udp,
        report.summary.processes
    );

    if report.diff.has_changes() || report.diff.removed > 0 {
        line.push_str(&format!(
            " | +{} new, {} changed, -{} gone",
            report.diff.new, report.diff.changed, report.diff.removed
        ));
    }
    if let Some(ref verification) = report.verification_summary {
        line.push_str(&format!(" | {}", verification));
    }

    println!("{}", line);
}
