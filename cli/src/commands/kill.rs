//! Kill command - terminate the processes behind connections.

use anyhow::{bail, Result};
use connwatch_core::{KillReport, RefreshOutcome, UniqueKey};

pub async fn run(pids: Vec<u32>, port: Option<u16>, json: bool) -> Result<()> {
    if pids.is_empty() && port.is_none() {
        bail!("nothing to kill: give one or more pids, or --port");
    }

    let (monitor, _settings) = super::build_monitor().await?;
    match monitor.refresh()? {
        RefreshOutcome::Completed(_) => {}
        RefreshOutcome::Skipped => unreachable!("no other refresh can be running"),
    }

    let report = if let Some(port) = port {
        let keys: Vec<UniqueKey> = monitor
            .snapshot()
            .rows
            .iter()
            .filter(|row| row.record.local_port == port)
            .map(|row| row.unique_key())
            .collect();
        if keys.is_empty() {
            bail!("no connection found on port {}", port);
        }
        monitor.kill_keys(&keys).await?
    } else {
        monitor.kill_batch(&pids).await?
    };

    print_report(&report, json)?;

    if !report.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &KillReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for pid in &report.succeeded {
        println!("Killed process {}", pid);
    }
    for pid in &report.failed {
        println!("Failed to kill process {}", pid);
    }
    if report.skipped_protected > 0 {
        println!("Skipped {} protected target(s)", report.skipped_protected);
    }
    Ok(())
}
