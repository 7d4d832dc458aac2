//! List command - show current connections.

use anyhow::Result;
use connwatch_core::{AnnotatedRow, ConnState, RefreshOutcome};

pub async fn run(
    query: Option<String>,
    protocol: Option<String>,
    listening: bool,
    json: bool,
) -> Result<()> {
    let (monitor, _settings) = super::build_monitor().await?;
    match monitor.refresh()? {
        RefreshOutcome::Completed(_) => {}
        RefreshOutcome::Skipped => unreachable!("no other refresh can be running"),
    }

    let snapshot = monitor.snapshot();
    let mut rows = snapshot.rows;

    if let Some(ref q) = query {
        rows.retain(|row| row.matches_query(q));
    }
    if let Some(ref proto) = protocol {
        rows.retain(|row| row.record.protocol.to_string().eq_ignore_ascii_case(proto));
    }
    if listening {
        rows.retain(|row| row.record.state == ConnState::Listen);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No matching connections.");
        return Ok(());
    }

    println!(
        "{:<5} {:<22} {:<22} {:<13} {:<8} {:<20} ACCOUNT",
        "PROTO", "LOCAL ADDRESS", "REMOTE ADDRESS", "STATE", "PID", "PROCESS"
    );
    println!("{}", "-".repeat(100));

    for row in &rows {
        println!(
            "{:<5} {:<22} {:<22} {:<13} {:<8} {:<20} {}",
            row.record.protocol.to_string(),
            endpoint(row, true),
            endpoint(row, false),
            row.record.state.to_string(),
            row.record.pid,
            truncate(&row.process.name, 20),
            row.process.account
        );
    }

    let summary = snapshot.summary;
    println!(
        "\nTotal: {} ({} TCP, {} UDP) across {} processes",
        rows.len(),
        summary.tcp,
        summary.udp,
        summary.processes
    );
    Ok(())
}

fn endpoint(row: &AnnotatedRow, local: bool) -> String {
    if local {
        format!("{}:{}", row.record.local_addr, row.record.local_port)
    } else {
        format!("{}:{}", row.record.remote_addr, row.record.remote_port)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn test_truncate_short_name_unchanged() {
        assert_eq!(truncate("nginx", 20), "nginx");
    }

    #[test]
    fn test_truncate_long_name() {
        assert_eq!(truncate("a".repeat(25).as_str(), 20), format!("{}…", "a".repeat(19)));
    }

    #[test]
    fn test_truncate_multibyte_name() {
        // comm names are arbitrary bytes; a cut must land on a char boundary.
        let name = "серверныйпроцессдемон";
        assert_eq!(truncate(name, 20), "серверныйпроцессдем…");
        assert_eq!(truncate("серверный", 20), "серверный");
    }
}
