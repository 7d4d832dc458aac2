//! Config command - show or change settings.

use anyhow::Result;
use connwatch_core::ConfigStore;

pub async fn run(set_interval: Option<u64>, json: bool) -> Result<()> {
    let store = ConfigStore::new()?;

    if let Some(secs) = set_interval {
        store.set_refresh_interval(secs).await?;
        if !json {
            println!("Refresh interval set to {}s", secs);
        }
    }

    let settings = store.load().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        println!("Refresh interval:  {}s", settings.refresh_interval_secs);
        println!("Change highlight:  {}ms", settings.change_highlight_ms);
        println!("Transient state:   {}", settings.transient_state);
    }
    Ok(())
}
