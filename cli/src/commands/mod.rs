//! CLI command implementations.

pub mod config;
pub mod kill;
pub mod list;
pub mod watch;

use anyhow::Result;
use connwatch_core::{ConfigStore, MonitorOptions, PlatformMonitor, Settings};

/// Load settings and build a monitor wired to the OS-native sources.
pub async fn build_monitor() -> Result<(PlatformMonitor, Settings)> {
    let settings = ConfigStore::new()?.load().await?;
    let monitor = PlatformMonitor::platform(MonitorOptions::from(&settings));
    Ok((monitor, settings))
}
