//! ConnWatch CLI - Monitor network connections and the processes behind them
//!
//! A command-line tool for listing TCP/UDP connections, watching them
//! change over time, and killing the owning processes.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "connwatch")]
#[command(author, version, about = "Monitor network connections and their processes")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List current connections
    #[command(alias = "ls")]
    List {
        /// Filter rows by a free-text query (port, pid, name, address)
        #[arg(short, long)]
        query: Option<String>,

        /// Filter by protocol (tcp or udp)
        #[arg(short, long)]
        protocol: Option<String>,

        /// Only show listening sockets
        #[arg(short, long)]
        listening: bool,
    },

    /// Watch connections, printing a summary every refresh
    Watch {
        /// Refresh interval in seconds (overrides the configured value)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Kill the processes behind connections
    Kill {
        /// Process ids to terminate
        pids: Vec<u32>,

        /// Kill whatever owns this local port instead
        #[arg(short, long, conflicts_with = "pids")]
        port: Option<u16>,
    },

    /// Show or change configuration
    Config {
        /// Set the auto-refresh interval in seconds
        #[arg(long)]
        set_interval: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::List {
            query,
            protocol,
            listening,
        }) => {
            commands::list::run(query, protocol, listening, cli.json).await?;
        }
        Some(Commands::Watch { interval }) => {
            commands::watch::run(interval, cli.json).await?;
        }
        Some(Commands::Kill { pids, port }) => {
            commands::kill::run(pids, port, cli.json).await?;
        }
        Some(Commands::Config { set_interval }) => {
            commands::config::run(set_interval, cli.json).await?;
        }
        None => {
            commands::list::run(None, None, false, cli.json).await?;
        }
    }

    Ok(())
}
