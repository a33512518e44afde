pub mod check;
pub mod history;
pub mod rules;
pub mod run;
pub mod verify;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// A3S ToS Monitor - Terms-of-service change monitoring and escalation
#[derive(Debug, Parser)]
#[command(name = "a3s-tos-monitor", version, about)]
pub struct Cli {
    /// Configuration file (default: ~/.a3s/tos-monitor/config.toml)
    #[arg(long, global = true, env = "A3S_TOS_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Monitor every configured creditor until Ctrl-C
    Run,

    /// Run one monitoring cycle for a creditor and print the report
    Check {
        /// Creditor id from the configuration
        creditor: String,
    },

    /// Print the active violation rule table
    Rules,

    /// Show stored snapshots for a creditor, most recent first
    History {
        /// Creditor id
        creditor: String,

        /// Maximum number of snapshots to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Recompute the hash of every stored snapshot for a creditor
    Verify {
        /// Creditor id
        creditor: String,
    },
}
