// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments, and the global output flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "drover")]
#[command(about = "Drive a fleet of hosts to each swarm's release and instance count")]
#[command(version)]
pub struct Cli {
    /// Show debug logs and debug events
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print only failures and finished passes
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the config file (default: discover drover.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter drover.yml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Reconcile one swarm: build, release, place, uptest, route, clean up
    Trigger {
        /// Swarm id from the config
        swarm: String,

        /// Trace id to tag events with (generated when omitted)
        #[arg(long)]
        trace: Option<String>,
    },

    /// Run health checks against every instance in the fleet
    UptestAll,

    /// Show what the fleet runs for one swarm
    Status {
        /// Swarm id from the config
        swarm: String,
    },
}
