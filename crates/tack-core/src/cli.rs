use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// One `--rc key=value` override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok(Self {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(format!("expected KEY=VALUE, got {s:?}")),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tack",
    version,
    about = "Tack: campaign, channel and task boards with a drag-and-drop calendar"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_name = "KEY=VALUE",
        value_parser = |s: &str| s.parse::<KeyVal>(),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print one month of the calendar with scheduled tasks and campaigns.
    Calendar {
        #[arg(long)]
        year: Option<i32>,
        /// 1-12; defaults to the current month.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
    },
    /// Print the kanban board for tasks, campaigns or channels.
    Board { kind: String },
    /// Print one item in full.
    Show { kind: String, id: String },
    /// Move an item to a status column or a calendar day.
    Move {
        kind: String,
        id: String,
        /// A status label ("In Progress") or a date (2025-03-15).
        target: String,
        /// Position in the target; defaults to the end.
        #[arg(long)]
        index: Option<usize>,
    },
    /// Move an item to the end of its next status column.
    Advance { kind: String, id: String },
    /// Replay a timed pointer script against the board.
    Replay { script: PathBuf },
    /// Replace the local item feed with a JSON array of records.
    Import { file: PathBuf },
}

/// Installs the stderr subscriber. `RUST_LOG` wins; otherwise each `-v`
/// raises and each `-q` lowers the level from `warn`.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "error",
        -1 | 0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| anyhow!("bad log filter {level}: {e}"))?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .try_init();
    if let Err(err) = installed {
        debug!(error = %err, "subscriber already installed");
    }
    Ok(())
}
