use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::database::db_structs::SeasonId;

#[derive(Parser, Clone)]
#[command(
    display_name = "Ranked Season Engine",
    author = "Ranked Season Engine",
    long_about = "Runs scheduled ranked-season batch passes (decay, decay warnings) against a JSON state snapshot"
)]
pub struct Args {
    /// JSON snapshot holding seasons and player season records. Updated in
    /// place after a pass.
    #[arg(short, long, env = "RANKED_SEASON_SNAPSHOT", help = "Path to the state snapshot")]
    pub snapshot: Option<PathBuf>,

    /// Overrides the clock, e.g. to replay a missed scheduler run
    #[arg(long, value_parser = parse_timestamp, help = "Evaluate as of this RFC 3339 timestamp")]
    pub now: Option<DateTime<Utc>>,

    /// Restricts the pass to a single season. Defaults to every active season.
    #[arg(long, global = true)]
    pub season: Option<SeasonId>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "RUST_LOG",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"],
        help = "Sets the logging verbosity"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command
}

#[derive(Subcommand, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Charge rating decay to inactive high-tier players
    Decay,
    /// Flag players who are about to start decaying
    Warn,
    /// Print the tier table
    Tiers
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", raw, e))
}
