use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fragprint::commands::{inspect_command, query_command, scan_command, stats_command};
use tracing::Level;

/// Behavioral fingerprinting of 6502 code fragments.
///
/// This CLI is a thin wrapper around `fragprint-core` (exposed in code as
/// `fragprint_core`). All substantive logic lives in the library so it can be
/// tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(name = "fragprint", version, about = "Behavioral fingerprinting of 6502 code fragments")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). Logs go to stderr.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan binary images and store every fragment's fingerprint.
    ///
    /// Files are processed in order, each in its own transaction.
    Scan {
        /// Fragment database (created if missing).
        #[arg(long)]
        db: PathBuf,

        /// Scan configuration (.json, .yaml or .yml). Defaults apply without it.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Binary images to scan.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Fingerprint a behavioral description and look up fragments that match it.
    ///
    /// Example: `fragprint query --db prints.db "[0x20, 0x21] = [0x20, 0x21] + 1"`
    Query {
        /// Query text: `target = expr` statements separated by ';' or newlines.
        query: String,

        /// Fragment database to search. Without it only the fingerprint is printed.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Scan configuration the database was built with.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum number of matches to print.
        #[arg(long)]
        limit: Option<usize>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Validate, canonicalize and fingerprint one hex byte sequence.
    Inspect {
        /// Bytes as hex, e.g. "a5 10 e6 10".
        bytes: String,

        /// Scan configuration (.json, .yaml or .yml).
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show row counts and recorded scans of a fragment database.
    Stats {
        /// Fragment database.
        #[arg(long)]
        db: PathBuf,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan { db, config, files } => {
            scan_command(&db, config.as_deref(), &files)?;
        }
        Command::Query { query, db, config, limit, json } => {
            query_command(&query, db.as_deref(), config.as_deref(), limit, json)?
        }
        Command::Inspect { bytes, config } => inspect_command(&bytes, config.as_deref())?,
        Command::Stats { db, json } => stats_command(&db, json)?,
    }

    Ok(())
}
