use std::path::Path;

use anyhow::{Context, Result};
use fragprint_core::db::{DbStats, ScanRecord};
use serde::Serialize;

use crate::open_fragment_db;

#[derive(Debug, Serialize)]
struct StatsReport {
    stats: DbStats,
    scans: Vec<ScanRecord>,
}

/// Print row counts and the recorded scans of a fragment database.
pub fn stats_command(db_path: &Path, json: bool) -> Result<()> {
    let db = open_fragment_db(db_path)?;
    let stats = db.stats().context("Failed to count database rows")?;
    let scans = db.list_scans().context("Failed to list scans")?;

    if json {
        let report = StatsReport { stats, scans };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Fragment database: {}", db_path.display());
    println!("  Fragments: {}", stats.fragments);
    println!("  Sources: {}", stats.sources);
    println!("  Fingerprints: {} ({} fragments)", stats.prints, stats.fingerprinted_fragments);
    println!("  Vector sets: {}", stats.vecsets);
    println!("  Evaluations: {}", stats.evaluations);

    if scans.is_empty() {
        println!("No scans recorded.");
        return Ok(());
    }
    println!("Scans:");
    for scan in scans {
        println!(
            "  - {} [{}] started {} finished {}: \
             {} candidates, {} new, {} evaluated, {} fingerprinted",
            scan.filename,
            short_id(&scan.vecset),
            scan.started_at,
            scan.finished_at.as_deref().unwrap_or("(incomplete)"),
            scan.counts.candidates,
            scan.counts.new_fragments,
            scan.counts.evaluated,
            scan.counts.accepted
        );
    }
    Ok(())
}

fn short_id(vecset: &str) -> &str {
    vecset.get(..12).unwrap_or(vecset)
}
