use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fragprint_core::db::ScanCounts;
use fragprint_core::scan::Scanner;

use crate::{load_scan_config, open_fragment_db};

/// Scan each file in order into the fragment database at `db_path`.
pub fn scan_command(
    db_path: &Path,
    config_path: Option<&Path>,
    files: &[PathBuf],
) -> Result<ScanCounts> {
    if files.is_empty() {
        return Err(anyhow!("No input files given"));
    }
    let config = load_scan_config(config_path)?;
    let db = open_fragment_db(db_path)?;
    let mut scanner = Scanner::new(config);

    let mut total = ScanCounts::default();
    for file in files {
        let counts = scanner
            .scan_file(&db, file)
            .with_context(|| format!("Failed to scan {}", file.display()))?;
        println!(
            "{}: {} candidates, {} new fragments, {} evaluated, {} fingerprinted",
            file.display(),
            counts.candidates,
            counts.new_fragments,
            counts.evaluated,
            counts.accepted
        );
        total.add(&counts);
    }

    if files.len() > 1 {
        println!(
            "Total: {} candidates, {} new fragments, {} evaluated, {} fingerprinted",
            total.candidates, total.new_fragments, total.evaluated, total.accepted
        );
    }
    Ok(total)
}
