use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use fragprint_core::config::FRAGMENT_BASE;
use fragprint_core::cpu::opcodes::disassemble_all;
use fragprint_core::db::FragmentMatch;
use fragprint_core::fingerprint::signature_pairs;
use fragprint_core::query::{evaluate, Program};
use fragprint_core::vectors::TestVectorSet;
use serde::Serialize;

use crate::{hex_string, load_scan_config, open_fragment_db};

#[derive(Debug, Serialize)]
struct QueryReport {
    vecset: String,
    fingerprint: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<Vec<FragmentMatch>>,
}

/// Evaluate a behavioral query and, with a database, list the fragments that match it.
pub fn query_command(
    query: &str,
    db_path: Option<&Path>,
    config_path: Option<&Path>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let config = load_scan_config(config_path)?;
    let program = Program::parse(query).context("Failed to parse query")?;
    let vectors = TestVectorSet::generate(&config.vectors);
    let prints = evaluate(&program, &vectors, &config).context("Failed to evaluate query")?;
    let pairs = signature_pairs(&prints);

    let matches = match db_path {
        Some(path) if !pairs.is_empty() => {
            let db = open_fragment_db(path)?;
            Some(
                db.find_matches(vectors.identity(), &pairs, limit)
                    .context("Failed to look up matching fragments")?,
            )
        }
        Some(_) => Some(Vec::new()),
        None => None,
    };

    if json {
        let report = QueryReport {
            vecset: vectors.identity().to_string(),
            fingerprint: pairs.into_iter().collect(),
            matches,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if pairs.is_empty() {
        println!("No fingerprints generated.");
        return Ok(());
    }

    println!("Fingerprint:");
    for (sym, print) in &pairs {
        println!("  {sym}: {print}");
    }

    let Some(matches) = matches else {
        return Ok(());
    };
    if matches.is_empty() {
        println!("No matching fragments.");
        return Ok(());
    }

    println!();
    println!("Matches ({}):", matches.len());
    for m in &matches {
        print_match(m);
    }
    Ok(())
}

fn print_match(m: &FragmentMatch) {
    println!(
        "- Fragment #{} ({} bytes): {}",
        m.fragment.id,
        m.fragment.insns.len(),
        hex_string(&m.fragment.insns)
    );
    for source in &m.sources {
        println!("    found in {} at offset {:#x}", source.filename, source.offset);
    }
    for line in disassemble_all(FRAGMENT_BASE, &m.fragment.insns) {
        println!("    {line}");
    }
}
