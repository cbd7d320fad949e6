use std::path::Path;

use anyhow::Result;
use fragprint_core::config::FRAGMENT_BASE;
use fragprint_core::cpu::opcodes::disassemble_all;
use fragprint_core::fingerprint::Verdict;
use fragprint_core::scan::Scanner;

use crate::{hex_string, load_scan_config, parse_hex_bytes};

/// Run one byte sequence through validation, canonicalization and execution,
/// printing what each stage produced.
pub fn inspect_command(bytes: &str, config_path: Option<&Path>) -> Result<()> {
    let config = load_scan_config(config_path)?;
    let input = parse_hex_bytes(bytes)?;
    let mut scanner = Scanner::new(config);
    let report = scanner.inspect(&input);

    println!("Input: {} ({} bytes)", hex_string(&input), input.len());
    if report.validated_len == 0 {
        println!("No valid fragment at the start of the input.");
        return Ok(());
    }
    println!("Valid prefix: {} bytes", report.validated_len);

    let Some((insns, canon)) = &report.canonical else {
        println!("Fragment cannot be canonicalized.");
        return Ok(());
    };
    println!("Canonical: {}", hex_string(insns));
    for line in disassemble_all(FRAGMENT_BASE, insns) {
        println!("  {line}");
    }
    if !canon.map.is_empty() {
        println!("Address map:");
        for (original, canonical) in &canon.map {
            println!("  ${original:04x} -> ${canonical:04x}");
        }
    }

    match &report.outcome {
        None => {}
        Some(Err(reason)) => println!("Disqualified: {reason}"),
        Some(Ok((prints, verdict))) => {
            let verdict = match verdict {
                Verdict::Accepted => "accepted",
                Verdict::Boring => "boring (no change beyond the no-op baseline)",
                Verdict::TooMuch => "rejected (too many symbols)",
            };
            println!("Verdict: {verdict}");
            println!("Fingerprint:");
            for (symbol, print) in prints {
                println!("  {symbol}: {print}");
            }
        }
    }
    Ok(())
}
