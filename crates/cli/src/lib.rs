use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fragprint_core::config::ScanConfig;
use fragprint_core::db::FragmentDb;

pub mod commands;

/// Open (or create) the fragment database at `path`.
pub fn open_fragment_db(path: &Path) -> Result<FragmentDb> {
    FragmentDb::open(path)
        .with_context(|| format!("Failed to open fragment database at {}", path.display()))
}

/// Load a scan config from `path`, or fall back to the defaults.
pub fn load_scan_config(path: Option<&Path>) -> Result<ScanConfig> {
    match path {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ScanConfig::default()),
    }
}

/// Parse a hex byte string such as `a5 10 e6 10` or `a510e610`.
///
/// Whitespace, commas and `0x`/`$` prefixes on individual bytes are ignored.
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let mut digits = String::new();
    for word in text.split(|c: char| c.is_whitespace() || c == ',') {
        let word = word.trim_start_matches("0x").trim_start_matches('$');
        digits.push_str(word);
    }
    if digits.is_empty() {
        return Err(anyhow!("No bytes given"));
    }
    if digits.len() % 2 != 0 {
        return Err(anyhow!("Odd number of hex digits in '{}'", text.trim()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            let pair = digits.get(i..i + 2).ok_or_else(|| anyhow!("Invalid hex in '{}'", text))?;
            u8::from_str_radix(pair, 16).with_context(|| format!("Invalid hex byte '{pair}'"))
        })
        .collect()
}

/// Render bytes as lowercase space-separated hex.
pub fn hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}
