use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First address of the fragment image window; fragments execute from here.
pub const FRAGMENT_BASE: u16 = 0xff00;

/// Longest fragment that fits below the interrupt vectors at 0xfffa.
pub const FRAGMENT_WINDOW_LEN: usize = 0xfa;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported config format '{0}' (expected json, yaml or yml)")]
    UnsupportedFormat(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Canonical address partitioning.
///
/// The canonicalizer allocates slots from these regions and the symbolic bus
/// names addresses by the same boundaries, so both must read from one value:
/// - zero page: `0x0000..0x0100`, canonical slots from `zp_start`
/// - absolute: `0x0100..indexed_page<<8`, canonical slots in page `abs_page`
/// - indexed: `indexed_page<<8..end_page<<8`, one canonical page per operand
/// - indirect: everything above `end_page<<8`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLayout {
    pub zp_start: u8,
    pub abs_page: u8,
    pub indexed_page: u8,
    pub end_page: u8,
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self { zp_start: 0x20, abs_page: 0x02, indexed_page: 0x03, end_page: 0x08 }
    }
}

impl MemoryLayout {
    pub fn abs_base(&self) -> u16 {
        (self.abs_page as u16) << 8
    }

    pub fn indexed_base(&self) -> u16 {
        (self.indexed_page as u16) << 8
    }

    pub fn end(&self) -> u16 {
        (self.end_page as u16) << 8
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zp_start == 0 {
            // Slot 0 is reserved for the zero-page-indexed operand.
            return Err(ConfigError::Invalid("layout.zp_start must be non-zero".into()));
        }
        if self.abs_page == 0 {
            return Err(ConfigError::Invalid("layout.abs_page must be above the zero page".into()));
        }
        if self.abs_page >= self.indexed_page {
            return Err(ConfigError::Invalid(format!(
                "layout.abs_page ({:#04x}) must be below layout.indexed_page ({:#04x})",
                self.abs_page, self.indexed_page
            )));
        }
        if self.indexed_page >= self.end_page {
            return Err(ConfigError::Invalid(format!(
                "layout.indexed_page ({:#04x}) must be below layout.end_page ({:#04x})",
                self.indexed_page, self.end_page
            )));
        }
        if self.end() > FRAGMENT_BASE {
            return Err(ConfigError::Invalid(
                "layout.end_page overlaps the fragment image window".into(),
            ));
        }
        Ok(())
    }
}

/// Shape of the test vector battery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Total number of vectors.
    pub count: usize,
    /// Constant fill bytes for the leading vectors; the rest are pseudo-random.
    pub fills: Vec<u8>,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { count: 16, fills: vec![0x00, 0x01, 0x80, 0xfe, 0xff] }
    }
}

/// Tunables for a scan or query session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Shortest fragment (in bytes) worth fingerprinting.
    pub min_len: usize,
    /// Longest candidate considered at each offset.
    pub max_len: usize,
    /// Instruction ceiling per execution.
    pub max_steps: usize,
    /// Fingerprint maps with more symbols than this are discarded.
    pub max_fingerprints: usize,
    /// Record writes to the indexed region as (address, value) pairs.
    pub pair_indexed_writes: bool,
    pub layout: MemoryLayout,
    pub vectors: VectorConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_len: 2,
            max_len: 32,
            max_steps: 2000,
            max_fingerprints: 100,
            pair_indexed_writes: false,
            layout: MemoryLayout::default(),
            vectors: VectorConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Load a config from a `.json`, `.yaml` or `.yml` file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_lowercase();
        let config: ScanConfig = match ext.as_str() {
            "json" => serde_json::from_str(&body)?,
            "yaml" | "yml" => serde_yaml::from_str(&body)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_len == 0 {
            return Err(ConfigError::Invalid("min_len must be at least 1".into()));
        }
        if self.max_len < self.min_len {
            return Err(ConfigError::Invalid(format!(
                "max_len ({}) must not be below min_len ({})",
                self.max_len, self.min_len
            )));
        }
        if self.max_len > FRAGMENT_WINDOW_LEN {
            return Err(ConfigError::Invalid(format!(
                "max_len ({}) exceeds the fragment window ({FRAGMENT_WINDOW_LEN})",
                self.max_len
            )));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be positive".into()));
        }
        if self.vectors.count == 0 {
            return Err(ConfigError::Invalid("vectors.count must be positive".into()));
        }
        self.layout.validate()
    }
}
