//! Runtime configuration.
//!
//! ```toml
//! [detect]
//! probe_size = 4352
//!
//! [limits]
//! max_fst_size = 1048576
//! max_metadata_size = 131072
//!
//! [images]
//! enabled = true
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::Result;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detect: DetectConfig,
    pub limits: Limits,
    pub images: ImageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Bytes read from the start of a file for identification.
    pub probe_size: usize,
}

/// Upper bounds on buffers sized from on-disk fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_fst_size: u32,
    pub max_metadata_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// When false, every image track reports [`crate::Error::NotSupported`].
    pub enabled: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            probe_size: 4096 + 256,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_fst_size: 1024 * 1024,
            max_metadata_size: 128 * 1024,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.detect.probe_size, 4352);
        assert_eq!(config.limits.max_fst_size, 1 << 20);
        assert!(config.images.enabled);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = Config::from_toml_str("[limits]\nmax_fst_size = 4096\n").unwrap();
        assert_eq!(config.limits.max_fst_size, 4096);
        assert_eq!(config.limits.max_metadata_size, 128 * 1024);
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = Config::from_toml_str("[detect\nprobe_size = 1").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
