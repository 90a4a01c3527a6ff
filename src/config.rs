//! Optional TOML configuration
//!
//! `checkstore.toml` in the working directory supplies defaults for flags
//! that rarely change between runs; command-line arguments always win.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file name looked up in the working directory
pub const CONFIG_FILE: &str = "checkstore.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Files per batch
    pub batch_size: Option<usize>,
    /// Worker thread count
    pub threads: Option<usize>,
    /// Checkpoint file location
    pub checkpoint: Option<PathBuf>,
    /// Plain-text report file location
    pub report: Option<PathBuf>,
}

impl Config {
    /// Load `checkstore.toml` from the working directory, or defaults if the
    /// file does not exist. A file that exists but does not parse is an
    /// error: silently ignoring a typo would be worse than stopping.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_from(&temp_dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.batch_size.is_none());
        assert!(config.threads.is_none());
    }

    #[test]
    fn parses_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "batch_size = 250\nthreads = 8\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.batch_size, Some(250));
        assert_eq!(config.threads, Some(8));
        assert!(config.checkpoint.is_none());
    }

    #[test]
    fn invalid_config_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "batch_size = \"many\"\n").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
