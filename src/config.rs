//! Runtime configuration, optionally read from a TOML file

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_MODELS_DIR: &str = "models";
pub const DEFAULT_DATASET_PATH: &str = "online_shoppers_intention_cleaned.csv";
pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const DEFAULT_SAMPLE_SIZE: usize = 1000;

/// Where artifacts, data and exports live. Missing keys fall back to the
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub models_dir: PathBuf,
    pub dataset_path: PathBuf,
    pub export_dir: PathBuf,
    /// Rows to sample in batch mode; 0 scores the whole dataset
    pub sample_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
            dataset_path: PathBuf::from(DEFAULT_DATASET_PATH),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&contents)?;
        tracing::debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }

    /// Defaults when no file is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str("models_dir = \"artifacts\"\nsample_size = 250\n").unwrap();
        assert_eq!(config.models_dir, PathBuf::from("artifacts"));
        assert_eq!(config.sample_size, 250);
        assert_eq!(config.dataset_path, PathBuf::from(DEFAULT_DATASET_PATH));
        assert_eq!(config.export_dir, PathBuf::from(DEFAULT_EXPORT_DIR));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml_str("model_dir = \"typo\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "export_dir = \"out\"").unwrap();

        let config = Config::load_or_default(Some(file.path())).unwrap();
        assert_eq!(config.export_dir, PathBuf::from("out"));
        assert_eq!(Config::load_or_default(None).unwrap(), Config::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load(Path::new("/nonexistent/sessionforge.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
