use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::config::TrackerConfig;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "tally.toml";

/// Error type for reading the tracker config
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Read the config at `path`. A missing file yields the defaults; a file
/// that exists but does not parse is an error.
pub fn load_config(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(TrackerConfig::default());
        }
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.storage.workers, 4);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn test_reads_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "data_dir = \"projects\"\n\n[defaults]\nicon = \"F-BOOK\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("projects"));
        assert_eq!(config.defaults.icon, "F-BOOK");
        assert_eq!(config.defaults.name, "No name");
    }

    #[test]
    fn test_malformed_config_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE);
        fs::write(&path, "[storage\nworkers = ").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
    }
}
