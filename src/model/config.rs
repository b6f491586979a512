use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration from tally.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Directory holding one `<uid>.json` file per project
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub defaults: ProjectDefaults,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            data_dir: default_data_dir(),
            log: LogConfig::default(),
            storage: StorageConfig::default(),
            defaults: ProjectDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive, e.g. "info" or "tally=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also write to `<dir>/<YYYY-MM-DD>.log`
    #[serde(default)]
    pub to_file: bool,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            to_file: false,
            dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Background threads for loading and saving records
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            workers: default_workers(),
        }
    }
}

/// Name and icon used when a project is created without them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDefaults {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
}

impl Default for ProjectDefaults {
    fn default() -> Self {
        ProjectDefaults {
            name: default_name(),
            icon: default_icon(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_name() -> String {
    "No name".to_string()
}

fn default_icon() -> String {
    "F-CAR".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: TrackerConfig = toml::from_str("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.log.level, "info");
        assert!(!config.log.to_file);
        assert_eq!(config.storage.workers, 4);
        assert_eq!(config.defaults.name, "No name");
        assert_eq!(config.defaults.icon, "F-CAR");
    }

    #[test]
    fn test_partial_sections_fill_in() {
        let config: TrackerConfig = toml::from_str(
            r#"
data_dir = "/var/lib/tally"

[log]
level = "debug"

[storage]
workers = 2
"#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tally"));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.dir, PathBuf::from("./logs"));
        assert_eq!(config.storage.workers, 2);
        assert_eq!(config.defaults.icon, "F-CAR");
    }
}
