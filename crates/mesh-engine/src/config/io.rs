//! YAML configuration I/O
//!
//! Two flavours: [`load_config`] is forgiving (missing or broken files fall
//! back to defaults, which is what a host wants at startup) while
//! [`read_config`] reports every failure, for explicitly requested files.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file, falling back to defaults
///
/// A missing file yields `T::default()` silently; an unreadable or invalid
/// file is logged and also yields `T::default()`.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No config at {:?}, using defaults", path);
        return T::default();
    }

    match read_config(path) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Ignoring config {:?}: {:#}", path, e);
            T::default()
        }
    }
}

/// Read configuration from a YAML file, reporting any failure
pub fn read_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse config: {:?}", path))
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml).with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct TestConfig {
        value: i32,
        name: String,
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: TestConfig = load_config(Path::new("/nonexistent/path/config.yaml"));
        assert_eq!(config, TestConfig::default());
    }

    #[test]
    fn test_load_invalid_returns_default_but_read_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "value: [not, a, number]").unwrap();

        let config: TestConfig = load_config(&path);
        assert_eq!(config, TestConfig::default());
        assert!(read_config::<TestConfig>(&path).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test-config.yaml");

        let config = TestConfig {
            value: 42,
            name: "test".to_string(),
        };

        save_config(&config, &path).unwrap();
        let loaded: TestConfig = load_config(&path);
        assert_eq!(loaded, config);
    }
}
