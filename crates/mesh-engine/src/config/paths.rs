//! Path utilities for mesh configuration files

use std::path::PathBuf;

/// Get the default configuration directory
///
/// Returns: `<user config dir>/mesh` (e.g. `~/.config/mesh` on Linux)
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mesh")
}

/// Get the default config file path for a given file name
///
/// # Arguments
/// * `filename` - Config file name (e.g., "host.yaml")
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_ends_with_mesh() {
        assert!(default_config_dir().ends_with("mesh"));
    }

    #[test]
    fn test_config_path_includes_filename() {
        let path = default_config_path("test.yaml");
        assert!(path.ends_with("test.yaml"));
    }
}
