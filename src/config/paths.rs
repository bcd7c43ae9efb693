//! Configuration paths
//!
//! `AGENCY_CONFIG_DIR` and `AGENCY_CONFIG` take precedence over the
//! platform config directory.

use std::path::{Path, PathBuf};

/// File names probed in the config directory, first match wins
const CONFIG_FILE_NAMES: [&str; 3] = ["config.json", "config.json5", "config.toml"];

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Directory holding the gateway client configuration
pub fn config_dir() -> PathBuf {
    env_path("AGENCY_CONFIG_DIR").unwrap_or_else(|| {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .map(|d| d.join("agency"))
            .unwrap_or_else(|| PathBuf::from(".agency"))
    })
}

/// Configuration file to load.
///
/// When none of the known file names exist, this is where `save_config`
/// would write a new JSON file.
pub fn config_path() -> PathBuf {
    env_path("AGENCY_CONFIG").unwrap_or_else(|| find_config_file(&config_dir()))
}

fn find_config_file(dir: &Path) -> PathBuf {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .unwrap_or_else(|| dir.join(CONFIG_FILE_NAMES[0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_find_config_file_prefers_json() {
        let dir = tempdir().unwrap();
        assert_eq!(find_config_file(dir.path()), dir.path().join("config.json"));

        std::fs::write(dir.path().join("config.toml"), "").unwrap();
        assert_eq!(find_config_file(dir.path()), dir.path().join("config.toml"));

        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        assert_eq!(find_config_file(dir.path()), dir.path().join("config.json"));
    }
}
