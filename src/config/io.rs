//! Configuration I/O
//!
//! Precedence, lowest first: built-in defaults, the config file, `.env`,
//! process environment.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use super::types::Config;
use crate::error::{Error, Result};

/// A snapshot of the configuration file
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Path to the config file
    pub path: std::path::PathBuf,
    /// Whether the file exists
    pub exists: bool,
    /// Raw file content
    pub raw: Option<String>,
    /// Parsed configuration
    pub config: Option<Config>,
    /// Validation issues
    pub issues: Vec<String>,
}

/// Load the effective configuration
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// On-disk configuration syntax, picked by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    /// JSON with comments and trailing commas allowed
    Json5,
    Toml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" | "json5" => Some(ConfigFormat::Json5),
            "toml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }

    fn parse(self, content: &str) -> Result<Config> {
        match self {
            ConfigFormat::Json5 => json5::from_str(content)
                .map_err(|e| Error::Config(format!("Invalid JSON config: {}", e))),
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| Error::Config(format!("Invalid TOML config: {}", e))),
        }
    }

    fn render(self, config: &Config) -> Result<String> {
        let rendered = match self {
            ConfigFormat::Json5 => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
            ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| e.to_string()),
        };
        rendered.map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }
}

/// Load configuration from a specific path.
///
/// Files without a known extension are tried as JSON5, then TOML.
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    match ConfigFormat::from_path(path) {
        Some(format) => format.parse(&content),
        None => ConfigFormat::Json5
            .parse(&content)
            .or_else(|_| ConfigFormat::Toml.parse(&content))
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e))),
    }
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first. Unparseable values are logged and skipped.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();

    if let Ok(url) = std::env::var("OPENCLAW_GATEWAY_URL") {
        config.gateway.url = url;
    }
    if let Ok(token) = std::env::var("OPENCLAW_GATEWAY_TOKEN") {
        config.gateway.token = SecretString::from(token);
    }
    if let Some(timeout) = env_duration("OPENCLAW_CONNECT_TIMEOUT") {
        config.gateway.connect_timeout = timeout;
    }
    if let Some(timeout) = env_duration("OPENCLAW_REQUEST_TIMEOUT") {
        config.gateway.request_timeout = timeout;
    }
    if let Ok(limit) = std::env::var("OPENCLAW_HISTORY_LIMIT") {
        match limit.parse() {
            Ok(v) => config.gateway.history_limit = v,
            Err(_) => warn!(value = %limit, "Ignoring invalid OPENCLAW_HISTORY_LIMIT"),
        }
    }

    // Logging overrides
    if let Ok(level) = std::env::var("RUST_LOG") {
        config.log.level = level;
    }
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        match format.parse() {
            Ok(v) => config.log.format = v,
            Err(e) => warn!(error = %e, "Ignoring invalid LOG_FORMAT"),
        }
    }
}

fn env_duration(name: &str) -> Option<Duration> {
    let value = std::env::var(name).ok()?;
    match humantime::parse_duration(&value) {
        Ok(duration) => Some(duration),
        Err(e) => {
            warn!(variable = name, value = %value, error = %e, "Ignoring invalid duration");
            None
        }
    }
}

/// Save configuration to a file, TOML for `.toml` paths and JSON otherwise.
///
/// The gateway token is never written.
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = ConfigFormat::from_path(path)
        .unwrap_or(ConfigFormat::Json5)
        .render(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Read a configuration file into a snapshot without failing.
///
/// Read and parse failures end up in `issues`; a parsed file also carries
/// its validation errors and warnings.
pub fn read_config_snapshot(path: &Path) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot {
        path: path.to_path_buf(),
        exists: path.exists(),
        raw: None,
        config: None,
        issues: Vec::new(),
    };

    if !snapshot.exists {
        snapshot.issues.push("Configuration file does not exist".to_string());
        return snapshot;
    }

    match std::fs::read_to_string(path) {
        Ok(raw) => snapshot.raw = Some(raw),
        Err(e) => {
            snapshot.issues.push(format!("Failed to read file: {}", e));
            return snapshot;
        }
    }

    match load_config_from_path(path) {
        Ok(config) => {
            let validation = super::validation::validate_config(&config);
            snapshot.issues.extend(
                validation
                    .errors
                    .iter()
                    .chain(&validation.warnings)
                    .map(|issue| format!("{}: {}", issue.path, issue.message)),
            );
            snapshot.config = Some(config);
        }
        Err(e) => snapshot.issues.push(e.to_string()),
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let mut config = Config::default();
        config.gateway.url = "wss://gw.example.com".to_string();
        config.gateway.history_limit = 20;
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.gateway.url, "wss://gw.example.com");
        assert_eq!(loaded.gateway.history_limit, 20);
        assert_eq!(loaded.gateway.request_timeout, config.gateway.request_timeout);
    }

    #[test]
    fn test_load_json5_with_comments() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // local gateway
                gateway: { url: "ws://10.0.0.5:18789", request_timeout: "45s" },
            }"#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.gateway.url, "ws://10.0.0.5:18789");
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_snapshot_of_missing_and_broken_files() {
        let dir = tempdir().unwrap();

        let missing = read_config_snapshot(&dir.path().join("absent.json"));
        assert!(!missing.exists);
        assert!(missing.config.is_none());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "gateway = [").unwrap();
        let snapshot = read_config_snapshot(&broken);
        assert!(snapshot.exists);
        assert!(snapshot.config.is_none());
        assert_eq!(snapshot.issues.len(), 1);
    }
}
