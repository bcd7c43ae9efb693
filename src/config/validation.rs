//! Configuration validation
//!
//! Validates configuration and reports issues.

use secrecy::ExposeSecret;
use url::Url;

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_endpoint(config, result);
    result = validate_timeouts(config, result);

    result
}

fn validate_endpoint(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    match Url::parse(&config.gateway.url) {
        Ok(url) if matches!(url.scheme(), "ws" | "wss") => {
            if url.scheme() == "ws" && !is_loopback(&url) {
                result = result.with_warning(
                    ValidationIssue::new(
                        "gateway.url",
                        "Token is sent unencrypted to a non-local gateway",
                    )
                    .with_suggestion("Use a wss:// URL for remote gateways"),
                );
            }
        }
        Ok(url) => {
            result = result.with_error(
                ValidationIssue::new(
                    "gateway.url",
                    format!("Unsupported scheme: {}", url.scheme()),
                )
                .with_suggestion("Use ws:// or wss://"),
            );
        }
        Err(e) => {
            result = result.with_error(
                ValidationIssue::new("gateway.url", format!("Invalid URL: {}", e))
                    .with_suggestion("Set OPENCLAW_GATEWAY_URL, e.g. ws://127.0.0.1:18789"),
            );
        }
    }

    if config.gateway.token.expose_secret().is_empty() {
        result = result.with_warning(
            ValidationIssue::new("gateway.token", "No gateway token configured")
                .with_suggestion("Set OPENCLAW_GATEWAY_TOKEN unless the gateway runs without auth"),
        );
    }

    result
}

fn validate_timeouts(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.gateway.connect_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "gateway.connect_timeout",
            "Connect timeout must be greater than zero",
        ));
    }
    if config.gateway.request_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "gateway.request_timeout",
            "Request timeout must be greater than zero",
        ));
    }
    if config.gateway.history_limit == 0 {
        result = result.with_error(
            ValidationIssue::new("gateway.history_limit", "History limit must be at least 1")
                .with_suggestion("The gateway default is 50"),
        );
    }

    result
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::time::Duration;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        // Default config warns about the missing token but has no errors
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_validate_bad_url_and_timeouts() {
        let mut config = Config::default();
        config.gateway.url = "http://gw.example.com".to_string();
        config.gateway.request_timeout = Duration::ZERO;
        config.gateway.token = SecretString::from("t".to_string());

        let result = validate_config(&config);
        assert!(!result.valid);
        let paths: Vec<_> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["gateway.url", "gateway.request_timeout"]);
    }

    #[test]
    fn test_plain_ws_to_remote_host_warns() {
        let mut config = Config::default();
        config.gateway.url = "ws://gw.example.com:18789".to_string();
        config.gateway.token = SecretString::from("t".to_string());

        let result = validate_config(&config);
        assert!(result.valid);
        assert_eq!(result.warnings[0].path, "gateway.url");
    }
}
