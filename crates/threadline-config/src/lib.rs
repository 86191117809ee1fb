#![deny(unsafe_code)]

//! Configuration loading and validation for Threadline.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure: remote endpoint URLs, the optional local
//! identity, and logging.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote endpoint configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// The local user, if already signed in.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote endpoints.
///
/// Each collaborator lives behind its own URL; the message store is addressed
/// with `chatId` / `contactId` / `messageId` query parameters on `messages_url`.
///
/// ## TOML Example
///
/// ```toml
/// [api]
/// auth_url = "https://api.example.com/auth"
/// users_url = "https://api.example.com/users"
/// contacts_url = "https://api.example.com/contacts"
/// messages_url = "https://api.example.com/messages"
/// request_timeout_secs = 15
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Sign-in endpoint (`POST {phone, name}`).
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// User search endpoint (`GET ?query=`).
    #[serde(default = "default_users_url")]
    pub users_url: String,

    /// Contact list endpoint (`GET`, `POST {contactId}`).
    #[serde(default = "default_contacts_url")]
    pub contacts_url: String,

    /// Message store endpoint (`GET`, `POST`, `PUT`, `DELETE`).
    #[serde(default = "default_messages_url")]
    pub messages_url: String,

    /// Per-request timeout in seconds. A timed-out call is an ordinary failure.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            users_url: default_users_url(),
            contacts_url: default_contacts_url(),
            messages_url: default_messages_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_auth_url() -> String {
    "http://127.0.0.1:8080/auth".to_string()
}

fn default_users_url() -> String {
    "http://127.0.0.1:8080/users".to_string()
}

fn default_contacts_url() -> String {
    "http://127.0.0.1:8080/contacts".to_string()
}

fn default_messages_url() -> String {
    "http://127.0.0.1:8080/messages".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

/// The local user as remembered from a previous sign-in.
///
/// `user_id` is sent as the `X-User-Id` header on every call. When it is
/// absent the session treats the user as signed out and skips remote calls.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Durable user id assigned by the auth endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Phone number used to sign in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        debug!(path = %path.display(), bytes = content.len(), "Loaded config file");
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoints = [
            ("api.auth_url", &self.api.auth_url),
            ("api.users_url", &self.api.users_url),
            ("api.contacts_url", &self.api.contacts_url),
            ("api.messages_url", &self.api.messages_url),
        ];
        for (field, url) in endpoints {
            if url.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{field} must not be empty"
                )));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{field} must be an http:// or https:// URL, got {url:?}"
                )));
            }
        }

        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "api.request_timeout_secs must be non-zero".to_string(),
            ));
        }

        if let Some(ref user_id) = self.identity.user_id
            && user_id.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "identity.user_id must not be blank when set".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.api.messages_url, "http://127.0.0.1:8080/messages");
        assert_eq!(config.api.request_timeout_secs, 15);
        assert!(config.identity.user_id.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.api.contacts_url, "http://127.0.0.1:8080/contacts");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml = r#"
            [api]
            auth_url = "https://chat.example.com/auth"
            users_url = "https://chat.example.com/users"
            contacts_url = "https://chat.example.com/contacts"
            messages_url = "https://chat.example.com/messages"
            request_timeout_secs = 30

            [identity]
            user_id = "42"
            phone = "+15550100"
            name = "Alice"

            [logging]
            level = "debug"
        "#;
        let config = AppConfig::parse(toml).unwrap();
        assert_eq!(config.api.messages_url, "https://chat.example.com/messages");
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.identity.user_id.as_deref(), Some("42"));
        assert_eq!(config.identity.name.as_deref(), Some("Alice"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_empty_url() {
        let toml = r#"
            [api]
            messages_url = ""
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_non_http_url() {
        let toml = r#"
            [api]
            contacts_url = "ftp://files.example.com/contacts"
        "#;
        let err = AppConfig::parse(toml).unwrap_err();
        assert!(err.to_string().contains("api.contacts_url"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let toml = r#"
            [api]
            request_timeout_secs = 0
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_blank_user_id() {
        let toml = r#"
            [identity]
            user_id = "   "
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_validation_rejects_unknown_log_level() {
        let toml = r#"
            [logging]
            level = "verbose"
        "#;
        assert!(AppConfig::parse(toml).is_err());
    }

    #[test]
    fn test_identity_round_trips_through_toml() {
        let mut config = AppConfig::default();
        config.identity.user_id = Some("7".to_string());
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("user_id = \"7\""));
        assert!(!text.contains("phone"));
    }

    // ── Async file-based loading ──────────────────────────────────────

    #[test_log::test(tokio::test)]
    async fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("threadline.toml");
        tokio::fs::write(&path, b"[identity]\nuser_id = \"99\"\n")
            .await
            .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.identity.user_id.as_deref(), Some("99"));
    }

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let result = AppConfig::load(Path::new("/nonexistent/file.toml")).await;
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn test_load_invalid_toml_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, b"not valid toml [[[").await.unwrap();

        let result = AppConfig::load(&path).await;
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("bad value".to_string());
        assert_eq!(err.to_string(), "validation error: bad value");
    }
}
