//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use std::path::PathBuf;

use tempfile::TempDir;
use threadline_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .base_url("http://127.0.0.1:4000")
///     .user_id("42")
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    /// Point every endpoint at `{base}/auth`, `{base}/users`, and so on.
    pub fn base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.config.api.auth_url = format!("{base}/auth");
        self.config.api.users_url = format!("{base}/users");
        self.config.api.contacts_url = format!("{base}/contacts");
        self.config.api.messages_url = format!("{base}/messages");
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api.request_timeout_secs = secs;
        self
    }

    pub fn user_id(mut self, user_id: &str) -> Self {
        self.config.identity.user_id = Some(user_id.to_string());
        self
    }

    pub fn identity_name(mut self, name: &str) -> Self {
        self.config.identity.name = Some(name.to_string());
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    /// Serialize the config to `threadline.toml` in a fresh temp dir.
    ///
    /// Keep the returned [`TempDir`] alive for as long as the file is needed.
    pub fn write_temp(self) -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("threadline.toml");
        let text = toml::to_string_pretty(&self.config).expect("serialize config");
        std::fs::write(&path, text).expect("write config file");
        (dir, path)
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
