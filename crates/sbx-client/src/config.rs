//! # Client Configuration
//!
//! Loaded from a TOML file when one exists, then overridden from the
//! environment (`SBX_BASE_URL`, `SBX_DOMAIN`, `SBX_APP_KEY`, `SBX_TOKEN`).

use std::path::Path;

use sbx_core::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Numeric id of the SBX domain every query targets.
    #[serde(default)]
    pub domain: i64,
    #[serde(default)]
    pub app_key: String,
    /// Session token, sent as a bearer token when present.
    #[serde(default)]
    pub token: Option<String>,
    /// Upper bound on page loads running at once during a paged find.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            domain: 0,
            app_key: String::new(),
            token: None,
            max_concurrency: default_max_concurrency(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://sbxcloud.com".into()
}
fn default_max_concurrency() -> usize {
    8
}
fn default_timeout_secs() -> u64 {
    30
}

impl ClientConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read `path` if it exists, defaults otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {:?}: {}", path, e)))?;
        Self::from_toml_str(&content)
    }

    /// Apply `SBX_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `SBX_*` overrides from an arbitrary lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = lookup("SBX_BASE_URL") {
            self.base_url = url;
        }
        if let Some(domain) = lookup("SBX_DOMAIN") {
            self.domain = domain
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("SBX_DOMAIN is not a number: '{}'", domain)))?;
        }
        if let Some(key) = lookup("SBX_APP_KEY") {
            self.app_key = key;
        }
        if let Some(token) = lookup("SBX_TOKEN") {
            self.token = Some(token).filter(|t| !t.is_empty());
        }
        Ok(self)
    }

    /// Reject settings no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.app_key.is_empty() {
            return Err(Error::Config("app_key is not set".into()));
        }
        if self.domain <= 0 {
            return Err(Error::Config("domain is not set".into()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
