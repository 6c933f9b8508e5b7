//! Configuration loading and representation.
//!
//! Everything comes from environment variables. Unset variables fall back to
//! defaults (with a warning where the default is only suitable for local runs);
//! set-but-invalid values are errors.

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use lectern_catalog::ReorderPolicy;
use lectern_core::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

use crate::engine::EngineSettings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Postgres connection string; `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub certificate_dir: PathBuf,
    pub certificate_url_prefix: String,
    pub reorder_policy: ReorderPolicy,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub admin_username: String,
    pub admin_email: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            certificate_dir: PathBuf::from("./uploads/certificates"),
            certificate_url_prefix: "/uploads/certificates".to_string(),
            reorder_policy: ReorderPolicy::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            admin_username: "admin".to_string(),
            admin_email: "admin@lectern.local".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let database_url = get("DATABASE_URL");
        if database_url.is_none() {
            warn!("DATABASE_URL not set; using the in-memory store");
        }

        let database_max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse_positive("DATABASE_MAX_CONNECTIONS", &raw)?,
            None => defaults.database_max_connections,
        };

        let default_page_size = match get("DEFAULT_PAGE_SIZE") {
            Some(raw) => parse_positive("DEFAULT_PAGE_SIZE", &raw)?,
            None => defaults.default_page_size,
        };
        let max_page_size = match get("MAX_PAGE_SIZE") {
            Some(raw) => parse_positive("MAX_PAGE_SIZE", &raw)?,
            None => defaults.max_page_size,
        };
        if default_page_size > max_page_size {
            return Err(ConfigError::invalid(
                "DEFAULT_PAGE_SIZE",
                format!("{default_page_size} exceeds MAX_PAGE_SIZE {max_page_size}"),
            ));
        }

        let reorder_policy = match get("REORDER_POLICY") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::invalid("REORDER_POLICY", format!("{e}")))?,
            None => defaults.reorder_policy,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            certificate_dir: get("CERTIFICATE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.certificate_dir),
            certificate_url_prefix: get("CERTIFICATE_URL_PREFIX")
                .unwrap_or(defaults.certificate_url_prefix),
            reorder_policy,
            default_page_size,
            max_page_size,
            admin_username: get("ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_email: get("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
        })
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            reorder_policy: self.reorder_policy,
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            protected_username: self.admin_username.clone(),
        }
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ConfigError::invalid(key, "must be at least 1")),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::invalid(key, format!("{raw:?}: {e}"))),
    }
}
