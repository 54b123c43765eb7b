//! Configuration parsing and management.
//!
//! This module handles parsing of the `custodia.toml` service configuration:
//! the listen address and database path, session lifetime, and the
//! destruction approval policy. The approval ladder and witness minimum are
//! deployment policy, so they live here rather than as hardcoded invariants.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::Role;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The parsed configuration is inconsistent.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Destruction approval policy.
    #[serde(default)]
    pub destruction: DestructionConfig,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field consistency.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the destruction policy is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let levels = &self.destruction.approval_levels;
        if levels.is_empty() {
            return Err(ConfigError::Validation(
                "destruction.approval_levels must not be empty".to_string(),
            ));
        }
        for (index, level) in levels.iter().enumerate() {
            let expected = index as u32 + 1;
            if level.level != expected {
                return Err(ConfigError::Validation(format!(
                    "destruction.approval_levels must be numbered 1..={} in order, \
                     found level {} at position {}",
                    levels.len(),
                    level.level,
                    index + 1
                )));
            }
        }
        if self.destruction.min_witnesses == 0 {
            return Err(ConfigError::Validation(
                "destruction.min_witnesses must be at least 1".to_string(),
            ));
        }
        if self.auth.session_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.session_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Path of the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            db_path: default_db_path(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8420".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("custodia.db")
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Seconds a login session stays valid.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// When set and no `admin` account exists yet, the server creates one
    /// with this password at startup. Intended for first deployment only.
    #[serde(default)]
    pub bootstrap_admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            bootstrap_admin_password: None,
        }
    }
}

const fn default_session_ttl_secs() -> u64 {
    8 * 60 * 60
}

/// One required approval level for destruction requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalLevelConfig {
    /// Level number; levels must be numbered 1..=n in order.
    pub level: u32,

    /// Role required to decide this level. The static capability table
    /// still applies on top of this requirement.
    pub role: Role,
}

/// Destruction approval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestructionConfig {
    /// Ordered approval levels every destruction request must pass.
    #[serde(default = "default_approval_levels")]
    pub approval_levels: Vec<ApprovalLevelConfig>,

    /// Minimum number of witnesses on a request.
    #[serde(default = "default_min_witnesses")]
    pub min_witnesses: usize,
}

impl Default for DestructionConfig {
    fn default() -> Self {
        Self {
            approval_levels: default_approval_levels(),
            min_witnesses: default_min_witnesses(),
        }
    }
}

fn default_approval_levels() -> Vec<ApprovalLevelConfig> {
    vec![
        ApprovalLevelConfig {
            level: 1,
            role: Role::Supervisor,
        },
        ApprovalLevelConfig {
            level: 2,
            role: Role::Admin,
        },
    ]
}

const fn default_min_witnesses() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.destruction.approval_levels.len(), 2);
        assert_eq!(config.destruction.min_witnesses, 2);
    }

    #[test]
    fn parses_a_full_config() {
        let config = Config::from_toml(
            r#"
            [server]
            listen_addr = "0.0.0.0:9000"
            db_path = "/var/lib/custodia/custodia.db"

            [auth]
            session_ttl_secs = 3600

            [destruction]
            min_witnesses = 3
            approval_levels = [
                { level = 1, role = "Supervisor" },
                { level = 2, role = "Supervisor" },
                { level = 3, role = "Admin" },
            ]
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.auth.session_ttl_secs, 3600);
        assert_eq!(config.destruction.approval_levels.len(), 3);
        assert_eq!(config.destruction.min_witnesses, 3);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = Config::from_toml("").expect("empty config should parse");
        assert_eq!(config.server.listen_addr, "127.0.0.1:8420");
        assert_eq!(config.auth.session_ttl_secs, 8 * 60 * 60);
    }

    #[test]
    fn rejects_misnumbered_levels() {
        let err = Config::from_toml(
            r#"
            [destruction]
            approval_levels = [
                { level = 2, role = "Supervisor" },
                { level = 1, role = "Admin" },
            ]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_zero_witnesses() {
        let err = Config::from_toml(
            r#"
            [destruction]
            min_witnesses = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_unknown_role() {
        assert!(Config::from_toml(
            r#"
            [destruction]
            approval_levels = [{ level = 1, role = "SuperAdmin" }]
            "#,
        )
        .is_err());
    }
}
