//! Configuration management using Figment
//!
//! Configuration is loaded from the following sources, highest precedence
//! first:
//! 1. Environment variables (prefix: `SPECREPO_`, nested keys joined by `__`)
//! 2. `./specrepo.toml`, or the file passed to [`Config::load_from`]
//! 3. Default values
//!
//! ```toml
//! log_level = "debug"
//!
//! [repository]
//! retry_attempts = 5
//!
//! [audit]
//! enabled = true
//! user = "importer"
//! ```
//!
//! The same settings from the environment:
//! `SPECREPO_REPOSITORY__RETRY_ATTEMPTS=5`, `SPECREPO_AUDIT__ENABLED=true`.

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::audit::AuditConfig;
use crate::error::Result;
use crate::repository::DEFAULT_RETRY_ATTEMPTS;

/// File read by [`Config::load`]
pub const CONFIG_FILE: &str = "specrepo.toml";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "SPECREPO_";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Repository behaviour
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Audit stamping
    #[serde(default)]
    pub audit: AuditConfig,

    /// Log filter directive used by [`init_tracing`](crate::observability::init_tracing)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Total save attempts when the store reports concurrency conflicts
    ///
    /// Counts the first attempt, so `3` allows two retries. `0` behaves as `1`.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            audit: AuditConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `./specrepo.toml` and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file is not an error; defaults and environment variables
    /// still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!("Loading configuration from: {}", path.display());
        }

        let config = Self::figment(path).extract()?;
        Ok(config)
    }

    /// The provider stack behind [`load_from`](Self::load_from), for callers
    /// that want to merge their own providers on top
    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.repository.retry_attempts, 3);
        assert_eq!(config.log_level, "info");
        assert!(!config.audit.enabled);
        assert_eq!(config.audit.user, "system");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[repository]
retry_attempts = 5

[audit]
enabled = true
"#
        )
        .unwrap();

        let config = Config::figment(file.path()).extract::<Config>().unwrap();
        assert_eq!(config.repository.retry_attempts, 5);
        assert_eq!(config.log_level, "debug");
        assert!(config.audit.enabled);
        assert_eq!(config.audit.user, "system");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::figment(dir.path().join("absent.toml"))
            .extract::<Config>()
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
[repository]
retry_attempts = 5

[audit]
user = "importer"
"#,
            )?;
            jail.set_env("SPECREPO_REPOSITORY__RETRY_ATTEMPTS", "8");
            jail.set_env("SPECREPO_LOG_LEVEL", "warn");

            let config = Config::load().map_err(|e| e.to_string())?;
            assert_eq!(config.repository.retry_attempts, 8);
            assert_eq!(config.audit.user, "importer");
            assert_eq!(config.log_level, "warn");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_value_is_a_config_error() {
        Jail::expect_with(|jail| {
            jail.set_env("SPECREPO_REPOSITORY__RETRY_ATTEMPTS", "many");
            let err = Config::load().unwrap_err();
            assert!(matches!(err, crate::Error::Config(_)));
            Ok(())
        });
    }
}
