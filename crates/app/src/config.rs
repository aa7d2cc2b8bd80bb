//! Runtime configuration from an optional TOML file plus environment overrides.
//!
//! Precedence, lowest first: defaults, TOML file (`--config` or `QUIZ_CONFIG`),
//! environment (`QUIZ_DB_URL`, `QUIZ_PASS_THRESHOLD`), command-line flags.

use std::path::{Path, PathBuf};

use quiz_core::scoring::{DEFAULT_PASS_THRESHOLD, PassPolicy};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://quiz.sqlite3";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid pass threshold {raw}: expected an integer between 0 and 100")]
    InvalidThreshold { raw: String },

    #[error("invalid database url: {raw:?}")]
    InvalidDbUrl { raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,
    pub pass_threshold: u8,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.into(),
            pass_threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

impl AppConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for malformed documents or unknown keys.
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the file at `path`, or defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_toml_str(&raw, path)?;
        info!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    /// Apply `QUIZ_DB_URL` and `QUIZ_PASS_THRESHOLD` from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for blank urls or out-of-range thresholds.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("QUIZ_DB_URL") {
            self.set_database_url(url)?;
        }
        if let Some(raw) = lookup("QUIZ_PASS_THRESHOLD") {
            self.set_pass_threshold(&raw)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidDbUrl` for blank values.
    pub fn set_database_url(&mut self, url: String) -> Result<(), ConfigError> {
        if url.trim().is_empty() {
            return Err(ConfigError::InvalidDbUrl { raw: url });
        }
        self.database_url = url;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` unless `raw` is an integer in `0..=100`.
    pub fn set_pass_threshold(&mut self, raw: &str) -> Result<(), ConfigError> {
        let threshold = raw
            .trim()
            .parse::<u8>()
            .ok()
            .filter(|t| *t <= 100)
            .ok_or_else(|| ConfigError::InvalidThreshold { raw: raw.to_owned() })?;
        self.pass_threshold = threshold;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::InvalidDbUrl {
                raw: self.database_url.clone(),
            });
        }
        self.pass_policy().map(|_| ())
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidThreshold` when the threshold exceeds 100.
    pub fn pass_policy(&self) -> Result<PassPolicy, ConfigError> {
        PassPolicy::new(self.pass_threshold).map_err(|_| ConfigError::InvalidThreshold {
            raw: self.pass_threshold.to_string(),
        })
    }
}
