//! Runtime configuration loaded from TOML.


use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use serde::Deserialize;
use thiserror::Error as ThisError;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Config, err.to_string())
    }
}

///
/// DbConfig
///
/// Every section is optional; missing values fall back to defaults.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    pub plan_cache: PlanCacheConfig,
    pub fulltext: FullTextConfig,
    pub build: BuildConfig,
}

impl DbConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plan_cache.enabled && self.plan_cache.capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "plan_cache.capacity",
                reason: "must be positive when the cache is enabled".to_string(),
            });
        }
        if self.fulltext.min_word_length == 0 {
            return Err(ConfigError::Invalid {
                field: "fulltext.min_word_length",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.fulltext.separators.is_empty() {
            return Err(ConfigError::Invalid {
                field: "fulltext.separators",
                reason: "must contain at least one character".to_string(),
            });
        }
        if self.build.progress_step == 0 {
            return Err(ConfigError::Invalid {
                field: "build.progress_step",
                reason: "must be positive".to_string(),
            });
        }

        Ok(())
    }
}

///
/// PlanCacheConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PlanCacheConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for PlanCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 256,
        }
    }
}

///
/// FullTextConfig
///
/// Word splitting rules for FULLTEXT indexes.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FullTextConfig {
    pub min_word_length: usize,
    pub separators: String,
    pub stop_words: Vec<String>,
    pub ignore_case: bool,
}

impl Default for FullTextConfig {
    fn default() -> Self {
        Self {
            min_word_length: 3,
            separators: " \r\n\t:;,.|+*/\\=!?[]()".to_string(),
            stop_words: ["the", "in", "a", "at", "as", "and", "or", "for", "his", "her", "him"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            ignore_case: true,
        }
    }
}

///
/// BuildConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Records between two progress callbacks during a bulk build.
    pub progress_step: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            progress_step: 1000,
        }
    }
}
