//! Survey configuration.
//!
//! Loaded from an optional JSON file, then overridden from the environment:
//! - `SURVEY_STORE_PATH`: SQLite checkpoint store location
//! - `SURVEY_RNG_SEED`: fixed seed for pair shuffling
//! - `SURVEY_MAX_WEIGHT`: largest accepted keyword weight magnitude

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalize::IntensityScale;

pub const ENV_STORE_PATH: &str = "SURVEY_STORE_PATH";
pub const ENV_RNG_SEED: &str = "SURVEY_RNG_SEED";
pub const ENV_MAX_WEIGHT: &str = "SURVEY_MAX_WEIGHT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
    #[error("invalid intensity scale: [{min}, {max}]")]
    InvalidScale { min: f64, max: f64 },
    #[error("max keyword weight must be at least 1")]
    InvalidMaxWeight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Range that response times are normalized onto.
    pub intensity_scale: IntensityScale,
    /// Keyword weights are accepted in `-max..=-1` and `1..=max`.
    pub max_keyword_weight: u32,
    pub rng_seed: Option<u64>,
    pub store_path: PathBuf,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            intensity_scale: IntensityScale::default(),
            max_keyword_weight: 7,
            rng_seed: None,
            store_path: PathBuf::from(".survey_sessions.sqlite"),
        }
    }
}

impl SurveyConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// File config if given, defaults otherwise, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => Self::from_path(p)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_STORE_PATH) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_RNG_SEED) {
            let seed = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_RNG_SEED,
                value: raw.clone(),
            })?;
            self.rng_seed = Some(seed);
        }
        if let Some(raw) = lookup(ENV_MAX_WEIGHT) {
            self.max_keyword_weight =
                raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_MAX_WEIGHT,
                    value: raw.clone(),
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.intensity_scale.is_valid() {
            return Err(ConfigError::InvalidScale {
                min: self.intensity_scale.min,
                max: self.intensity_scale.max,
            });
        }
        if self.max_keyword_weight < 1 {
            return Err(ConfigError::InvalidMaxWeight);
        }
        Ok(())
    }
}
