use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trigger_names::SettingKeyword;

pub const CONFIG_ENV_VAR: &str = "MULTIFIX_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultifixConfig {
    /// The one replicated setting impersonated per actor.
    pub watched_setting: String,
    /// Default assumed until the engine is first queried successfully.
    pub initial_default: f64,
    pub fallback_duration_seconds: f64,
    /// Delay before boosts and jump cancellation run, so they land after the
    /// engine's own touch and jump processing.
    pub effect_delay_seconds: f64,
    pub safety_reset: bool,
    pub triggers: TriggerNaming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TriggerNaming {
    pub trigger_class: String,
    pub no_jump_name: String,
    pub boost_keyword: String,
    pub override_keywords: Vec<SettingKeyword>,
}

impl Default for MultifixConfig {
    fn default() -> Self {
        Self {
            watched_setting: "sv_gravity".to_string(),
            initial_default: 800.0,
            fallback_duration_seconds: 3.0,
            effect_delay_seconds: 0.01,
            safety_reset: true,
            triggers: TriggerNaming::default(),
        }
    }
}

impl Default for TriggerNaming {
    fn default() -> Self {
        Self {
            trigger_class: "trigger_multiple".to_string(),
            no_jump_name: "nojump".to_string(),
            boost_keyword: "boost".to_string(),
            override_keywords: vec![SettingKeyword::new("gravity", "sv_gravity")],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl MultifixConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config =
            serde_json::from_str::<Self>(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `MULTIFIX_CONFIG`, or the defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(value) => Self::load(Path::new(value.trim())),
            Err(env::VarError::NotPresent) => Ok(Self::default()),
            Err(source) => Err(ConfigError::EnvVar {
                var: CONFIG_ENV_VAR,
                source,
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watched_setting.trim().is_empty() {
            return Err(invalid("watched_setting", "must not be empty"));
        }
        if !self.initial_default.is_finite() {
            return Err(invalid("initial_default", "must be finite"));
        }
        if !(self.fallback_duration_seconds.is_finite() && self.fallback_duration_seconds > 0.0) {
            return Err(invalid(
                "fallback_duration_seconds",
                format!("must be positive, got {}", self.fallback_duration_seconds),
            ));
        }
        if !(self.effect_delay_seconds.is_finite() && self.effect_delay_seconds >= 0.0) {
            return Err(invalid(
                "effect_delay_seconds",
                format!("must not be negative, got {}", self.effect_delay_seconds),
            ));
        }
        if self.triggers.trigger_class.trim().is_empty() {
            return Err(invalid("triggers.trigger_class", "must not be empty"));
        }
        if self.triggers.no_jump_name.trim().is_empty() {
            return Err(invalid("triggers.no_jump_name", "must not be empty"));
        }
        if self.triggers.boost_keyword.trim().is_empty() {
            return Err(invalid("triggers.boost_keyword", "must not be empty"));
        }
        if let Some(binding) = self
            .triggers
            .override_keywords
            .iter()
            .find(|binding| binding.keyword.trim().is_empty() || binding.setting.trim().is_empty())
        {
            return Err(invalid(
                "triggers.override_keywords",
                format!("empty keyword or setting in {binding:?}"),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
