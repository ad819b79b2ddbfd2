use std::fs;
use std::path::{Path, PathBuf};

use multifix::{ConfigError, PluginError, Vec3};
use serde::Deserialize;
use thiserror::Error;

pub(crate) const SCENARIO_ENV_VAR: &str = "MULTIFIX_SCENARIO";
const BUILTIN_SCENARIO_JSON: &str = include_str!("../../scenarios/default.json");
const BUILTIN_SCENARIO_LABEL: &str = "<builtin>";
const DEFAULT_TRIGGER_CLASS: &str = "trigger_multiple";

#[derive(Debug, Error)]
pub(crate) enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error("failed to read scenario {path}: {source}")]
    ReadScenario {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse scenario {path} at {location}: {message}")]
    ParseScenario {
        path: PathBuf,
        location: String,
        message: String,
    },
    #[error("invalid scenario {path}: {reason}")]
    InvalidScenario { path: PathBuf, reason: String },
    #[error("failed to encode simulation report: {0}")]
    Report(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default = "default_tick_rate")]
    pub(crate) tick_rate: u32,
    pub(crate) duration_seconds: f64,
    #[serde(default = "default_map")]
    pub(crate) map: String,
    /// Value the engine holds in the watched setting when the map loads.
    #[serde(default = "default_engine_gravity")]
    pub(crate) engine_gravity: f64,
    #[serde(default)]
    pub(crate) players: Vec<ScenarioPlayer>,
    #[serde(default)]
    pub(crate) steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScenarioPlayer {
    /// 1-based controller entity index.
    pub(crate) index: u32,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) bot: bool,
    #[serde(default)]
    pub(crate) position: [f32; 3],
    #[serde(default)]
    pub(crate) velocity: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScenarioStep {
    pub(crate) at: f64,
    pub(crate) action: ScenarioAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ScenarioAction {
    TriggerEnter {
        player: u32,
        trigger: String,
        #[serde(default = "default_trigger_class")]
        class: String,
    },
    TriggerExit {
        player: u32,
        trigger: String,
        #[serde(default = "default_trigger_class")]
        class: String,
    },
    Jump {
        player: u32,
    },
    SetVelocity {
        player: u32,
        velocity: [f32; 3],
    },
    Connect {
        player: ScenarioPlayer,
    },
    Disconnect {
        player: u32,
    },
    MapStart {
        map: String,
        #[serde(default)]
        engine_gravity: Option<f64>,
    },
}

impl Scenario {
    pub(crate) fn load(path: &Path) -> Result<Self, SimError> {
        let raw = fs::read_to_string(path).map_err(|source| SimError::ReadScenario {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    pub(crate) fn builtin() -> Result<Self, SimError> {
        Self::parse(BUILTIN_SCENARIO_JSON, Path::new(BUILTIN_SCENARIO_LABEL))
    }

    /// Reads the scenario named by `MULTIFIX_SCENARIO`, or the bundled demo
    /// scenario when the variable is unset.
    pub(crate) fn from_env() -> Result<Self, SimError> {
        match std::env::var_os(SCENARIO_ENV_VAR) {
            Some(path) => Self::load(Path::new(&path)),
            None => Self::builtin(),
        }
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, SimError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let mut scenario: Scenario =
            serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
                SimError::ParseScenario {
                    path: path.to_path_buf(),
                    location: err.path().to_string(),
                    message: err.inner().to_string(),
                }
            })?;
        scenario.validate(path)?;
        // Steps at the same instant keep their file order.
        scenario.steps.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(scenario)
    }

    fn validate(&self, path: &Path) -> Result<(), SimError> {
        let invalid = |reason: String| SimError::InvalidScenario {
            path: path.to_path_buf(),
            reason,
        };
        if self.tick_rate == 0 {
            return Err(invalid("tick_rate must be positive".to_string()));
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds <= 0.0 {
            return Err(invalid(format!(
                "duration_seconds must be positive, got {}",
                self.duration_seconds
            )));
        }
        let mut seen = Vec::with_capacity(self.players.len());
        for player in &self.players {
            if player.index == 0 {
                return Err(invalid(format!(
                    "player {} uses controller index 0",
                    player.name
                )));
            }
            if seen.contains(&player.index) {
                return Err(invalid(format!(
                    "controller index {} is used twice",
                    player.index
                )));
            }
            seen.push(player.index);
        }
        if let Some(step) = self.steps.iter().find(|step| !step.at.is_finite() || step.at < 0.0) {
            return Err(invalid(format!("step time {} is not a valid time", step.at)));
        }
        Ok(())
    }

    pub(crate) fn total_ticks(&self) -> u64 {
        (self.duration_seconds * f64::from(self.tick_rate)).ceil() as u64
    }
}

pub(crate) fn to_vec3(raw: [f32; 3]) -> Vec3 {
    Vec3::new(raw[0], raw[1], raw[2])
}

fn default_tick_rate() -> u32 {
    64
}

fn default_map() -> String {
    "de_multifix".to_string()
}

fn default_engine_gravity() -> f64 {
    800.0
}

fn default_trigger_class() -> String {
    DEFAULT_TRIGGER_CLASS.to_string()
}
