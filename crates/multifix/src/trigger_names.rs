//! Level designers encode effect parameters in trigger names, e.g.
//! `boost_speed50_z200` or `gravity_time2_amount400`. Names are lowercased and
//! split on `_`; each part is matched by prefix.

use serde::{Deserialize, Serialize};

const SPEED_PREFIX: &str = "speed";
const Z_PREFIX: &str = "z";
const TIME_PREFIX: &str = "time";
const AMOUNT_PREFIX: &str = "amount";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostParams {
    pub speed: f32,
    pub z_delta: f32,
}

/// Maps a trigger-name keyword to the replicated setting it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingKeyword {
    pub keyword: String,
    pub setting: String,
}

impl SettingKeyword {
    pub fn new(keyword: impl Into<String>, setting: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            setting: setting.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingOverrideParams {
    pub setting: String,
    /// As written in the name; zero when absent or unparsable.
    pub duration_seconds: f64,
    /// As written in the name; zero when absent or unparsable.
    pub amount: f64,
}

pub fn contains_keyword(name: &str, keyword: &str) -> bool {
    !keyword.is_empty()
        && name
            .to_ascii_lowercase()
            .contains(&keyword.to_ascii_lowercase())
}

/// Reads `speed<f>` and `z<f>` parts. Matches when either value is non-zero.
pub fn parse_boost(name: &str) -> Option<BoostParams> {
    let lowered = name.to_ascii_lowercase();
    let mut speed = 0.0f32;
    let mut z_delta = 0.0f32;
    for part in lowered.split('_') {
        if let Some(raw) = part.strip_prefix(SPEED_PREFIX) {
            if let Some(value) = parse_finite::<f32>(raw) {
                speed = value;
            }
        } else if let Some(raw) = part.strip_prefix(Z_PREFIX) {
            if let Some(value) = parse_finite::<f32>(raw) {
                z_delta = value;
            }
        }
    }

    (speed != 0.0 || z_delta != 0.0).then_some(BoostParams { speed, z_delta })
}

/// Reads the setting keyword plus `time<f>` and `amount<f>` parts.
///
/// Matches as soon as a part starts with one of `keywords`; the duration and
/// amount are returned raw so the caller decides how to treat bad values.
pub fn parse_setting_override(
    name: &str,
    keywords: &[SettingKeyword],
) -> Option<SettingOverrideParams> {
    let lowered = name.to_ascii_lowercase();
    let mut setting = None;
    let mut duration_seconds = 0.0f64;
    let mut amount = 0.0f64;
    for part in lowered.split('_') {
        if let Some(binding) = keywords
            .iter()
            .find(|binding| !binding.keyword.is_empty() && part.starts_with(&binding.keyword))
        {
            setting = Some(binding.setting.clone());
        } else if let Some(raw) = part.strip_prefix(TIME_PREFIX) {
            if let Some(value) = parse_finite::<f64>(raw) {
                duration_seconds = value;
            }
        } else if let Some(raw) = part.strip_prefix(AMOUNT_PREFIX) {
            if let Some(value) = parse_finite::<f64>(raw) {
                amount = value;
            }
        }
    }

    Some(SettingOverrideParams {
        setting: setting?,
        duration_seconds,
        amount,
    })
}

fn parse_finite<T>(raw: &str) -> Option<T>
where
    T: std::str::FromStr + Into<f64> + Copy,
{
    let value = raw.parse::<T>().ok()?;
    value.into().is_finite().then_some(value)
}
