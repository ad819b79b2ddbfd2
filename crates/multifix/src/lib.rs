//! Per-player values for a server-wide replicated setting, plus trigger-driven
//! movement effects (boosts and jump blocking).
//!
//! The game server owns the setting (gravity by default) as one global cell.
//! [`GlobalValueImpersonator`] writes a player's override right before that
//! player's movement step and restores the default right after, so each
//! player's movement sees its own value while everything else sees the
//! default.

mod config;
mod deferred;
mod host;
mod impersonator;
mod movement_hook;
mod overrides;
mod plugin;
mod trigger_names;
mod triggers;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, MultifixConfig, TriggerNaming, CONFIG_ENV_VAR};
pub use deferred::DeferredAction;
pub use host::{
    ActorDirectory, ActorInfo, ActorSlot, HookError, HookMode, HookResult, HostError,
    MovementHookSite, ReplicatedSetting, ServerClock, ServerHost, SettingError, SlotResolver,
    TimerScheduler, Vec3,
};
pub use impersonator::{GlobalValueImpersonator, InstalledOverride, SettingState};
pub use movement_hook::MovementHookBridge;
pub use overrides::{Expiry, Override, OverrideDuration, OverrideGeneration, OverrideTable};
pub use plugin::{MultifixPlugin, PluginError, PLUGIN_NAME};
pub use trigger_names::{
    contains_keyword, parse_boost, parse_setting_override, BoostParams, SettingKeyword,
    SettingOverrideParams,
};
pub use triggers::{apply_velocity_boost, TriggerEffectDispatcher, TriggerEvent, TriggerPhase};
