use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, MultifixConfig};
use crate::deferred::DeferredAction;
use crate::host::{
    ActorDirectory, ActorSlot, HookError, HookResult, MovementHookSite, ReplicatedSetting,
    ServerClock, ServerHost, SlotResolver, TimerScheduler,
};
use crate::impersonator::GlobalValueImpersonator;
use crate::movement_hook::MovementHookBridge;
use crate::triggers::{apply_velocity_boost, TriggerEffectDispatcher, TriggerEvent};

pub const PLUGIN_NAME: &str = "multifix";

#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error("configured setting {configured} does not match the engine setting {engine}")]
    SettingMismatch { configured: String, engine: String },
}

/// Entry points the host server calls, wired to the impersonator, the movement
/// hook bridge and the trigger dispatcher.
///
/// Every call after `load` runs on the server's single tick thread.
#[derive(Debug)]
pub struct MultifixPlugin<S> {
    impersonator: GlobalValueImpersonator<S>,
    bridge: MovementHookBridge,
    dispatcher: TriggerEffectDispatcher,
}

impl<S: ReplicatedSetting> MultifixPlugin<S> {
    pub fn load(
        config: MultifixConfig,
        setting: S,
        hooks: &mut dyn MovementHookSite,
    ) -> Result<Self, PluginError> {
        config.validate()?;
        if setting.name() != config.watched_setting {
            return Err(PluginError::SettingMismatch {
                configured: config.watched_setting,
                engine: setting.name().to_string(),
            });
        }

        let mut impersonator = GlobalValueImpersonator::new(
            setting,
            config.initial_default,
            config.fallback_duration_seconds,
        );
        let bridge = MovementHookBridge::attach(hooks)?;
        impersonator.refresh_default();
        let dispatcher = TriggerEffectDispatcher::new(
            config.triggers,
            config.effect_delay_seconds,
            config.safety_reset,
        );

        info!(
            plugin = PLUGIN_NAME,
            version = env!("CARGO_PKG_VERSION"),
            setting = impersonator.setting_name(),
            default_value = impersonator.default_value(),
            "plugin_loaded"
        );
        Ok(Self {
            impersonator,
            bridge,
            dispatcher,
        })
    }

    /// Detaches the movement hooks. Safe to call more than once.
    pub fn unload(&mut self, hooks: &mut dyn MovementHookSite) {
        if self.bridge.is_attached() {
            self.bridge.detach(hooks);
            info!(plugin = PLUGIN_NAME, "plugin_unloaded");
        }
    }

    pub fn on_map_start(&mut self, map_name: &str) {
        self.dispatcher.clear();
        self.bridge.reset();
        let default_value = self.impersonator.reset_world();
        info!(map = map_name, default_value, "map_started");
    }

    pub fn on_movement_pre<H>(&mut self, host: &H, context: &H::Context) -> HookResult
    where
        H: SlotResolver + ServerClock,
    {
        let now = host.current_time();
        self.bridge.pre(host, context, &mut self.impersonator, now)
    }

    pub fn on_movement_post<H>(&mut self, host: &H, context: &H::Context) -> HookResult
    where
        H: SlotResolver + ServerClock,
    {
        let now = host.current_time();
        self.bridge.post(host, context, &mut self.impersonator, now)
    }

    pub fn on_trigger_event<H: ServerHost>(&mut self, event: &TriggerEvent, host: &mut H) -> HookResult {
        self.dispatcher
            .on_trigger_event(event, &mut self.impersonator, host)
    }

    pub fn on_player_jump<H>(&mut self, slot: Option<ActorSlot>, host: &mut H) -> HookResult
    where
        H: TimerScheduler + ActorDirectory,
    {
        self.dispatcher.on_jump(slot, host)
    }

    /// Forgets everything tied to `slot` so the next player in it starts clean.
    pub fn on_player_disconnect(&mut self, slot: ActorSlot) {
        self.dispatcher.forget_actor(slot);
        self.impersonator.revoke_slot(slot);
        debug!(%slot, "player_state_cleared");
    }

    /// Runs a timer action handed back by the host.
    pub fn run_deferred<H: ActorDirectory>(&mut self, action: DeferredAction, host: &mut H) {
        match action {
            DeferredAction::ExpireOverride {
                slot,
                setting,
                generation,
            } => {
                self.impersonator.expire_if_current(slot, &setting, generation);
            }
            DeferredAction::ApplyBoost { slot, boost } => {
                let Some(velocity) = eligible_velocity(host, slot) else {
                    debug!(%slot, "boost_skipped_actor_gone");
                    return;
                };
                let boosted = apply_velocity_boost(velocity, boost);
                match host.teleport_velocity(slot, boosted) {
                    Ok(()) => info!(
                        %slot,
                        speed = boost.speed,
                        z_delta = boost.z_delta,
                        horizontal_speed = boosted.horizontal_speed(),
                        vertical_speed = boosted.z,
                        "boost_applied"
                    ),
                    Err(err) => warn!(%slot, error = %err, "boost_teleport_failed"),
                }
            }
            DeferredAction::CancelJumpLift { slot } => {
                let Some(mut velocity) = eligible_velocity(host, slot) else {
                    debug!(%slot, "jump_cancel_skipped_actor_gone");
                    return;
                };
                velocity.z = 0.0;
                if let Err(err) = host.teleport_velocity(slot, velocity) {
                    warn!(%slot, error = %err, "jump_cancel_teleport_failed");
                }
            }
        }
    }

    pub fn impersonator(&self) -> &GlobalValueImpersonator<S> {
        &self.impersonator
    }

    pub fn dispatcher(&self) -> &TriggerEffectDispatcher {
        &self.dispatcher
    }

    pub fn hooks_attached(&self) -> bool {
        self.bridge.is_attached()
    }
}

fn eligible_velocity<H: ActorDirectory>(host: &H, slot: ActorSlot) -> Option<crate::host::Vec3> {
    host.actor(slot).filter(|actor| actor.is_eligible())?;
    host.velocity(slot)
}
