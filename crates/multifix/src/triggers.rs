use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::config::TriggerNaming;
use crate::deferred::DeferredAction;
use crate::host::{
    ActorDirectory, ActorInfo, ActorSlot, HookResult, ReplicatedSetting, ServerHost, TimerScheduler,
    Vec3,
};
use crate::impersonator::GlobalValueImpersonator;
use crate::overrides::OverrideDuration;
use crate::trigger_names::{contains_keyword, parse_boost, parse_setting_override, BoostParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub phase: TriggerPhase,
    /// Engine class of the volume, e.g. `trigger_multiple`.
    pub trigger_class: String,
    pub trigger_name: String,
    /// `None` when the activator is not a player pawn.
    pub activator: Option<ActorSlot>,
}

/// Adds `boost.speed` to the horizontal speed while keeping its direction and
/// adds `boost.z_delta` to the vertical velocity. A standing-still actor only
/// gets the vertical part; horizontal speed never goes below zero.
pub fn apply_velocity_boost(velocity: Vec3, boost: BoostParams) -> Vec3 {
    let mut boosted = velocity;
    let speed_2d = velocity.horizontal_speed();
    if boost.speed != 0.0 && speed_2d > 0.0 {
        let scale = (speed_2d + boost.speed).max(0.0) / speed_2d;
        boosted.x = velocity.x * scale;
        boosted.y = velocity.y * scale;
    }
    boosted.z = velocity.z + boost.z_delta;
    boosted
}

/// Turns trigger and jump events into effects: jump blocking, one-shot
/// velocity boosts, and timed setting overrides routed through the
/// impersonator.
#[derive(Debug)]
pub struct TriggerEffectDispatcher {
    naming: TriggerNaming,
    effect_delay_seconds: f64,
    safety_reset: bool,
    jump_blocked: BTreeSet<ActorSlot>,
}

impl TriggerEffectDispatcher {
    pub fn new(naming: TriggerNaming, effect_delay_seconds: f64, safety_reset: bool) -> Self {
        Self {
            naming,
            effect_delay_seconds,
            safety_reset,
            jump_blocked: BTreeSet::new(),
        }
    }

    pub fn is_jump_blocked(&self, slot: ActorSlot) -> bool {
        self.jump_blocked.contains(&slot)
    }

    pub fn forget_actor(&mut self, slot: ActorSlot) {
        self.jump_blocked.remove(&slot);
    }

    pub fn clear(&mut self) {
        self.jump_blocked.clear();
    }

    pub fn on_trigger_event<S, H>(
        &mut self,
        event: &TriggerEvent,
        impersonator: &mut GlobalValueImpersonator<S>,
        host: &mut H,
    ) -> HookResult
    where
        S: ReplicatedSetting,
        H: ServerHost,
    {
        let Some((slot, actor)) = self.eligible_activator(event, host) else {
            return HookResult::Continue;
        };

        match event.phase {
            TriggerPhase::Enter => {
                info!(%slot, actor = %actor.name, trigger = %event.trigger_name, "trigger_entered");
                if event.trigger_name == self.naming.no_jump_name {
                    self.jump_blocked.insert(slot);
                    info!(%slot, actor = %actor.name, "jump_blocked");
                }
            }
            TriggerPhase::Exit => {
                info!(%slot, actor = %actor.name, trigger = %event.trigger_name, "trigger_left");
                self.on_trigger_exit(slot, &event.trigger_name, impersonator, host);
            }
        }
        HookResult::Continue
    }

    /// Jump event from the engine. A blocked actor gets its lift cancelled on
    /// the next opportunity and default jump handling is suppressed.
    pub fn on_jump<H>(&mut self, slot: Option<ActorSlot>, host: &mut H) -> HookResult
    where
        H: TimerScheduler + ActorDirectory,
    {
        let Some(slot) = slot else {
            warn!("jump_event_without_valid_user");
            return HookResult::Continue;
        };
        match host.actor(slot) {
            Some(actor) if actor.is_eligible() => {}
            _ => return HookResult::Continue,
        }
        if !self.is_jump_blocked(slot) {
            return HookResult::Continue;
        }

        info!(%slot, "jump_cancelled_in_no_jump_trigger");
        host.schedule_after(
            self.effect_delay_seconds,
            DeferredAction::CancelJumpLift { slot },
        );
        HookResult::Handled
    }

    fn eligible_activator<H>(&self, event: &TriggerEvent, host: &H) -> Option<(ActorSlot, ActorInfo)>
    where
        H: ActorDirectory,
    {
        if event.trigger_class != self.naming.trigger_class {
            debug!(
                class = %event.trigger_class,
                trigger = %event.trigger_name,
                "trigger_ignored_wrong_class"
            );
            return None;
        }
        let Some(slot) = event.activator else {
            debug!(trigger = %event.trigger_name, "trigger_ignored_no_player_activator");
            return None;
        };
        match host.actor(slot) {
            Some(actor) if actor.is_eligible() => Some((slot, actor)),
            _ => {
                debug!(%slot, trigger = %event.trigger_name, "trigger_ignored_ineligible_actor");
                None
            }
        }
    }

    fn on_trigger_exit<S, H>(
        &mut self,
        slot: ActorSlot,
        name: &str,
        impersonator: &mut GlobalValueImpersonator<S>,
        host: &mut H,
    ) where
        S: ReplicatedSetting,
        H: ServerHost,
    {
        if name == self.naming.no_jump_name {
            if self.jump_blocked.remove(&slot) {
                info!(%slot, "jump_unblocked");
            }
            return;
        }

        if contains_keyword(name, &self.naming.boost_keyword) {
            match parse_boost(name) {
                Some(boost) => {
                    debug!(
                        %slot,
                        trigger = name,
                        speed = boost.speed,
                        z_delta = boost.z_delta,
                        "boost_parsed"
                    );
                    host.schedule_after(
                        self.effect_delay_seconds,
                        DeferredAction::ApplyBoost { slot, boost },
                    );
                }
                None => debug!(%slot, trigger = name, "boost_name_without_values"),
            }
            return;
        }

        if !self
            .naming
            .override_keywords
            .iter()
            .any(|binding| contains_keyword(name, &binding.keyword))
        {
            return;
        }
        let Some(params) = parse_setting_override(name, &self.naming.override_keywords) else {
            debug!(%slot, trigger = name, "override_name_unparsed");
            return;
        };
        if !impersonator.watches(&params.setting) {
            debug!(
                %slot,
                trigger = name,
                setting = %params.setting,
                "override_ignored_unwatched_setting"
            );
            return;
        }
        if params.amount <= 0.0 {
            warn!(
                %slot,
                trigger = name,
                amount = params.amount,
                "override_discarded_non_positive_amount"
            );
            return;
        }

        let now = host.current_time();
        let Some(installed) = impersonator.install(
            slot,
            &params.setting,
            params.amount,
            OverrideDuration::Seconds(params.duration_seconds),
            now,
        ) else {
            return;
        };
        if let Some(duration_seconds) = installed.duration_seconds.filter(|_| self.safety_reset) {
            host.schedule_after(
                duration_seconds,
                DeferredAction::ExpireOverride {
                    slot,
                    setting: params.setting,
                    generation: installed.generation,
                },
            );
        }
    }
}
