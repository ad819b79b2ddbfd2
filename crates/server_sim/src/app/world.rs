use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use multifix::{
    ActorDirectory, ActorInfo, ActorSlot, DeferredAction, HookError, HookMode, HostError,
    MovementHookSite, ReplicatedSetting, ServerClock, SettingError, SlotResolver, TimerScheduler,
    Vec3,
};
use serde::Serialize;
use tracing::{debug, info};

use super::scenario::{to_vec3, ScenarioPlayer};

pub(crate) const JUMP_SPEED: f32 = 301.993_38;

/// Engine-owned global cell for the watched setting. Clones share the cell, so
/// the movement code reads whatever the plugin last wrote.
#[derive(Debug, Clone)]
pub(crate) struct SimSetting {
    name: String,
    value: Rc<Cell<f64>>,
}

impl SimSetting {
    pub(crate) fn new(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: Rc::new(Cell::new(value)),
        }
    }

    pub(crate) fn current(&self) -> f64 {
        self.value.get()
    }

    /// Engine-side reset, e.g. a map config executing on load.
    pub(crate) fn engine_set(&self, value: f64) {
        self.value.set(value);
    }
}

impl ReplicatedSetting for SimSetting {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Result<f64, SettingError> {
        Ok(self.value.get())
    }

    fn write(&mut self, value: f64) -> Result<(), SettingError> {
        if !value.is_finite() {
            return Err(SettingError::Unreachable {
                name: self.name.clone(),
                reason: format!("non-finite value {value}"),
            });
        }
        self.value.set(value);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct SimHookSite {
    attached: Vec<HookMode>,
}

impl SimHookSite {
    pub(crate) fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

impl MovementHookSite for SimHookSite {
    fn attach(&mut self, mode: HookMode) -> Result<(), HookError> {
        if self.attached.contains(&mode) {
            return Err(HookError::Attach {
                mode,
                reason: "already attached".to_string(),
            });
        }
        self.attached.push(mode);
        Ok(())
    }

    fn detach(&mut self, mode: HookMode) -> Result<(), HookError> {
        let Some(index) = self.attached.iter().position(|attached| *attached == mode) else {
            return Err(HookError::Detach {
                mode,
                reason: "not attached".to_string(),
            });
        };
        self.attached.remove(index);
        Ok(())
    }
}

/// Handle the engine passes to the movement hooks; the plugin resolves it to
/// a slot through the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MovementContext {
    pub(crate) controller_index: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub(crate) struct GravityStats {
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) last: f64,
    pub(crate) samples: u64,
}

impl GravityStats {
    fn record(stats: &mut Option<Self>, value: f64) {
        match stats {
            Some(existing) => {
                existing.min = existing.min.min(value);
                existing.max = existing.max.max(value);
                existing.last = value;
                existing.samples = existing.samples.saturating_add(1);
            }
            None => {
                *stats = Some(Self {
                    min: value,
                    max: value,
                    last: value,
                    samples: 1,
                });
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SimPawn {
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) on_ground: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SimPlayer {
    pub(crate) name: String,
    pub(crate) is_bot: bool,
    pub(crate) pawn: Option<SimPawn>,
    pub(crate) gravity_seen: Option<GravityStats>,
    pub(crate) jumps: u32,
}

#[derive(Debug)]
struct PendingTimer {
    fire_at: f64,
    sequence: u64,
    action: DeferredAction,
}

/// Headless stand-in for the game server: the clock, the timer queue and the
/// players keyed by controller index.
#[derive(Debug, Default)]
pub(crate) struct SimWorld {
    now: f64,
    players: BTreeMap<u32, SimPlayer>,
    timers: Vec<PendingTimer>,
    next_timer_sequence: u64,
}

impl SimWorld {
    pub(crate) fn connect(&mut self, player: &ScenarioPlayer) {
        let position = to_vec3(player.position);
        self.players.insert(
            player.index,
            SimPlayer {
                name: player.name.clone(),
                is_bot: player.bot,
                pawn: Some(SimPawn {
                    position,
                    velocity: to_vec3(player.velocity),
                    on_ground: position.z <= 0.0,
                }),
                gravity_seen: None,
                jumps: 0,
            },
        );
        info!(
            index = player.index,
            name = %player.name,
            bot = player.bot,
            "player_connected"
        );
    }

    pub(crate) fn disconnect(&mut self, index: u32) -> Option<SimPlayer> {
        let removed = self.players.remove(&index);
        if let Some(player) = &removed {
            info!(index, name = %player.name, "player_disconnected");
        }
        removed
    }

    pub(crate) fn slot_of(&self, index: u32) -> Option<ActorSlot> {
        self.players
            .contains_key(&index)
            .then(|| ActorSlot::from_controller_index(index))
            .flatten()
    }

    pub(crate) fn player(&self, index: u32) -> Option<&SimPlayer> {
        self.players.get(&index)
    }

    pub(crate) fn players(&self) -> impl Iterator<Item = (u32, &SimPlayer)> {
        self.players.iter().map(|(index, player)| (*index, player))
    }

    /// Controller indices with a live pawn, in the order the engine runs
    /// their movement.
    pub(crate) fn pawn_indices(&self) -> Vec<u32> {
        self.players
            .iter()
            .filter(|(_, player)| player.pawn.is_some())
            .map(|(index, _)| *index)
            .collect()
    }

    pub(crate) fn set_velocity(&mut self, index: u32, velocity: Vec3) {
        if let Some(pawn) = self.pawn_mut(index) {
            pawn.velocity = velocity;
        }
    }

    /// Starts a jump if the pawn is standing. Returns whether it left the
    /// ground.
    pub(crate) fn jump(&mut self, index: u32) -> bool {
        let Some(player) = self.players.get_mut(&index) else {
            return false;
        };
        let Some(pawn) = player.pawn.as_mut().filter(|pawn| pawn.on_ground) else {
            return false;
        };
        pawn.velocity.z = JUMP_SPEED;
        pawn.on_ground = false;
        player.jumps = player.jumps.saturating_add(1);
        true
    }

    pub(crate) fn advance_to(&mut self, now: f64) {
        self.now = self.now.max(now);
    }

    /// Removes and returns every timer due at the current time, earliest
    /// first; timers due at the same instant run in scheduling order.
    pub(crate) fn take_due_timers(&mut self) -> Vec<DeferredAction> {
        let now = self.now;
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timers)
            .into_iter()
            .partition(|timer| timer.fire_at <= now);
        self.timers = pending;
        due.sort_by(|a, b| {
            a.fire_at
                .total_cmp(&b.fire_at)
                .then(a.sequence.cmp(&b.sequence))
        });
        due.into_iter().map(|timer| timer.action).collect()
    }

    pub(crate) fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// One movement step for one pawn under `gravity`.
    pub(crate) fn step_pawn(&mut self, index: u32, gravity: f64, dt_seconds: f32) {
        let Some(player) = self.players.get_mut(&index) else {
            return;
        };
        let Some(pawn) = player.pawn.as_mut() else {
            return;
        };
        GravityStats::record(&mut player.gravity_seen, gravity);

        if pawn.velocity.z > 0.0 {
            pawn.on_ground = false;
        }
        if !pawn.on_ground {
            pawn.velocity.z -= gravity as f32 * dt_seconds;
        }
        pawn.position.x += pawn.velocity.x * dt_seconds;
        pawn.position.y += pawn.velocity.y * dt_seconds;
        pawn.position.z += pawn.velocity.z * dt_seconds;
        if pawn.position.z <= 0.0 {
            pawn.position.z = 0.0;
            pawn.velocity.z = pawn.velocity.z.max(0.0);
            pawn.on_ground = true;
        }
    }

    fn pawn_mut(&mut self, index: u32) -> Option<&mut SimPawn> {
        self.players
            .get_mut(&index)
            .and_then(|player| player.pawn.as_mut())
    }
}

impl ServerClock for SimWorld {
    fn current_time(&self) -> f64 {
        self.now
    }
}

impl TimerScheduler for SimWorld {
    fn schedule_after(&mut self, delay_seconds: f64, action: DeferredAction) {
        let fire_at = self.now + delay_seconds.max(0.0);
        debug!(kind = action.kind_name(), fire_at, "timer_scheduled");
        self.timers.push(PendingTimer {
            fire_at,
            sequence: self.next_timer_sequence,
            action,
        });
        self.next_timer_sequence = self.next_timer_sequence.saturating_add(1);
    }
}

impl SlotResolver for SimWorld {
    type Context = MovementContext;

    fn resolve_slot(&self, context: &MovementContext) -> Option<ActorSlot> {
        self.players
            .get(&context.controller_index)
            .filter(|player| player.pawn.is_some())?;
        ActorSlot::from_controller_index(context.controller_index)
    }
}

impl ActorDirectory for SimWorld {
    fn actor(&self, slot: ActorSlot) -> Option<ActorInfo> {
        self.players
            .get(&slot.controller_index())
            .map(|player| ActorInfo {
                name: player.name.clone(),
                is_bot: player.is_bot,
                has_pawn: player.pawn.is_some(),
            })
    }

    fn velocity(&self, slot: ActorSlot) -> Option<Vec3> {
        self.players
            .get(&slot.controller_index())
            .and_then(|player| player.pawn.as_ref())
            .map(|pawn| pawn.velocity)
    }

    fn teleport_velocity(&mut self, slot: ActorSlot, velocity: Vec3) -> Result<(), HostError> {
        if !(velocity.x.is_finite() && velocity.y.is_finite() && velocity.z.is_finite()) {
            return Err(HostError::Rejected {
                slot,
                reason: "non-finite velocity".to_string(),
            });
        }
        let pawn = self
            .pawn_mut(slot.controller_index())
            .ok_or(HostError::NoPawn { slot })?;
        pawn.velocity = velocity;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(index: u32, name: &str, z: f32) -> ScenarioPlayer {
        ScenarioPlayer {
            index,
            name: name.to_string(),
            bot: false,
            position: [0.0, 0.0, z],
            velocity: [0.0; 3],
        }
    }

    #[test]
    fn resolver_maps_controller_index_to_slot() {
        let mut world = SimWorld::default();
        world.connect(&player(2, "bob", 0.0));

        let context = MovementContext {
            controller_index: 2,
        };
        assert_eq!(world.resolve_slot(&context), Some(ActorSlot(1)));
        assert_eq!(
            world.resolve_slot(&MovementContext {
                controller_index: 5
            }),
            None
        );
        assert_eq!(world.actor(ActorSlot(1)).map(|actor| actor.name), Some("bob".to_string()));
    }

    #[test]
    fn timers_fire_in_time_then_schedule_order() {
        let mut world = SimWorld::default();
        world.schedule_after(0.5, DeferredAction::CancelJumpLift { slot: ActorSlot(2) });
        world.schedule_after(0.1, DeferredAction::CancelJumpLift { slot: ActorSlot(0) });
        world.schedule_after(0.1, DeferredAction::CancelJumpLift { slot: ActorSlot(1) });

        world.advance_to(0.2);
        let due: Vec<_> = world
            .take_due_timers()
            .iter()
            .map(DeferredAction::slot)
            .collect();
        assert_eq!(due, vec![ActorSlot(0), ActorSlot(1)]);
        assert_eq!(world.pending_timers(), 1);

        world.advance_to(1.0);
        assert_eq!(world.take_due_timers().len(), 1);
    }

    #[test]
    fn airborne_pawn_falls_under_given_gravity() {
        let mut world = SimWorld::default();
        world.connect(&player(1, "alice", 100.0));

        for _ in 0..10 {
            world.step_pawn(1, 800.0, 0.01);
        }
        let alice = world.player(1).expect("alice");
        let pawn = alice.pawn.as_ref().expect("pawn");
        assert!((pawn.velocity.z + 80.0).abs() < 1e-3);
        assert!(pawn.position.z < 100.0);
        let stats = alice.gravity_seen.expect("stats");
        assert_eq!((stats.min, stats.max, stats.samples), (800.0, 800.0, 10));
    }

    #[test]
    fn grounded_pawn_jumps_once_until_landing() {
        let mut world = SimWorld::default();
        world.connect(&player(1, "alice", 0.0));

        assert!(world.jump(1));
        assert!(!world.jump(1));
        for _ in 0..200 {
            world.step_pawn(1, 800.0, 0.01);
        }
        assert!(world.player(1).and_then(|p| p.pawn.as_ref()).expect("pawn").on_ground);
        assert!(world.jump(1));
    }

    #[test]
    fn teleport_without_pawn_is_rejected() {
        let mut world = SimWorld::default();
        assert!(matches!(
            world.teleport_velocity(ActorSlot(0), Vec3::ZERO),
            Err(HostError::NoPawn { .. })
        ));
    }

    #[test]
    fn hook_site_rejects_double_attach() {
        let mut site = SimHookSite::default();
        site.attach(HookMode::Pre).expect("attach");
        assert!(site.attach(HookMode::Pre).is_err());
        site.detach(HookMode::Pre).expect("detach");
        assert!(site.detach(HookMode::Pre).is_err());
        assert_eq!(site.attached_count(), 0);
    }
}
