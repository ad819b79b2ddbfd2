use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::deferred::DeferredAction;
use crate::host::{
    ActorDirectory, ActorInfo, ActorSlot, HookError, HookMode, HostError, MovementHookSite,
    ReplicatedSetting, ServerClock, SettingError, SlotResolver, TimerScheduler, Vec3,
};

/// Setting cell shared between the code under test and the assertions.
#[derive(Debug, Clone)]
pub(crate) struct FakeSetting {
    name: &'static str,
    value: Rc<Cell<f64>>,
    writes: Rc<Cell<u32>>,
    failing_reads: Rc<Cell<u32>>,
    failing_writes: Rc<Cell<u32>>,
}

impl FakeSetting {
    pub(crate) fn new(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value: Rc::new(Cell::new(value)),
            writes: Rc::new(Cell::new(0)),
            failing_reads: Rc::new(Cell::new(0)),
            failing_writes: Rc::new(Cell::new(0)),
        }
    }

    pub(crate) fn value(&self) -> f64 {
        self.value.get()
    }

    /// Changes the value behind the plugin's back, like a map change would.
    pub(crate) fn set_value(&self, value: f64) {
        self.value.set(value);
    }

    pub(crate) fn write_count(&self) -> u32 {
        self.writes.get()
    }

    pub(crate) fn fail_reads(&self, count: u32) {
        self.failing_reads.set(count);
    }

    pub(crate) fn fail_writes(&self, count: u32) {
        self.failing_writes.set(count);
    }

    fn take_failure(counter: &Cell<u32>) -> bool {
        let remaining = counter.get();
        if remaining == 0 {
            return false;
        }
        counter.set(remaining - 1);
        true
    }

    fn unreachable(&self) -> SettingError {
        SettingError::Unreachable {
            name: self.name.to_string(),
            reason: "injected failure".to_string(),
        }
    }
}

impl ReplicatedSetting for FakeSetting {
    fn name(&self) -> &str {
        self.name
    }

    fn read(&self) -> Result<f64, SettingError> {
        if Self::take_failure(&self.failing_reads) {
            return Err(self.unreachable());
        }
        Ok(self.value.get())
    }

    fn write(&mut self, value: f64) -> Result<(), SettingError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(self.unreachable());
        }
        self.writes.set(self.writes.get() + 1);
        self.value.set(value);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeHookSite {
    attached: Vec<HookMode>,
    detach_calls: u32,
    fail_on: Option<HookMode>,
}

impl FakeHookSite {
    pub(crate) fn failing_on(mode: HookMode) -> Self {
        Self {
            fail_on: Some(mode),
            ..Self::default()
        }
    }

    pub(crate) fn attached(&self) -> Vec<HookMode> {
        self.attached.clone()
    }

    pub(crate) fn detach_calls(&self) -> u32 {
        self.detach_calls
    }
}

impl MovementHookSite for FakeHookSite {
    fn attach(&mut self, mode: HookMode) -> Result<(), HookError> {
        if self.fail_on == Some(mode) {
            return Err(HookError::Attach {
                mode,
                reason: "signature not found".to_string(),
            });
        }
        self.attached.push(mode);
        Ok(())
    }

    fn detach(&mut self, mode: HookMode) -> Result<(), HookError> {
        self.detach_calls += 1;
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

/// Resolves 1-based controller indices; index 0 stands for a context with no
/// owning player.
#[derive(Debug, Default)]
pub(crate) struct FakeResolver;

impl SlotResolver for FakeResolver {
    type Context = u32;

    fn resolve_slot(&self, context: &u32) -> Option<ActorSlot> {
        ActorSlot::from_controller_index(*context)
    }
}

#[derive(Debug)]
struct FakePlayer {
    name: String,
    is_bot: bool,
    velocity: Vec3,
}

#[derive(Debug, Default)]
pub(crate) struct FakeHost {
    now: f64,
    players: BTreeMap<ActorSlot, FakePlayer>,
    scheduled: Vec<(f64, DeferredAction)>,
    teleports: u32,
}

impl FakeHost {
    pub(crate) fn add_player(&mut self, slot: ActorSlot, name: &str, is_bot: bool) {
        self.players.insert(
            slot,
            FakePlayer {
                name: name.to_string(),
                is_bot,
                velocity: Vec3::ZERO,
            },
        );
    }

    pub(crate) fn remove_player(&mut self, slot: ActorSlot) {
        self.players.remove(&slot);
    }

    pub(crate) fn set_velocity(&mut self, slot: ActorSlot, velocity: Vec3) {
        if let Some(player) = self.players.get_mut(&slot) {
            player.velocity = velocity;
        }
    }

    pub(crate) fn velocity_of(&self, slot: ActorSlot) -> Vec3 {
        self.players
            .get(&slot)
            .map(|player| player.velocity)
            .unwrap_or_default()
    }

    pub(crate) fn set_time(&mut self, now: f64) {
        self.now = now;
    }

    pub(crate) fn scheduled(&self) -> Vec<(f64, DeferredAction)> {
        self.scheduled.clone()
    }

    pub(crate) fn take_scheduled(&mut self) -> Vec<(f64, DeferredAction)> {
        std::mem::take(&mut self.scheduled)
    }

    pub(crate) fn teleports(&self) -> u32 {
        self.teleports
    }
}

/// Movement contexts are 1-based controller indices, as with [`FakeResolver`],
/// but only connected players resolve.
impl SlotResolver for FakeHost {
    type Context = u32;

    fn resolve_slot(&self, context: &u32) -> Option<ActorSlot> {
        ActorSlot::from_controller_index(*context).filter(|slot| self.players.contains_key(slot))
    }
}

impl ServerClock for FakeHost {
    fn current_time(&self) -> f64 {
        self.now
    }
}

impl TimerScheduler for FakeHost {
    fn schedule_after(&mut self, delay_seconds: f64, action: DeferredAction) {
        self.scheduled.push((delay_seconds, action));
    }
}

impl ActorDirectory for FakeHost {
    fn actor(&self, slot: ActorSlot) -> Option<ActorInfo> {
        self.players.get(&slot).map(|player| ActorInfo {
            name: player.name.clone(),
            is_bot: player.is_bot,
            has_pawn: true,
        })
    }

    fn velocity(&self, slot: ActorSlot) -> Option<Vec3> {
        self.players.get(&slot).map(|player| player.velocity)
    }

    fn teleport_velocity(&mut self, slot: ActorSlot, velocity: Vec3) -> Result<(), HostError> {
        let player = self
            .players
            .get_mut(&slot)
            .ok_or(HostError::NoPawn { slot })?;
        player.velocity = velocity;
        self.teleports += 1;
        Ok(())
    }
}
