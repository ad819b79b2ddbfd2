//! Boundary between the plugin and the game server it runs inside.
//!
//! Everything the plugin needs from the engine goes through the traits here:
//! the replicated setting cell, the server clock, the one-shot timer facility,
//! actor lookup and pawn velocity access, and the movement hook site.

use std::fmt;

use thiserror::Error;

use crate::deferred::DeferredAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorSlot(pub u32);

impl ActorSlot {
    /// Controller entity indices start at 1; slot 0 belongs to index 1.
    pub fn from_controller_index(index: u32) -> Option<Self> {
        index.checked_sub(1).map(Self)
    }

    pub fn controller_index(self) -> u32 {
        self.0.saturating_add(1)
    }
}

impl fmt::Display for ActorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn horizontal_speed(self) -> f32 {
        self.x.hypot(self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorInfo {
    pub name: String,
    pub is_bot: bool,
    pub has_pawn: bool,
}

impl ActorInfo {
    /// Only human players with a live pawn receive trigger effects.
    pub fn is_eligible(&self) -> bool {
        !self.is_bot && self.has_pawn
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    Continue,
    Handled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookMode {
    Pre,
    Post,
}

#[derive(Debug, Error)]
pub enum SettingError {
    #[error("setting {name} is not registered with the engine")]
    Missing { name: String },
    #[error("engine rejected access to setting {name}: {reason}")]
    Unreachable { name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("actor slot {slot} has no pawn")]
    NoPawn { slot: ActorSlot },
    #[error("engine rejected velocity update for slot {slot}: {reason}")]
    Rejected { slot: ActorSlot, reason: String },
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to attach {mode:?} movement hook: {reason}")]
    Attach { mode: HookMode, reason: String },
    #[error("failed to detach {mode:?} movement hook: {reason}")]
    Detach { mode: HookMode, reason: String },
}

/// One server-wide replicated numeric setting.
pub trait ReplicatedSetting {
    fn name(&self) -> &str;
    fn read(&self) -> Result<f64, SettingError>;
    fn write(&mut self, value: f64) -> Result<(), SettingError>;
}

pub trait ServerClock {
    /// Server time in seconds. Never decreases.
    fn current_time(&self) -> f64;
}

/// One-shot, non-cancellable timers. When a timer is due the host hands the
/// action back to [`crate::MultifixPlugin::run_deferred`] on the tick thread.
pub trait TimerScheduler {
    fn schedule_after(&mut self, delay_seconds: f64, action: DeferredAction);
}

pub trait SlotResolver {
    type Context;

    fn resolve_slot(&self, context: &Self::Context) -> Option<ActorSlot>;
}

pub trait ActorDirectory {
    fn actor(&self, slot: ActorSlot) -> Option<ActorInfo>;
    fn velocity(&self, slot: ActorSlot) -> Option<Vec3>;
    fn teleport_velocity(&mut self, slot: ActorSlot, velocity: Vec3) -> Result<(), HostError>;
}

pub trait MovementHookSite {
    fn attach(&mut self, mode: HookMode) -> Result<(), HookError>;
    fn detach(&mut self, mode: HookMode) -> Result<(), HookError>;
}

/// Everything trigger and timer handling needs from the server.
pub trait ServerHost: ServerClock + TimerScheduler + ActorDirectory {}

impl<T> ServerHost for T where T: ServerClock + TimerScheduler + ActorDirectory {}
