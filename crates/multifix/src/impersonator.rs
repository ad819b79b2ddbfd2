use tracing::{debug, info, warn};

use crate::host::{ActorSlot, ReplicatedSetting};
use crate::overrides::{OverrideDuration, OverrideGeneration, OverrideTable};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettingState {
    pub default_value: f64,
    /// Last value this impersonator wrote. Only meaningful while a window is
    /// open.
    pub current_applied_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstalledOverride {
    pub slot: ActorSlot,
    pub generation: OverrideGeneration,
    /// Normalized duration, `None` for overrides that never expire.
    pub duration_seconds: Option<f64>,
}

/// Makes one server-wide setting look different to different actors.
///
/// The setting is a single shared cell, so correctness comes from temporal
/// exclusivity: the engine runs each actor's movement sequentially inside a
/// tick, and this type writes the actor's override right before that
/// actor's movement and restores the default right after. No locking is
/// done. If actor movement were ever processed concurrently, this type would
/// need a per-actor lock or an engine API that accepts per-actor values.
///
/// This is the only writer of the setting cell.
#[derive(Debug)]
pub struct GlobalValueImpersonator<S> {
    setting: S,
    table: OverrideTable,
    state: SettingState,
    live_slot: Option<ActorSlot>,
    fallback_duration_seconds: f64,
}

impl<S: ReplicatedSetting> GlobalValueImpersonator<S> {
    pub fn new(setting: S, initial_default: f64, fallback_duration_seconds: f64) -> Self {
        let table = OverrideTable::new([setting.name().to_string()]);
        Self {
            setting,
            table,
            state: SettingState {
                default_value: initial_default,
                current_applied_value: initial_default,
            },
            live_slot: None,
            fallback_duration_seconds,
        }
    }

    pub fn setting_name(&self) -> &str {
        self.setting.name()
    }

    pub fn watches(&self, name: &str) -> bool {
        self.table.is_watched(name)
    }

    pub fn state(&self) -> SettingState {
        self.state
    }

    pub fn default_value(&self) -> f64 {
        self.state.default_value
    }

    pub fn table(&self) -> &OverrideTable {
        &self.table
    }

    /// Slot whose override value is currently written to the setting.
    pub fn live_slot(&self) -> Option<ActorSlot> {
        self.live_slot
    }

    /// Re-reads the engine's value as the default. Call at load and on every
    /// world load before any override logic runs.
    pub fn refresh_default(&mut self) -> f64 {
        match self.setting.read() {
            Ok(value) => {
                if self.live_slot.is_some() && value == self.state.current_applied_value {
                    warn!(
                        setting = self.setting.name(),
                        observed = value,
                        kept_default = self.state.default_value,
                        "default_refresh_skipped_override_live"
                    );
                } else {
                    self.state.default_value = value;
                    self.state.current_applied_value = value;
                    self.live_slot = None;
                    info!(
                        setting = self.setting.name(),
                        default_value = value,
                        "default_refreshed"
                    );
                }
            }
            Err(err) => {
                warn!(
                    setting = self.setting.name(),
                    error = %err,
                    kept_default = self.state.default_value,
                    "default_refresh_failed"
                );
            }
        }
        self.state.default_value
    }

    /// Drops every override and re-reads the default, for a world reload.
    /// An override value still sitting in the setting is replaced by the
    /// default first so it cannot be adopted as the new default.
    pub fn reset_world(&mut self) -> f64 {
        let dropped = self.table.len();
        self.table.clear_all();
        if dropped > 0 {
            info!(dropped, "overrides_dropped_on_world_reset");
        }
        if let Some(slot) = self.live_slot {
            match self.setting.read() {
                Ok(value) if value == self.state.current_applied_value => {
                    self.restore_default(slot);
                }
                _ => self.live_slot = None,
            }
        }
        self.refresh_default()
    }

    /// Opens `slot`'s window: writes its active override unless the setting
    /// already holds that value. Returns the value written, if any.
    pub fn on_pre_tick(&mut self, slot: ActorSlot, now: f64) -> Option<f64> {
        let name = self.setting.name().to_string();
        if !self.table.is_active(slot, &name, now) {
            return None;
        }
        let value = self.table.get(slot, &name)?.value;

        let current = match self.setting.read() {
            Ok(current) => current,
            Err(err) => {
                warn!(%slot, setting = %name, error = %err, "override_read_failed");
                return None;
            }
        };
        if current == value {
            self.live_slot = Some(slot);
            return None;
        }

        match self.setting.write(value) {
            Ok(()) => {
                self.state.current_applied_value = value;
                self.live_slot = Some(slot);
                debug!(%slot, setting = %name, value, "override_applied");
                Some(value)
            }
            Err(err) => {
                warn!(%slot, setting = %name, value, error = %err, "override_write_failed");
                None
            }
        }
    }

    /// Closes `slot`'s window. Retires the override if it has expired and
    /// restores the default whenever an override value is still live.
    pub fn on_post_tick(&mut self, slot: ActorSlot, now: f64) {
        let name = self.setting.name().to_string();
        let expired = self
            .table
            .get(slot, &name)
            .is_some_and(|entry| entry.expires_at.is_expired_at(now));
        if expired {
            self.table.clear(slot, &name);
            info!(%slot, setting = %name, now, "override_expired");
        }

        if expired || self.live_slot.is_some() {
            self.restore_default(slot);
        }
    }

    /// Installs an override and writes it immediately so it is visible before
    /// the next tick. Returns `None` when `name` is not the watched setting.
    pub fn install(
        &mut self,
        slot: ActorSlot,
        name: &str,
        value: f64,
        duration: OverrideDuration,
        now: f64,
    ) -> Option<InstalledOverride> {
        let duration = duration.normalized(self.fallback_duration_seconds);
        let Some(generation) = self.table.set(slot, name, value, duration, now) else {
            debug!(%slot, setting = name, "override_ignored_unwatched_setting");
            return None;
        };

        match self.setting.write(value) {
            Ok(()) => {
                self.state.current_applied_value = value;
                self.live_slot = Some(slot);
            }
            Err(err) => {
                warn!(%slot, setting = name, value, error = %err, "override_write_failed");
            }
        }
        info!(
            %slot,
            setting = name,
            value,
            duration_seconds = ?duration.seconds(),
            default_value = self.state.default_value,
            "override_installed"
        );

        Some(InstalledOverride {
            slot,
            generation,
            duration_seconds: duration.seconds(),
        })
    }

    pub fn revoke(&mut self, slot: ActorSlot, name: &str) {
        if self.table.clear(slot, name).is_some() {
            info!(%slot, setting = name, "override_revoked");
            self.restore_default(slot);
        }
    }

    pub fn revoke_slot(&mut self, slot: ActorSlot) {
        let removed = self.table.clear_slot(slot);
        if removed > 0 {
            info!(%slot, removed, "overrides_revoked_for_slot");
            self.restore_default(slot);
        }
    }

    /// Safety-net retirement from a timer scheduled at install time. Acts only
    /// if the override still carries `generation`; a replaced or already
    /// retired override is left alone.
    pub fn expire_if_current(
        &mut self,
        slot: ActorSlot,
        name: &str,
        generation: OverrideGeneration,
    ) -> bool {
        let current = self.table.get(slot, name).map(|entry| entry.generation);
        if current != Some(generation) {
            debug!(
                %slot,
                setting = name,
                scheduled = generation.0,
                current = ?current.map(|generation| generation.0),
                "safety_reset_stale"
            );
            return false;
        }

        self.table.clear(slot, name);
        info!(%slot, setting = name, "safety_reset_applied");
        self.restore_default(slot);
        true
    }

    fn restore_default(&mut self, slot: ActorSlot) {
        let default_value = self.state.default_value;
        match self.setting.write(default_value) {
            Ok(()) => {
                self.state.current_applied_value = default_value;
                self.live_slot = None;
            }
            Err(err) => {
                // Left open so the next post-tick retries the restore.
                self.live_slot = Some(slot);
                warn!(
                    %slot,
                    setting = self.setting.name(),
                    default_value,
                    error = %err,
                    "default_restore_failed"
                );
            }
        }
    }
}
