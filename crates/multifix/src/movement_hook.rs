use tracing::{debug, info, trace, warn};

use crate::host::{
    ActorSlot, HookError, HookMode, HookResult, MovementHookSite, ReplicatedSetting, SlotResolver,
};
use crate::impersonator::GlobalValueImpersonator;

const HOOK_MODES: [HookMode; 2] = [HookMode::Pre, HookMode::Post];

/// Brackets each actor's movement step with the impersonator's pre/post
/// calls. Holds no setting state; it only tracks which hooks are attached and
/// which actor's window is open.
#[derive(Debug, Default)]
pub struct MovementHookBridge {
    attached: Vec<HookMode>,
    open_window: Option<ActorSlot>,
}

impl MovementHookBridge {
    /// Attaches both hooks. If the second attach fails the first is detached
    /// again so nothing is left behind.
    pub fn attach(site: &mut dyn MovementHookSite) -> Result<Self, HookError> {
        let mut bridge = Self::default();
        for mode in HOOK_MODES {
            if let Err(err) = site.attach(mode) {
                bridge.detach(site);
                return Err(err);
            }
            bridge.attached.push(mode);
        }
        info!(hooks = ?bridge.attached, "movement_hooks_attached");
        Ok(bridge)
    }

    /// Detaches every attached hook exactly once. Later calls do nothing.
    pub fn detach(&mut self, site: &mut dyn MovementHookSite) {
        for mode in self.attached.drain(..) {
            match site.detach(mode) {
                Ok(()) => debug!(?mode, "movement_hook_detached"),
                Err(err) => warn!(?mode, error = %err, "movement_hook_detach_failed"),
            }
        }
        self.open_window = None;
    }

    pub fn is_attached(&self) -> bool {
        !self.attached.is_empty()
    }

    /// Forgets the open window without touching the setting, for a world
    /// reload that has already restored the default.
    pub fn reset(&mut self) {
        self.open_window = None;
    }

    pub fn open_window(&self) -> Option<ActorSlot> {
        self.open_window
    }

    pub fn pre<R, S>(
        &mut self,
        resolver: &R,
        context: &R::Context,
        impersonator: &mut GlobalValueImpersonator<S>,
        now: f64,
    ) -> HookResult
    where
        R: SlotResolver,
        S: ReplicatedSetting,
    {
        let resolved = resolver.resolve_slot(context);
        if let Some(stale) = self.open_window.take() {
            warn!(%stale, next = ?resolved, "movement_post_missing_closing_stale_window");
            impersonator.on_post_tick(stale, now);
        }
        let Some(slot) = resolved else {
            trace!("movement_pre_unresolved_slot");
            return HookResult::Continue;
        };

        if let Some(value) = impersonator.on_pre_tick(slot, now) {
            trace!(%slot, value, "movement_pre_applied");
        }
        self.open_window = Some(slot);
        HookResult::Continue
    }

    pub fn post<R, S>(
        &mut self,
        resolver: &R,
        context: &R::Context,
        impersonator: &mut GlobalValueImpersonator<S>,
        now: f64,
    ) -> HookResult
    where
        R: SlotResolver,
        S: ReplicatedSetting,
    {
        let Some(slot) = resolver.resolve_slot(context) else {
            return HookResult::Continue;
        };

        match self.open_window.take() {
            Some(open) if open != slot => {
                warn!(%open, %slot, "movement_post_slot_mismatch");
                impersonator.on_post_tick(open, now);
            }
            Some(_) => {}
            None => trace!(%slot, "movement_post_without_pre"),
        }
        impersonator.on_post_tick(slot, now);
        HookResult::Continue
    }
}
