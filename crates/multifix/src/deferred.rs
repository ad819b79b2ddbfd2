use crate::host::ActorSlot;
use crate::overrides::OverrideGeneration;
use crate::trigger_names::BoostParams;

/// Work scheduled through [`crate::host::TimerScheduler`].
///
/// Timers cannot be cancelled, so every action re-validates current state
/// when it runs instead of trusting what was true when it was scheduled.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferredAction {
    /// Retire the override only if it still carries `generation`.
    ExpireOverride {
        slot: ActorSlot,
        setting: String,
        generation: OverrideGeneration,
    },
    ApplyBoost {
        slot: ActorSlot,
        boost: BoostParams,
    },
    CancelJumpLift {
        slot: ActorSlot,
    },
}

impl DeferredAction {
    pub fn slot(&self) -> ActorSlot {
        match self {
            Self::ExpireOverride { slot, .. }
            | Self::ApplyBoost { slot, .. }
            | Self::CancelJumpLift { slot } => *slot,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ExpireOverride { .. } => "expire_override",
            Self::ApplyBoost { .. } => "apply_boost",
            Self::CancelJumpLift { .. } => "cancel_jump_lift",
        }
    }
}
