use std::collections::{BTreeSet, HashMap};

use crate::host::ActorSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverrideGeneration(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverrideDuration {
    Seconds(f64),
    Forever,
}

impl OverrideDuration {
    /// Replaces non-positive (or NaN) second counts with `fallback_seconds`.
    pub fn normalized(self, fallback_seconds: f64) -> Self {
        match self {
            Self::Seconds(seconds) if seconds > 0.0 => Self::Seconds(seconds),
            Self::Seconds(_) => Self::Seconds(fallback_seconds),
            Self::Forever => Self::Forever,
        }
    }

    pub fn seconds(self) -> Option<f64> {
        match self {
            Self::Seconds(seconds) => Some(seconds),
            Self::Forever => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expiry {
    At(f64),
    Never,
}

impl Expiry {
    pub fn is_expired_at(self, now: f64) -> bool {
        match self {
            Self::At(expires_at) => now > expires_at,
            Self::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Override {
    pub setting: String,
    pub value: f64,
    pub expires_at: Expiry,
    pub generation: OverrideGeneration,
}

/// Per-slot setting overrides with lazy expiry.
///
/// A slot has an entry only while it holds at least one override, and holds at
/// most one override per setting name. Only names in the watched allow-list
/// can be installed.
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    watched: BTreeSet<String>,
    by_slot: HashMap<ActorSlot, HashMap<String, Override>>,
    next_generation: u64,
}

impl OverrideTable {
    pub fn new<I, N>(watched: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self {
            watched: watched.into_iter().map(Into::into).collect(),
            by_slot: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn is_watched(&self, name: &str) -> bool {
        self.watched.contains(name)
    }

    /// Installs or replaces the override for `(slot, name)`. Returns `None`
    /// without touching the table when `name` is not watched.
    pub fn set(
        &mut self,
        slot: ActorSlot,
        name: &str,
        value: f64,
        duration: OverrideDuration,
        now: f64,
    ) -> Option<OverrideGeneration> {
        if !self.is_watched(name) {
            return None;
        }

        let generation = OverrideGeneration(self.next_generation);
        self.next_generation = self.next_generation.saturating_add(1);
        let expires_at = match duration {
            OverrideDuration::Seconds(seconds) => Expiry::At(now + seconds),
            OverrideDuration::Forever => Expiry::Never,
        };
        self.by_slot.entry(slot).or_default().insert(
            name.to_string(),
            Override {
                setting: name.to_string(),
                value,
                expires_at,
                generation,
            },
        );
        Some(generation)
    }

    pub fn clear(&mut self, slot: ActorSlot, name: &str) -> Option<Override> {
        let settings = self.by_slot.get_mut(&slot)?;
        let removed = settings.remove(name);
        if settings.is_empty() {
            self.by_slot.remove(&slot);
        }
        removed
    }

    pub fn clear_slot(&mut self, slot: ActorSlot) -> usize {
        self.by_slot
            .remove(&slot)
            .map(|settings| settings.len())
            .unwrap_or(0)
    }

    pub fn clear_all(&mut self) {
        self.by_slot.clear();
    }

    /// Reports whether `(slot, name)` holds an unexpired override at `now`.
    ///
    /// This is the single lazy-expiry point: an override found expired here is
    /// removed from the table, so callers must expect the table to shrink.
    pub fn is_active(&mut self, slot: ActorSlot, name: &str, now: f64) -> bool {
        let Some(expires_at) = self.get(slot, name).map(|entry| entry.expires_at) else {
            return false;
        };
        if expires_at.is_expired_at(now) {
            self.clear(slot, name);
            return false;
        }
        true
    }

    pub fn get(&self, slot: ActorSlot, name: &str) -> Option<&Override> {
        self.by_slot.get(&slot)?.get(name)
    }

    pub fn contains_slot(&self, slot: ActorSlot) -> bool {
        self.by_slot.contains_key(&slot)
    }

    pub fn len(&self) -> usize {
        self.by_slot.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAVITY: &str = "sv_gravity";

    fn table() -> OverrideTable {
        OverrideTable::new([GRAVITY])
    }

    #[test]
    fn override_is_active_through_its_expiry_instant() {
        let mut table = table();
        table.set(ActorSlot(2), GRAVITY, 400.0, OverrideDuration::Seconds(5.0), 10.0);

        assert!(table.is_active(ActorSlot(2), GRAVITY, 10.0));
        assert!(table.is_active(ActorSlot(2), GRAVITY, 12.0));
        assert!(table.is_active(ActorSlot(2), GRAVITY, 15.0));
        assert!(!table.is_active(ActorSlot(2), GRAVITY, 15.1));
    }

    #[test]
    fn expired_read_prunes_the_slot() {
        let mut table = table();
        table.set(ActorSlot(2), GRAVITY, 400.0, OverrideDuration::Seconds(5.0), 10.0);

        assert!(!table.is_active(ActorSlot(2), GRAVITY, 15.1));
        assert!(!table.contains_slot(ActorSlot(2)));
        assert!(table.get(ActorSlot(2), GRAVITY).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn get_does_not_expire_entries() {
        let mut table = table();
        table.set(ActorSlot(0), GRAVITY, 200.0, OverrideDuration::Seconds(1.0), 0.0);

        let entry = table.get(ActorSlot(0), GRAVITY).expect("override");
        assert_eq!(entry.expires_at, Expiry::At(1.0));
        assert!(table.contains_slot(ActorSlot(0)));
    }

    #[test]
    fn second_install_replaces_value_and_expiry() {
        let mut table = table();
        let first = table
            .set(ActorSlot(1), GRAVITY, 400.0, OverrideDuration::Seconds(5.0), 0.0)
            .expect("watched");
        let second = table
            .set(ActorSlot(1), GRAVITY, 100.0, OverrideDuration::Seconds(1.0), 2.0)
            .expect("watched");

        assert_ne!(first, second);
        assert_eq!(table.len(), 1);
        let entry = table.get(ActorSlot(1), GRAVITY).expect("override");
        assert_eq!(entry.value, 100.0);
        assert_eq!(entry.expires_at, Expiry::At(3.0));
        assert_eq!(entry.generation, second);
        assert!(!table.is_active(ActorSlot(1), GRAVITY, 3.5));
    }

    #[test]
    fn forever_override_only_leaves_by_clear() {
        let mut table = table();
        table.set(ActorSlot(4), GRAVITY, 50.0, OverrideDuration::Forever, 0.0);

        assert!(table.is_active(ActorSlot(4), GRAVITY, f64::MAX));
        let removed = table.clear(ActorSlot(4), GRAVITY).expect("removed");
        assert_eq!(removed.expires_at, Expiry::Never);
        assert!(!table.contains_slot(ActorSlot(4)));
    }

    #[test]
    fn unwatched_names_are_ignored() {
        let mut table = table();
        let generation = table.set(
            ActorSlot(0),
            "sv_maxspeed",
            320.0,
            OverrideDuration::Seconds(5.0),
            0.0,
        );

        assert_eq!(generation, None);
        assert!(table.is_empty());
        assert!(!table.is_active(ActorSlot(0), "sv_maxspeed", 1.0));
    }

    #[test]
    fn clearing_missing_entries_is_a_no_op() {
        let mut table = table();
        assert!(table.clear(ActorSlot(9), GRAVITY).is_none());

        table.set(ActorSlot(1), GRAVITY, 400.0, OverrideDuration::Seconds(5.0), 0.0);
        assert!(table.clear(ActorSlot(2), GRAVITY).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn slots_are_independent() {
        let mut table = table();
        table.set(ActorSlot(0), GRAVITY, 400.0, OverrideDuration::Seconds(1.0), 0.0);
        table.set(ActorSlot(1), GRAVITY, 200.0, OverrideDuration::Seconds(10.0), 0.0);

        assert!(!table.is_active(ActorSlot(0), GRAVITY, 2.0));
        assert!(table.is_active(ActorSlot(1), GRAVITY, 2.0));
        assert_eq!(table.clear_slot(ActorSlot(1)), 1);
        assert_eq!(table.clear_slot(ActorSlot(1)), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn non_positive_durations_fall_back() {
        assert_eq!(
            OverrideDuration::Seconds(0.0).normalized(3.0),
            OverrideDuration::Seconds(3.0)
        );
        assert_eq!(
            OverrideDuration::Seconds(-2.5).normalized(3.0),
            OverrideDuration::Seconds(3.0)
        );
        assert_eq!(
            OverrideDuration::Seconds(f64::NAN).normalized(3.0),
            OverrideDuration::Seconds(3.0)
        );
        assert_eq!(
            OverrideDuration::Seconds(0.5).normalized(3.0),
            OverrideDuration::Seconds(0.5)
        );
        assert_eq!(
            OverrideDuration::Forever.normalized(3.0),
            OverrideDuration::Forever
        );
    }
}
