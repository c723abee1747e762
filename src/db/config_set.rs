//! Ordered collection of target configurations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::models::TargetConfig;

/// Targets in user order, addressable by identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredSet", into = "StoredSet")]
pub struct ConfigSet {
    configs: IndexMap<Uuid, TargetConfig>,
}

/// Persisted shape: `{"configs": [...]}`.
#[derive(Serialize, Deserialize)]
struct StoredSet {
    #[serde(default)]
    configs: Vec<TargetConfig>,
}

impl From<StoredSet> for ConfigSet {
    fn from(stored: StoredSet) -> Self {
        stored.configs.into_iter().collect()
    }
}

impl From<ConfigSet> for StoredSet {
    fn from(set: ConfigSet) -> Self {
        Self {
            configs: set.configs.into_values().collect(),
        }
    }
}

impl FromIterator<TargetConfig> for ConfigSet {
    fn from_iter<I: IntoIterator<Item = TargetConfig>>(iter: I) -> Self {
        let mut set = Self::default();
        for config in iter {
            set.add(config);
        }
        set
    }
}

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.configs.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetConfig> {
        self.configs.values()
    }

    pub fn get(&self, id: &Uuid) -> Option<&TargetConfig> {
        self.configs.get(id)
    }

    /// Look up a target, returning an empty one when `id` is unknown.
    pub fn get_or_default(&self, id: &Uuid) -> TargetConfig {
        self.configs.get(id).cloned().unwrap_or_default()
    }

    /// Append a target. A duplicate identifier is rejected.
    pub fn add(&mut self, config: TargetConfig) -> bool {
        let id = config.id();
        if self.configs.contains_key(&id) {
            tracing::warn!("ConfigSet: ignoring duplicate target {}", id);
            return false;
        }
        self.configs.insert(id, config);
        true
    }

    /// Remove every target whose id is in `ids`, keeping survivor order.
    ///
    /// Returns the number of targets removed.
    pub fn remove(&mut self, ids: &HashSet<Uuid>) -> usize {
        let before = self.configs.len();
        self.configs.retain(|id, _| !ids.contains(id));
        before - self.configs.len()
    }

    /// Move the targets at `from` so they sit before the target originally at `to`.
    ///
    /// Offsets past the end are ignored and `to` is clamped to the length,
    /// so `to == len()` moves the targets to the end. Returns whether the
    /// order changed.
    pub fn move_targets(&mut self, from: &[usize], to: usize) -> bool {
        let len = self.configs.len();
        let mut offsets: Vec<usize> = from.iter().copied().filter(|&i| i < len).collect();
        offsets.sort_unstable();
        offsets.dedup();
        if offsets.is_empty() {
            return false;
        }

        let before: Vec<Uuid> = self.configs.keys().copied().collect();

        let to = to.min(len);
        let shifted = offsets.iter().filter(|&&i| i < to).count();

        let mut entries: Vec<(Uuid, TargetConfig)> = self.configs.drain(..).collect();
        let mut moved = Vec::with_capacity(offsets.len());
        for &i in offsets.iter().rev() {
            moved.push(entries.remove(i));
        }
        moved.reverse();

        let at = to - shifted;
        entries.splice(at..at, moved);
        self.configs = entries.into_iter().collect();

        !self.configs.keys().eq(before.iter())
    }

    /// Replace the target with this `id`. Unknown ids are left alone.
    pub fn update(&mut self, id: Uuid, config: TargetConfig) -> bool {
        match self.configs.get_mut(&id) {
            Some(slot) => {
                *slot = config.with_id(id);
                true
            }
            None => false,
        }
    }
}
