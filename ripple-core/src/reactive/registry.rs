//! Wrapper Registry
//!
//! Associates a raw container with its dependency record without keeping
//! the container alive. A raw value that has been dropped leaves a dead entry
//! behind; dead entries are swept whenever the registry outgrows its
//! threshold, and the threshold then doubles so sweeping stays amortized.

use std::collections::HashMap;

use tracing::trace;

use crate::graph::Dep;
use crate::value::{Raw, RawId, WeakRaw};

struct Entry {
    raw: WeakRaw,
    dep: Dep,
}

pub(crate) struct WrapperRegistry {
    entries: HashMap<RawId, Entry>,
    sweep_at: usize,
}

impl WrapperRegistry {
    pub(crate) fn new(sweep_threshold: usize) -> Self {
        Self {
            entries: HashMap::new(),
            sweep_at: sweep_threshold.max(1),
        }
    }

    /// The dep of `raw`, creating it on first use.
    pub(crate) fn dep_for(&mut self, raw: &Raw) -> Dep {
        if let Some(entry) = self.entries.get(&raw.id()) {
            if entry.raw.is_alive() {
                return entry.dep.clone();
            }
        }

        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }

        let dep = Dep::new(Some(raw.id()));
        self.entries.insert(
            raw.id(),
            Entry {
                raw: raw.downgrade(),
                dep: dep.clone(),
            },
        );
        dep
    }

    /// The dep of `raw` if it has been wrapped before.
    pub(crate) fn get(&self, id: RawId) -> Option<Dep> {
        self.entries
            .get(&id)
            .filter(|entry| entry.raw.is_alive())
            .map(|entry| entry.dep.clone())
    }

    /// The raw container behind `id`, if it is still alive.
    pub(crate) fn raw(&self, id: RawId) -> Option<Raw> {
        self.entries.get(&id).and_then(|entry| entry.raw.upgrade())
    }

    fn sweep(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.raw.is_alive());
        let swept = before - self.entries.len();

        if self.entries.len() * 2 >= self.sweep_at {
            self.sweep_at *= 2;
        }
        trace!(swept, live = self.entries.len(), next = self.sweep_at, "registry swept");
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_raw_same_dep() {
        let mut registry = WrapperRegistry::new(16);
        let raw = Raw::array([1, 2, 3]);
        let a = registry.dep_for(&raw);
        let b = registry.dep_for(&raw.clone());
        assert!(a.ptr_eq(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_does_not_keep_raw_alive() {
        let mut registry = WrapperRegistry::new(16);
        let raw = Raw::array([1]);
        let id = raw.id();
        registry.dep_for(&raw);
        drop(raw);

        assert!(registry.get(id).is_none());
        assert!(registry.raw(id).is_none());
    }

    #[test]
    fn dead_entries_are_swept() {
        let mut registry = WrapperRegistry::new(4);
        for _ in 0..4 {
            let raw = Raw::array([0]);
            registry.dep_for(&raw);
        }
        assert_eq!(registry.len(), 4);

        let keep = Raw::array([0]);
        registry.dep_for(&keep);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(keep.id()).is_some());
    }
}
