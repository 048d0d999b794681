//! Keyed map and set wrappers.
//!
//! Keys are addressed by SameValueZero, so a container used as a key is
//! found by identity. `clear()` triggers every key that was present, with
//! no cap on how many.

use std::cell::RefCell;

use super::{Handle, Reactive};
use crate::graph::{Dep, TrackKey};
use crate::value::{EntryMap, EntrySet, Raw, RawBody, Value};

/// A tracked view over a keyed map.
#[derive(Clone)]
pub struct ReactiveMap {
    handle: Handle,
}

/// A tracked view over a set.
#[derive(Clone)]
pub struct ReactiveSet {
    handle: Handle,
}

/// Keys triggered by clearing a collection holding `keys`.
fn clear_keys(keys: impl IntoIterator<Item = Value>) -> Vec<TrackKey> {
    keys.into_iter()
        .map(TrackKey::Entry)
        .chain([TrackKey::Shape, TrackKey::Iterate])
        .collect()
}

impl ReactiveMap {
    pub(super) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub(super) fn handle(&self) -> &Handle {
        &self.handle
    }

    fn entries_cell(&self) -> &RefCell<EntryMap> {
        match self.handle.raw.body() {
            RawBody::Map(entries) => entries,
            _ => unreachable!("map wrapper over a {:?}", self.handle.raw.kind()),
        }
    }

    pub fn to_raw(&self) -> Raw {
        self.handle.raw.clone()
    }

    pub fn dep(&self) -> &Dep {
        &self.handle.dep
    }

    /// Read the value under `key`. Missing keys read as `undefined`.
    pub fn get(&self, key: &Value) -> Value {
        self.handle.track(TrackKey::Entry(key.clone()));
        self.entries_cell().borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn has(&self, key: &Value) -> bool {
        self.handle.track(TrackKey::Entry(key.clone()));
        self.entries_cell().borrow().contains_key(key)
    }

    /// A tracked view of a nested container.
    pub fn child(&self, key: &Value) -> Option<Reactive> {
        let value = self.get(key);
        self.handle.wrap(&value)
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.handle.track(TrackKey::Shape);
        self.entries_cell().borrow().len()
    }

    /// Insert or overwrite. Returns whether anything changed.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let (key, value) = (key.into(), value.into());
        let added = {
            let mut entries = self.entries_cell().borrow_mut();
            match entries.get_mut(&key) {
                Some(current) if current.same_value(&value) => return false,
                Some(current) => {
                    *current = value;
                    false
                }
                None => {
                    entries.insert(key.clone(), value);
                    true
                }
            }
        };

        if added {
            self.handle
                .mutated([TrackKey::Entry(key), TrackKey::Shape, TrackKey::Iterate]);
        } else {
            self.handle.mutated([TrackKey::Entry(key), TrackKey::Iterate]);
        }
        true
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &Value) -> bool {
        let removed = self.entries_cell().borrow_mut().shift_remove(key);
        if removed.is_none() {
            return false;
        }
        self.handle
            .mutated([TrackKey::Entry(key.clone()), TrackKey::Shape, TrackKey::Iterate]);
        true
    }

    /// Remove every entry, notifying readers of each key.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.entries_cell().borrow_mut());
        if old.is_empty() {
            return;
        }
        self.handle.mutated(clear_keys(old.into_keys()));
    }

    pub fn keys(&self) -> Vec<Value> {
        self.handle.track(TrackKey::Iterate);
        self.entries_cell().borrow().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.handle.track(TrackKey::Iterate);
        self.entries_cell().borrow().values().cloned().collect()
    }

    /// `(key, value)` pairs, each a fresh tuple.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.handle.track(TrackKey::Iterate);
        self.entries_cell()
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Entries as two-element arrays, one fresh array per entry.
    pub fn entry_values(&self) -> Vec<Value> {
        self.entries()
            .into_iter()
            .map(|(k, v)| Value::from(Raw::array([k, v])))
            .collect()
    }
}

impl ReactiveSet {
    pub(super) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub(super) fn handle(&self) -> &Handle {
        &self.handle
    }

    fn members(&self) -> &RefCell<EntrySet> {
        match self.handle.raw.body() {
            RawBody::Set(members) => members,
            _ => unreachable!("set wrapper over a {:?}", self.handle.raw.kind()),
        }
    }

    pub fn to_raw(&self) -> Raw {
        self.handle.raw.clone()
    }

    pub fn dep(&self) -> &Dep {
        &self.handle.dep
    }

    pub fn has(&self, value: &Value) -> bool {
        self.handle.track(TrackKey::Entry(value.clone()));
        self.members().borrow().contains(value)
    }

    pub fn size(&self) -> usize {
        self.handle.track(TrackKey::Shape);
        self.members().borrow().len()
    }

    /// Add a member. Returns whether it was new.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if !self.members().borrow_mut().insert(value.clone()) {
            return false;
        }
        self.handle
            .mutated([TrackKey::Entry(value), TrackKey::Shape, TrackKey::Iterate]);
        true
    }

    /// Remove a member. Returns whether it was present.
    pub fn delete(&self, value: &Value) -> bool {
        if !self.members().borrow_mut().shift_remove(value) {
            return false;
        }
        self.handle
            .mutated([TrackKey::Entry(value.clone()), TrackKey::Shape, TrackKey::Iterate]);
        true
    }

    /// Remove every member, notifying readers of each one.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.members().borrow_mut());
        if old.is_empty() {
            return;
        }
        self.handle.mutated(clear_keys(old));
    }

    pub fn values(&self) -> Vec<Value> {
        self.handle.track(TrackKey::Iterate);
        self.members().borrow().iter().cloned().collect()
    }

    /// `(value, value)` pairs, mirroring map entries.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.values().into_iter().map(|v| (v.clone(), v)).collect()
    }
}

impl std::fmt::Debug for ReactiveMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReactiveMap({:?})", self.handle.raw)
    }
}

impl std::fmt::Debug for ReactiveSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReactiveSet({:?})", self.handle.raw)
    }
}
