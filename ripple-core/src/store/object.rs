//! Plain-object wrapper.

use std::rc::Rc;

use super::{Handle, Reactive};
use crate::graph::{Dep, TrackKey};
use crate::value::{ObjectMap, Raw, RawBody, Value};

/// A tracked view over a plain object.
#[derive(Clone)]
pub struct ReactiveObject {
    handle: Handle,
}

impl ReactiveObject {
    pub(super) fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub(super) fn handle(&self) -> &Handle {
        &self.handle
    }

    fn props(&self) -> &std::cell::RefCell<ObjectMap> {
        match self.handle.raw.body() {
            RawBody::Object(props) => props,
            _ => unreachable!("object wrapper over a {:?}", self.handle.raw.kind()),
        }
    }

    pub fn to_raw(&self) -> Raw {
        self.handle.raw.clone()
    }

    pub fn dep(&self) -> &Dep {
        &self.handle.dep
    }

    /// Read a property. Missing properties read as `undefined`.
    pub fn get(&self, key: &str) -> Value {
        self.handle.track(TrackKey::Prop(key.into()));
        self.props().borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.handle.track(TrackKey::Prop(key.into()));
        self.props().borrow().contains_key(key)
    }

    /// A tracked view of a nested container.
    pub fn child(&self, key: &str) -> Option<Reactive> {
        let value = self.get(key);
        self.handle.wrap(&value)
    }

    /// Write a property. Returns whether anything changed.
    ///
    /// Writing a value that is the same (SameValue) as the current one is a
    /// no-op.
    pub fn set(&self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> bool {
        let (key, value) = (key.into(), value.into());
        let added = {
            let mut props = self.props().borrow_mut();
            match props.get_mut(&key) {
                Some(current) if current.same_value(&value) => return false,
                Some(current) => {
                    *current = value;
                    false
                }
                None => {
                    props.insert(Rc::clone(&key), value);
                    true
                }
            }
        };

        if added {
            self.handle.mutated([TrackKey::Prop(key), TrackKey::Iterate]);
        } else {
            self.handle.mutated([TrackKey::Prop(key)]);
        }
        true
    }

    /// Delete a property. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.props().borrow_mut().shift_remove(key);
        if removed.is_none() {
            return false;
        }
        self.handle.mutated([TrackKey::Prop(key.into()), TrackKey::Iterate]);
        true
    }

    /// Property names, in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.handle.track(TrackKey::Iterate);
        self.props().borrow().keys().cloned().collect()
    }

    /// Property values, in insertion order. Tracks every property read.
    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// `(name, value)` pairs, in insertion order. Tracks every property read.
    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        let entries: Vec<_> = self
            .props()
            .borrow()
            .iter()
            .map(|(k, v)| (Rc::clone(k), v.clone()))
            .collect();
        self.handle.track_all(
            std::iter::once(TrackKey::Iterate)
                .chain(entries.iter().map(|(k, _)| TrackKey::Prop(Rc::clone(k)))),
        );
        entries
    }

    pub fn len(&self) -> usize {
        self.handle.track(TrackKey::Iterate);
        self.props().borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReactiveObject({:?})", self.handle.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::graph::ImmediateQueue;
    use crate::reactive::{EffectOptions, Runtime};
    use std::cell::RefCell;

    fn setup() -> (Runtime, ReactiveObject) {
        let rt = Runtime::with_config(RuntimeConfig::default(), ImmediateQueue);
        let obj = rt
            .wrap(&Raw::object([("a", 1), ("b", 2)]))
            .as_object()
            .cloned()
            .unwrap();
        (rt, obj)
    }

    fn record<T: 'static>(rt: &Runtime, read: impl Fn() -> T + 'static) -> Rc<RefCell<Vec<T>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        rt.create_effect(move || s.borrow_mut().push(read()), EffectOptions::default());
        seen
    }

    #[test]
    fn set_triggers_only_on_change() {
        let (rt, obj) = setup();
        let reader = obj.clone();
        let seen = record(&rt, move || reader.get("a"));

        assert!(!obj.set("a", 1));
        assert!(obj.set("a", 5));
        assert!(obj.set("b", 7));
        assert_eq!(*seen.borrow(), [Value::from(1), Value::from(5)]);
    }

    #[test]
    fn adding_and_deleting_triggers_iteration() {
        let (rt, obj) = setup();
        let reader = obj.clone();
        let seen = record(&rt, move || reader.keys().len());

        obj.set("a", 10);
        obj.set("c", 3);
        assert!(obj.delete("a"));
        assert!(!obj.delete("zzz"));
        assert_eq!(*seen.borrow(), [2, 3, 2]);
    }

    #[test]
    fn entries_track_values() {
        let (rt, obj) = setup();
        let reader = obj.clone();
        let seen = record(&rt, move || reader.values());

        obj.set("b", 20);
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1], [Value::from(1), Value::from(20)]);
    }

    #[test]
    fn has_tracks_missing_keys() {
        let (rt, obj) = setup();
        let reader = obj.clone();
        let seen = record(&rt, move || reader.has("c"));

        obj.set("c", 0);
        assert_eq!(*seen.borrow(), [false, true]);
    }

    #[test]
    fn each_effective_write_bumps_version_once() {
        let (_rt, obj) = setup();
        let before = obj.dep().version();
        obj.set("a", 1);
        obj.set("a", 2);
        obj.delete("b");
        assert_eq!(obj.dep().version(), before + 2);
    }

    #[test]
    fn child_wraps_nested_containers() {
        let rt = Runtime::new();
        let inner = Raw::array([1]);
        let obj = rt
            .wrap(&Raw::object([("list", Value::from(inner.clone())), ("n", Value::from(1))]))
            .as_object()
            .cloned()
            .unwrap();

        assert!(obj.child("n").is_none());
        let child = obj.child("list").unwrap();
        assert!(child.ptr_eq(&rt.wrap(&inner)));
    }
}
