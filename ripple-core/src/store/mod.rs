//! Wrapped Values
//!
//! A wrapped value is a read/write-intercepted view over a raw container.
//! Reads record the running subscriber against the key they read, writes
//! trigger the keys whose observable value changed.
//!
//! The container kind is classified once, when the value is wrapped, into
//! one of the variants of [`Reactive`]. Each variant carries its own set of
//! operations with the tracking rules of that kind:
//!
//! | Kind   | Reads track                         | Writes trigger                       |
//! |--------|-------------------------------------|--------------------------------------|
//! | Object | `Prop(k)`, `Iterate` for enumeration | `Prop(k)`, `Iterate` on add/delete   |
//! | Array  | `Index(i)`, `Length`, `Iterate`      | changed indices, `Length`, `Iterate` |
//! | Map    | `Entry(k)`, `Shape`, `Iterate`       | `Entry(k)`, `Shape`, `Iterate`       |
//! | Set    | `Entry(v)`, `Shape`, `Iterate`       | `Entry(v)`, `Shape`, `Iterate`       |
//!
//! Every effective mutation also bumps the version of the container's
//! [`Dep`] exactly once. Writes that change nothing trigger nothing.
//!
//! Nested containers are returned raw. Use `child(..)` to get a tracked view
//! of a nested container; wrapping is never eager.

mod array;
mod collection;
mod object;

use std::fmt;

use crate::graph::{Dep, TrackKey};
use crate::reactive::{BatchGuard, WeakRuntime};
use crate::value::{Raw, RawKind, Value};

pub use array::{ReactiveArray, MAX_LENGTH};
pub use collection::{ReactiveMap, ReactiveSet};
pub use object::ReactiveObject;

/// What every wrapper holds: the raw container, its dep and the runtime.
#[derive(Clone)]
pub(crate) struct Handle {
    raw: Raw,
    dep: Dep,
    rt: WeakRuntime,
}

impl Handle {
    fn track(&self, key: TrackKey) {
        if let Some(rt) = self.rt.upgrade() {
            rt.track(&self.dep, key);
        }
    }

    fn track_all(&self, keys: impl IntoIterator<Item = TrackKey>) {
        if let Some(rt) = self.rt.upgrade() {
            for key in keys {
                rt.track(&self.dep, key);
            }
        }
    }

    /// Record one effective mutation: bump the version once, then trigger
    /// `keys`, all inside one batch.
    fn mutated(&self, keys: impl IntoIterator<Item = TrackKey>) {
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        let _batch = BatchGuard::new(&rt);
        rt.bump_version(&self.dep);
        for key in keys {
            rt.trigger(&self.dep, key);
        }
    }

    /// A tracked view of `value` if it is a container.
    fn wrap(&self, value: &Value) -> Option<Reactive> {
        let raw = value.as_raw()?;
        match self.rt.upgrade() {
            Some(rt) => Some(Reactive::new(raw.clone(), rt.dep_for(raw), self.rt.clone())),
            // Without a runtime nothing is tracked, so any dep will do.
            None => Some(Reactive::new(raw.clone(), Dep::new(Some(raw.id())), self.rt.clone())),
        }
    }
}

/// A wrapped container, classified by kind.
#[derive(Clone)]
pub enum Reactive {
    Object(ReactiveObject),
    Array(ReactiveArray),
    Map(ReactiveMap),
    Set(ReactiveSet),
}

impl Reactive {
    pub(crate) fn new(raw: Raw, dep: Dep, rt: WeakRuntime) -> Self {
        let kind = raw.kind();
        let handle = Handle { raw, dep, rt };
        match kind {
            RawKind::Object => Reactive::Object(ReactiveObject::new(handle)),
            RawKind::Array => Reactive::Array(ReactiveArray::new(handle)),
            RawKind::Map => Reactive::Map(ReactiveMap::new(handle)),
            RawKind::Set => Reactive::Set(ReactiveSet::new(handle)),
        }
    }

    fn handle(&self) -> &Handle {
        match self {
            Reactive::Object(w) => w.handle(),
            Reactive::Array(w) => w.handle(),
            Reactive::Map(w) => w.handle(),
            Reactive::Set(w) => w.handle(),
        }
    }

    /// The raw container, untracked.
    pub fn to_raw(&self) -> Raw {
        self.handle().raw.clone()
    }

    /// The dependency record shared by every view of this container.
    pub fn dep(&self) -> &Dep {
        &self.handle().dep
    }

    pub fn version(&self) -> u64 {
        self.dep().version()
    }

    pub fn kind(&self) -> RawKind {
        self.handle().raw.kind()
    }

    /// Whether both views share the same dependency record.
    pub fn ptr_eq(&self, other: &Reactive) -> bool {
        self.dep().ptr_eq(other.dep())
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Reactive::Object(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveArray> {
        match self {
            Reactive::Array(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ReactiveMap> {
        match self {
            Reactive::Map(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&ReactiveSet> {
        match self {
            Reactive::Set(w) => Some(w),
            _ => None,
        }
    }
}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        Value::Object(reactive.to_raw())
    }
}

impl From<&Reactive> for Value {
    fn from(reactive: &Reactive) -> Self {
        Value::Object(reactive.to_raw())
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("raw", &self.handle().raw)
            .field("version", &self.version())
            .finish()
    }
}

/// JS relative index: negative values count from the end. Clamped to
/// `0..=len`.
fn relative_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    #[test]
    fn wrapping_is_idempotent() {
        let rt = Runtime::new();
        let raw = Raw::array([1, 2]);
        let a = rt.wrap(&raw);
        let b = rt.wrap(&raw);
        assert!(a.ptr_eq(&b));
        assert!(a.to_raw().ptr_eq(&raw));
        assert_eq!(a.kind(), RawKind::Array);
        assert!(a.as_array().is_some() && a.as_map().is_none());
    }

    #[test]
    fn unwrap_gives_back_the_raw_value() {
        let rt = Runtime::new();
        let raw = Raw::set(["a"]);
        let value = Value::from(rt.wrap(&raw));
        assert!(value.same_identity(&Value::from(raw)));
    }

    #[test]
    fn relative_indices_follow_js() {
        assert_eq!(relative_index(-1, 5), 4);
        assert_eq!(relative_index(-9, 5), 0);
        assert_eq!(relative_index(2, 5), 2);
        assert_eq!(relative_index(9, 5), 5);
    }

    #[test]
    fn wrappers_outlive_their_runtime() {
        let rt = Runtime::new();
        let raw = Raw::object([("a", 1)]);
        let obj = rt.wrap(&raw).as_object().cloned().unwrap();
        drop(rt);

        obj.set("a", 2);
        assert_eq!(obj.get("a"), Value::from(2));
        assert_eq!(raw.get_prop("a"), Some(Value::from(2)));
    }
}
