//! Dependency Metadata
//!
//! One [`Dep`] exists per wrapped raw value (plus any standalone deps that
//! collaborators create). It records which subscribers read which keys, a
//! version counter, and the cached clone used by structural-sharing
//! snapshots.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

use crate::reactive::SubscriberId;
use crate::value::{RawId, Value};

/// Unique identifier for a dependency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepId(u64);

impl DepId {
    /// Generate a new unique dep ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DepId {
    fn default() -> Self {
        Self::new()
    }
}

/// A key a subscriber can depend on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackKey {
    /// A plain-object property.
    Prop(Rc<str>),
    /// An array element.
    Index(usize),
    /// An array's length.
    Length,
    /// A map or set key.
    Entry(Value),
    /// The set of keys, as seen by enumeration.
    Iterate,
    /// The member count of a keyed collection.
    Shape,
    /// Any change of the node or of a snapshotted descendant.
    Version,
}

/// The snapshot clone cached on a dep.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotCache {
    pub(crate) version: u64,
    pub(crate) clone: Value,
}

pub(crate) struct DepInner {
    id: DepId,
    raw: Option<RawId>,
    subscribers: RefCell<HashMap<TrackKey, IndexSet<SubscriberId>>>,
    version: Cell<u64>,
    snapshot: RefCell<Option<SnapshotCache>>,
    /// Children recorded by the latest fresh clone of this node.
    snapshot_children: RefCell<IndexSet<RawId>>,
    /// Nodes whose latest fresh clone included this node.
    snapshot_parents: RefCell<Vec<Weak<DepInner>>>,
}

/// Dependency metadata for one reactive node.
///
/// Cloning a `Dep` clones the handle.
#[derive(Clone)]
pub struct Dep(pub(crate) Rc<DepInner>);

impl Dep {
    pub(crate) fn new(raw: Option<RawId>) -> Self {
        Self(Rc::new(DepInner {
            id: DepId::new(),
            raw,
            subscribers: RefCell::new(HashMap::new()),
            version: Cell::new(0),
            snapshot: RefCell::new(None),
            snapshot_children: RefCell::new(IndexSet::new()),
            snapshot_parents: RefCell::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    /// The raw value this dep describes, if any.
    pub fn raw_id(&self) -> Option<RawId> {
        self.0.raw
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.0.version.get()
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Add a subscriber to `key`. Returns `false` if it was already there.
    pub(crate) fn subscribe(&self, key: TrackKey, subscriber: SubscriberId) -> bool {
        self.0
            .subscribers
            .borrow_mut()
            .entry(key)
            .or_default()
            .insert(subscriber)
    }

    /// Remove a subscriber from `key`, dropping the key once nobody reads it.
    pub(crate) fn unsubscribe(&self, key: &TrackKey, subscriber: SubscriberId) {
        let mut subscribers = self.0.subscribers.borrow_mut();
        if let Some(set) = subscribers.get_mut(key) {
            set.shift_remove(&subscriber);
            if set.is_empty() {
                subscribers.remove(key);
            }
        }
    }

    /// A copy of the subscribers of `key`, in subscription order.
    pub(crate) fn subscribers_of(&self, key: &TrackKey) -> SmallVec<[SubscriberId; 8]> {
        self.0
            .subscribers
            .borrow()
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of subscribers on `key`.
    pub fn subscriber_count(&self, key: &TrackKey) -> usize {
        self.0
            .subscribers
            .borrow()
            .get(key)
            .map_or(0, IndexSet::len)
    }

    /// Number of keys that currently have subscribers.
    pub fn tracked_key_count(&self) -> usize {
        self.0.subscribers.borrow().len()
    }

    /// Bump the version of this node and of every ancestor whose latest
    /// snapshot contains it. Returns the bumped deps, this one first.
    pub(crate) fn bump_version(&self) -> Vec<Dep> {
        let mut bumped = IndexMap::new();
        let mut stack = vec![self.clone()];

        while let Some(dep) = stack.pop() {
            if bumped.contains_key(&dep.id()) {
                continue;
            }
            dep.0.version.set(dep.0.version.get() + 1);

            if let Some(raw) = dep.raw_id() {
                let mut parents = dep.0.snapshot_parents.borrow_mut();
                parents.retain(|weak| {
                    weak.upgrade()
                        .map(|parent| parent.snapshot_children.borrow().contains(&raw))
                        .unwrap_or(false)
                });
                stack.extend(parents.iter().filter_map(Weak::upgrade).map(Dep));
            }
            bumped.insert(dep.id(), dep);
        }

        bumped.into_values().collect()
    }

    pub(crate) fn cached_snapshot(&self) -> Option<Value> {
        let cache = self.0.snapshot.borrow();
        cache
            .as_ref()
            .filter(|cache| cache.version == self.version())
            .map(|cache| cache.clone.clone())
    }

    pub(crate) fn store_snapshot(&self, clone: Option<Value>) {
        *self.0.snapshot.borrow_mut() = clone.map(|clone| SnapshotCache {
            version: self.version(),
            clone,
        });
    }

    /// Record the children of a fresh clone and link them back to this node.
    pub(crate) fn set_snapshot_children(&self, children: &[Dep]) {
        *self.0.snapshot_children.borrow_mut() =
            children.iter().filter_map(Dep::raw_id).collect();

        for child in children {
            let mut parents = child.0.snapshot_parents.borrow_mut();
            let linked = parents
                .iter()
                .any(|weak| weak.as_ptr() == Rc::as_ptr(&self.0));
            if !linked {
                parents.push(Rc::downgrade(&self.0));
            }
        }
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("raw", &self.0.raw)
            .field("version", &self.version())
            .field("tracked_keys", &self.tracked_key_count())
            .finish()
    }
}
