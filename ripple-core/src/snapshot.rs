//! Structural Snapshots
//!
//! A snapshot is a deep clone of everything reachable from a value, used by
//! deep watchers to hand out old and new values and to decide whether
//! anything changed.
//!
//! # Structural Sharing
//!
//! Each dep caches the clone of its node together with the version it was
//! taken at. A node whose version did not move since is not walked again;
//! its cached clone is reused, so an unchanged branch costs one lookup and
//! the old and new snapshots share it by pointer.
//!
//! For this to hold, a mutation deep in the tree must invalidate every
//! cached ancestor. Each fresh clone records its children on the dep, and a
//! version bump climbs those links (see [`Dep`]). The version of the root
//! therefore moves whenever anything the snapshot covers changes, which is
//! all a comparison has to look at, and all a deep watcher has to track.
//!
//! # Cycles and Limits
//!
//! A node reached again while it is still being cloned is replaced by the
//! [`CIRCULAR`] marker; a node reached again after it was cloned reuses
//! that clone, which keeps shared substructure shared. Past the configured
//! depth or node count, subtrees are replaced by [`TRUNCATED`] and a
//! diagnostic is reported. Clones containing a marker are never cached.

use std::collections::HashMap;

use tracing::warn;

use crate::config::SnapshotLimits;
use crate::error::{ReactiveError, TraversalLimit};
use crate::graph::{Dep, TrackKey};
use crate::reactive::{Runtime, RuntimeInner};
use crate::value::{EntryMap, EntrySet, ObjectMap, Raw, RawBody, RawId, Value};

/// Substituted for a reference back to a node that is still being cloned.
pub const CIRCULAR: &str = "[Circular]";

/// Substituted for a subtree past a traversal limit.
pub const TRUNCATED: &str = "[Truncated]";

/// A deep clone plus what it was taken from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    source: Value,
    value: Value,
    /// Identity and version of the root container.
    stamp: Option<(RawId, u64)>,
    cloned: usize,
    complete: bool,
}

impl Snapshot {
    /// The clone. Treat it as immutable: unchanged branches are shared with
    /// later snapshots.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// The value the snapshot was taken of.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Whether no marker was substituted anywhere.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Identity and version of the root container, `None` for primitives.
    pub fn stamp(&self) -> Option<(RawId, u64)> {
        self.stamp
    }

    /// Number of containers this snapshot had to clone afresh.
    pub fn cloned_nodes(&self) -> usize {
        self.cloned
    }

    /// Whether anything observable changed between `old` and this snapshot.
    pub fn changed_since(&self, old: &Snapshot) -> bool {
        !self.source.same_value(&old.source) || self.stamp != old.stamp
    }
}

enum Visit {
    InProgress,
    Done { clone: Value, complete: bool },
}

struct Cloned {
    value: Value,
    complete: bool,
    dep: Option<Dep>,
}

impl Cloned {
    fn leaf(value: Value) -> Self {
        Self {
            value,
            complete: true,
            dep: None,
        }
    }

    fn marker(marker: &str) -> Self {
        Self {
            value: Value::string(marker),
            complete: false,
            dep: None,
        }
    }
}

struct Traversal<'a> {
    rt: &'a RuntimeInner,
    limits: SnapshotLimits,
    visited: HashMap<RawId, Visit>,
    stamp: Option<(RawId, u64)>,
    nodes: usize,
    diagnostics: Vec<ReactiveError>,
}

impl<'a> Traversal<'a> {
    fn new(rt: &'a RuntimeInner) -> Self {
        Self {
            rt,
            limits: rt.config().snapshot,
            visited: HashMap::new(),
            stamp: None,
            nodes: 0,
            diagnostics: Vec::new(),
        }
    }

    fn visit(&mut self, value: &Value, depth: usize) -> Cloned {
        let Value::Object(raw) = value else {
            return Cloned::leaf(value.clone());
        };

        match self.visited.get(&raw.id()) {
            Some(Visit::InProgress) => return Cloned::marker(CIRCULAR),
            Some(Visit::Done { clone, complete }) => {
                return Cloned {
                    value: clone.clone(),
                    complete: *complete,
                    dep: Some(self.rt.dep_for(raw)),
                };
            }
            None => {}
        }

        if depth > self.limits.max_depth {
            return self.truncate(TraversalLimit::Depth(self.limits.max_depth), raw);
        }

        let dep = self.rt.dep_for(raw);
        if depth == 0 {
            self.rt.track(&dep, TrackKey::Version);
            self.stamp = Some((raw.id(), dep.version()));
        }

        if let Some(clone) = dep.cached_snapshot() {
            self.visited.insert(
                raw.id(),
                Visit::Done {
                    clone: clone.clone(),
                    complete: true,
                },
            );
            return Cloned {
                value: clone,
                complete: true,
                dep: Some(dep),
            };
        }

        if self.nodes >= self.limits.max_nodes {
            return self.truncate(TraversalLimit::Nodes(self.limits.max_nodes), raw);
        }
        self.nodes += 1;

        self.visited.insert(raw.id(), Visit::InProgress);
        let (clone, complete, children) = self.clone_body(raw, depth);

        dep.set_snapshot_children(&children);
        dep.store_snapshot(complete.then(|| clone.clone()));
        self.visited.insert(
            raw.id(),
            Visit::Done {
                clone: clone.clone(),
                complete,
            },
        );

        Cloned {
            value: clone,
            complete,
            dep: Some(dep),
        }
    }

    fn clone_body(&mut self, raw: &Raw, depth: usize) -> (Value, bool, Vec<Dep>) {
        let mut complete = true;
        let mut children = Vec::new();
        let mut descend = |this: &mut Self, value: &Value| {
            let cloned = this.visit(value, depth + 1);
            complete &= cloned.complete;
            children.extend(cloned.dep);
            cloned.value
        };

        let clone = match raw.body() {
            RawBody::Object(m) => {
                let entries: Vec<_> = m.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut out = ObjectMap::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k, descend(self, &v));
                }
                Raw::object(out)
            }
            RawBody::Array(items) => {
                let items = items.borrow().clone();
                let out: Vec<Value> = items.iter().map(|v| descend(self, v)).collect();
                Raw::array(out)
            }
            RawBody::Map(m) => {
                // Keys are kept as they are; their identity is what addresses the entry.
                let entries: Vec<_> = m.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                let mut out = EntryMap::with_capacity(entries.len());
                for (k, v) in entries {
                    out.insert(k, descend(self, &v));
                }
                Raw::map(out)
            }
            RawBody::Set(s) => {
                let members: Vec<_> = s.borrow().iter().cloned().collect();
                let mut out = EntrySet::with_capacity(members.len());
                for member in &members {
                    out.insert(descend(self, member));
                }
                Raw::set(out)
            }
        };

        (Value::Object(clone), complete, children)
    }

    fn truncate(&mut self, limit: TraversalLimit, raw: &Raw) -> Cloned {
        let already = self.diagnostics.iter().any(|err| {
            matches!(err, ReactiveError::TraversalLimit { limit: seen, .. }
                if std::mem::discriminant(seen) == std::mem::discriminant(&limit))
        });
        if !already {
            warn!(value = %raw.id(), %limit, "snapshot truncated");
            self.diagnostics.push(ReactiveError::TraversalLimit {
                limit,
                value: raw.id(),
            });
        }
        Cloned::marker(TRUNCATED)
    }
}

/// Snapshot `value` on `rt`, tracking the `Version` key of its root.
pub(crate) fn take_snapshot(rt: &RuntimeInner, value: &Value) -> Snapshot {
    let mut traversal = Traversal::new(rt);
    let cloned = traversal.visit(value, 0);
    let Traversal {
        stamp,
        nodes,
        diagnostics,
        ..
    } = traversal;

    for err in diagnostics {
        rt.report(err);
    }

    Snapshot {
        source: value.clone(),
        value: cloned.value,
        stamp,
        cloned: nodes,
        complete: cloned.complete,
    }
}

impl Runtime {
    /// Take a structural snapshot of `value`.
    ///
    /// Called inside a subscriber, the subscriber becomes a deep dependent
    /// of everything the snapshot covers.
    pub fn snapshot(&self, value: &Value) -> Snapshot {
        take_snapshot(self.inner(), value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::graph::ImmediateQueue;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn runtime(limits: SnapshotLimits) -> Runtime {
        let mut config = RuntimeConfig::default();
        config.snapshot = limits;
        Runtime::with_config(config, ImmediateQueue)
    }

    fn prop(value: &Value, key: &str) -> Value {
        value.as_raw().and_then(|raw| raw.get_prop(key)).unwrap_or_default()
    }

    #[test]
    fn primitives_snapshot_to_themselves() {
        let rt = Runtime::new();
        let snap = rt.snapshot(&Value::from(3));
        assert_eq!(snap.value(), &Value::from(3));
        assert!(snap.stamp().is_none());
        assert!(rt.snapshot(&Value::from(4)).changed_since(&snap));
    }

    #[test]
    fn clones_are_fresh_containers() {
        let rt = Runtime::new();
        let inner = Raw::array([1, 2]);
        let root = Value::from(Raw::object([("list", Value::from(inner.clone()))]));

        let snap = rt.snapshot(&root);
        let list = prop(snap.value(), "list");
        assert!(!list.same_identity(&Value::from(inner)));
        assert_eq!(list.as_raw().map(Raw::len), Some(2));
    }

    #[test]
    fn self_reference_becomes_marker() {
        let rt = Runtime::new();
        let obj = Raw::object([("n", 1)]);
        if let RawBody::Object(m) = obj.body() {
            m.borrow_mut().insert("self".into(), Value::from(obj.clone()));
        }

        let snap = rt.snapshot(&Value::from(obj));
        assert_eq!(prop(snap.value(), "self"), Value::from(CIRCULAR));
        assert_eq!(prop(snap.value(), "n"), Value::from(1));
        assert!(!snap.is_complete());
    }

    #[test]
    fn shared_nodes_stay_shared() {
        let rt = Runtime::new();
        let shared = Raw::object([("x", 1)]);
        let root = Value::from(Raw::array([Value::from(shared.clone()), Value::from(shared)]));

        let snap = rt.snapshot(&root);
        let items = snap.value().as_raw().map(|raw| raw.children()).unwrap_or_default();
        assert!(items[0].same_identity(&items[1]));
        assert!(snap.is_complete());
    }

    #[test]
    fn unchanged_snapshots_reuse_clones() {
        let rt = Runtime::new();
        let root = Value::from(Raw::object([("a", Raw::array([1])), ("b", Raw::array([2]))]));

        let first = rt.snapshot(&root);
        let second = rt.snapshot(&root);
        assert!(first.value().same_identity(second.value()));
        assert!(!second.changed_since(&first));
        assert_eq!(first.cloned_nodes(), 3);
        assert_eq!(second.cloned_nodes(), 0);
    }

    #[test]
    fn mutations_invalidate_ancestors_only() {
        let rt = Runtime::new();
        let (a, b) = (Raw::array([1]), Raw::array([2]));
        let root = Value::from(Raw::object([("a", a.clone()), ("b", b)]));
        let first = rt.snapshot(&root);

        let a = rt.wrap(&a);
        if let Some(arr) = a.as_array() {
            arr.push([Value::from(9)]);
        }

        let second = rt.snapshot(&root);
        assert!(second.changed_since(&first));
        assert_eq!(second.cloned_nodes(), 2);
        assert!(!first.value().same_identity(second.value()));
        assert!(prop(first.value(), "b").same_identity(&prop(second.value(), "b")));
        assert!(!prop(first.value(), "a").same_identity(&prop(second.value(), "a")));
    }

    #[test]
    fn depth_limit_truncates_and_reports() {
        let rt = runtime(SnapshotLimits {
            max_depth: 1,
            max_nodes: 100,
        });
        let reports = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&reports);
        rt.set_error_handler(move |err| r.borrow_mut().push(err.clone()));

        let deep = Raw::object([("c", Raw::array([0]))]);
        let root = Value::from(Raw::object([("b", deep)]));
        let snap = rt.snapshot(&root);

        assert_eq!(prop(&prop(snap.value(), "b"), "c"), Value::from(TRUNCATED));
        assert!(!snap.is_complete());
        assert_eq!(reports.borrow().len(), 1);
        assert!(reports.borrow()[0].is_diagnostic());
    }

    #[test]
    fn node_limit_truncates_once() {
        let rt = runtime(SnapshotLimits {
            max_depth: 10,
            max_nodes: 2,
        });
        let reports = Rc::new(RefCell::new(0));
        let r = Rc::clone(&reports);
        rt.set_error_handler(move |_| *r.borrow_mut() += 1);

        let root = Value::from(Raw::array((0..5).map(|i| Value::from(Raw::array([i])))));
        let snap = rt.snapshot(&root);
        let items = snap.value().as_raw().map(|raw| raw.children()).unwrap_or_default();

        assert!(items[0].as_raw().is_some());
        assert_eq!(items[1], Value::from(TRUNCATED));
        assert_eq!(items[4], Value::from(TRUNCATED));
        assert_eq!(*reports.borrow(), 1);
    }
}
