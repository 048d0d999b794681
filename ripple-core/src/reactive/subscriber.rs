//! Subscriber types for the reactive system.
//!
//! A Subscriber represents any computation that depends on reactive values:
//! plain effects, computeds and watchers all share this record.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::graph::{Dep, TrackKey};

/// Unique identifier for a subscriber.
///
/// Each subscriber (effect, computed or watcher) gets a unique ID when
/// created. This ID is what dependency records store, so a disposed
/// subscriber can never be reached again through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a subscriber does when one of its dependencies triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    /// Queued and re-run by the scheduler.
    Effect,
    /// Invalidated inline; re-evaluated on next read.
    Computed,
    /// Queued; re-evaluates its source and maybe calls back.
    Watcher,
}

impl SubscriberKind {
    /// Lazy subscribers are notified inline instead of being queued.
    pub fn is_lazy(self) -> bool {
        matches!(self, SubscriberKind::Computed)
    }
}

pub(crate) type Job = Rc<dyn Fn() -> anyhow::Result<()>>;
pub(crate) type Cleanup = Box<dyn FnOnce()>;

/// A subscriber to reactive values.
pub(crate) struct Subscriber {
    id: SubscriberId,
    kind: SubscriberKind,
    name: Option<String>,
    /// Re-run body for queued kinds, invalidation for lazy ones.
    job: Job,
    /// Every `(dep, key)` pair read during the latest run.
    deps: RefCell<SmallVec<[(Dep, TrackKey); 8]>>,
    active: Cell<bool>,
    cleanups: RefCell<Vec<Cleanup>>,
    runs: Cell<usize>,
}

impl Subscriber {
    pub(crate) fn new(kind: SubscriberKind, name: Option<String>, job: Job) -> Rc<Self> {
        Rc::new(Self {
            id: SubscriberId::new(),
            kind,
            name,
            job,
            deps: RefCell::new(SmallVec::new()),
            active: Cell::new(true),
            cleanups: RefCell::new(Vec::new()),
            runs: Cell::new(0),
        })
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn kind(&self) -> SubscriberKind {
        self.kind
    }

    /// A human-readable label for diagnostics.
    pub(crate) fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{:?}", self.kind).to_lowercase(),
        }
    }

    pub(crate) fn job(&self) -> Job {
        Rc::clone(&self.job)
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    pub(crate) fn deactivate(&self) {
        self.active.set(false);
    }

    pub(crate) fn record_dep(&self, dep: Dep, key: TrackKey) {
        self.deps.borrow_mut().push((dep, key));
    }

    /// Unsubscribe from every dependency read so far.
    pub(crate) fn clear_deps(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for (dep, key) in deps {
            dep.unsubscribe(&key, self.id);
        }
    }

    pub(crate) fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    pub(crate) fn push_cleanup(&self, cleanup: Cleanup) {
        self.cleanups.borrow_mut().push(cleanup);
    }

    /// Take the registered cleanups, in registration order.
    pub(crate) fn take_cleanups(&self) -> Vec<Cleanup> {
        std::mem::take(&mut *self.cleanups.borrow_mut())
    }

    pub(crate) fn record_run(&self) {
        self.runs.set(self.runs.get() + 1);
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.get()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("active", &self.is_active())
            .field("deps", &self.dep_count())
            .field("runs", &self.run_count())
            .finish()
    }
}
