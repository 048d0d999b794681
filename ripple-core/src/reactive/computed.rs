//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at creation. On first access, the computed runs its
//!    function inside its own tracking context and caches the result.
//!
//! 2. When accessed again, if no dependency has triggered, the cached value
//!    is returned.
//!
//! 3. When a dependency triggers, the computed is marked dirty inline, during
//!    the trigger itself, and notifies whoever read it.
//!
//! 4. On next access, a dirty computed re-evaluates.
//!
//! # Why This Matters
//!
//! - A value changes
//! - 10 computeds depend on it
//! - Only the computeds actually read will recompute
//! - Computeds that are never read stay dirty (no wasted work)
//!
//! Readers depend on a computed through its own [`Dep`], on the `Version`
//! key, so effects and other computeds chain through it like through any
//! wrapped value.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::{Runtime, RuntimeInner, WeakRuntime};
use super::subscriber::{Job, Subscriber, SubscriberId, SubscriberKind};
use crate::graph::{Dep, TrackKey};

/// Dirty state for a computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,
    /// A dependency changed, or the computed never ran.
    Dirty,
}

struct ComputedInner<T> {
    sub: Rc<Subscriber>,
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    state: Cell<ComputedState>,
    /// Readers subscribe here.
    dep: Dep,
    rt: WeakRuntime,
}

/// A cached derived value that recomputes only when dependencies change.
///
/// Cloning a `Computed` clones the handle. The computed is disposed when
/// the last handle is dropped.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> ComputedInner<T> {
    /// Called inline when a dependency triggers.
    fn invalidate(&self) {
        if self.state.get() == ComputedState::Dirty {
            return;
        }
        self.state.set(ComputedState::Dirty);
        if let Some(rt) = self.rt.upgrade() {
            rt.trigger(&self.dep, TrackKey::Version);
        }
    }

    fn cached(&self) -> Option<T> {
        if self.state.get() == ComputedState::Clean || !self.sub.is_active() {
            self.value.borrow().clone()
        } else {
            None
        }
    }

    fn evaluate(&self, rt: Option<&RuntimeInner>) -> T {
        let value = match rt {
            Some(rt) if self.sub.is_active() => rt.run_tracked(&self.sub, || (self.compute)()),
            Some(rt) => rt.untracked(|| (self.compute)()),
            None => (self.compute)(),
        };
        *self.value.borrow_mut() = Some(value.clone());
        if self.sub.is_active() {
            self.state.set(ComputedState::Clean);
        }
        value
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.dispose(&self.sub);
        }
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the subscriber ID of this computed.
    pub fn id(&self) -> SubscriberId {
        self.inner.sub.id()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Inside a subscriber, the read is tracked.
    pub fn get(&self) -> T {
        let rt = self.inner.rt.upgrade();
        if let Some(rt) = &rt {
            rt.track(&self.inner.dep, TrackKey::Version);
        }

        match self.inner.cached() {
            Some(value) => value,
            None => self.inner.evaluate(rt.as_deref()),
        }
    }

    /// Stop tracking. `get()` keeps returning the last value.
    pub fn dispose(&self) {
        match self.inner.rt.upgrade() {
            Some(rt) => rt.dispose(&self.inner.sub),
            None => self.inner.sub.deactivate(),
        }
    }

    pub fn is_disposed(&self) -> bool {
        !self.inner.sub.is_active()
    }

    /// Get the current dirty state.
    pub fn state(&self) -> ComputedState {
        self.inner.state.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.state() == ComputedState::Dirty
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Number of evaluations so far.
    pub fn run_count(&self) -> usize {
        self.inner.sub.run_count()
    }

    /// The dependency record readers of this computed subscribe to.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.sub.id())
            .field("state", &self.inner.state.get())
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

impl Runtime {
    /// Create a computed value. `compute` does not run until the first
    /// [`Computed::get`].
    pub fn computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        let rt = self.downgrade();
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let weak = weak.clone();
            let job: Job = Rc::new(move || {
                if let Some(computed) = weak.upgrade() {
                    computed.invalidate();
                }
                Ok(())
            });
            ComputedInner {
                sub: self.inner().register(SubscriberKind::Computed, None, job),
                compute: Box::new(compute),
                value: RefCell::new(None),
                state: Cell::new(ComputedState::Dirty),
                dep: self.dep(),
                rt,
            }
        });
        Computed { inner }
    }
}
