//! Watchers
//!
//! A watcher re-evaluates a getter whenever what the getter read changes,
//! and calls back with the new and old values when the result differs.
//!
//! Shallow watchers compare results with SameValue. Deep watchers take a
//! structural snapshot of the result instead, so they fire on any change
//! below it and hand out snapshot clones rather than live data. Either way
//! the watcher is queued like an effect, so it fires at most once per flush.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::effect::EffectOutput;
use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{Job, Subscriber, SubscriberId, SubscriberKind};
use crate::snapshot::{take_snapshot, Snapshot};
use crate::value::Value;

/// Options for [`Runtime::watch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Compare structural snapshots instead of identities.
    pub deep: bool,
    /// Call back once at creation, with `undefined` as the old value.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn deep() -> Self {
        Self {
            deep: true,
            immediate: false,
        }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

enum Observed {
    Shallow(Value),
    Deep(Snapshot),
}

impl Observed {
    fn value(&self) -> &Value {
        match self {
            Observed::Shallow(value) => value,
            Observed::Deep(snapshot) => snapshot.value(),
        }
    }

    fn differs_from(&self, old: &Observed) -> bool {
        match (self, old) {
            (Observed::Deep(new), Observed::Deep(old)) => new.changed_since(old),
            _ => !self.value().same_value(old.value()),
        }
    }
}

/// Handle of a running watcher.
#[derive(Clone)]
pub struct WatchHandle {
    sub: Rc<Subscriber>,
    rt: WeakRuntime,
}

impl WatchHandle {
    pub fn id(&self) -> SubscriberId {
        self.sub.id()
    }

    /// Stop watching. Calling this from the callback stops the watcher
    /// before it can fire again.
    pub fn unwatch(&self) {
        match self.rt.upgrade() {
            Some(rt) => rt.dispose(&self.sub),
            None => self.sub.deactivate(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.sub.is_active()
    }

    /// Number of times the getter has been evaluated.
    pub fn run_count(&self) -> usize {
        self.sub.run_count()
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Runtime {
    /// Watch the result of `getter`.
    ///
    /// The getter runs once synchronously to establish dependencies. After
    /// that `callback(new, old)` runs untracked whenever a flush finds the
    /// result changed.
    pub fn watch<G, C, O>(&self, getter: G, callback: C, options: WatchOptions) -> WatchHandle
    where
        G: Fn() -> Value + 'static,
        C: Fn(&Value, &Value) -> O + 'static,
        O: EffectOutput,
    {
        let weak = self.downgrade();
        let last: RefCell<Option<Observed>> = RefCell::new(None);

        let job: Job = Rc::new(move || {
            let Some(rt) = weak.upgrade() else {
                return Ok(());
            };

            let value = getter();
            let observed = if options.deep {
                Observed::Deep(take_snapshot(&rt, &value))
            } else {
                Observed::Shallow(value)
            };

            let previous = last.borrow_mut().replace(observed);
            let last = last.borrow();
            let Some(current) = last.as_ref() else {
                return Ok(());
            };

            match previous {
                None if options.immediate => {
                    let current = current.value().clone();
                    drop(last);
                    rt.untracked(|| callback(&current, &Value::Undefined)).into_result()
                }
                Some(old) if current.differs_from(&old) => {
                    let current = current.value().clone();
                    drop(last);
                    rt.untracked(|| callback(&current, old.value())).into_result()
                }
                _ => Ok(()),
            }
        });

        let kind = SubscriberKind::Watcher;
        let name = Some(if options.deep { "deep watcher" } else { "watcher" }.to_string());
        let sub = self.inner().register(kind, name, job);
        self.inner().run_subscriber(&sub);

        WatchHandle {
            sub,
            rt: self.downgrade(),
        }
    }
}
