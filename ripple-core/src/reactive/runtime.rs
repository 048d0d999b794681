//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects wrapped values,
//! effects, computeds and watchers. It owns the wrapper registry, the
//! active-subscriber stack and the scheduler.
//!
//! # How It Works
//!
//! 1. Reading through a wrapper calls [`Runtime::track`], which subscribes
//!    the running subscriber to one key of the wrapper's [`Dep`].
//!
//! 2. Writing through a wrapper calls [`Runtime::trigger`] for every key
//!    whose observable value changed. The runtime then:
//!    a. Invalidates computeds inline (they recompute on next read)
//!    b. Queues effects and watchers
//!    c. Requests a flush from the task queue, unless a batch is open
//!
//! 3. The flush drains the queue, re-running each subscriber with fresh
//!    dependency tracking.
//!
//! # Ownership
//!
//! A runtime is created once per application instance and is `!Send`.
//! Wrappers, effects and computeds only hold a weak reference to it, so the
//! application must keep its [`Runtime`] alive. Subscriber closures that
//! capture a `Runtime` clone keep it alive until they are disposed.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error, trace, warn};

use super::context::{ContextStack, ReactiveContext};
use super::registry::WrapperRegistry;
use super::subscriber::{Job, Subscriber, SubscriberId, SubscriberKind};
use crate::config::RuntimeConfig;
use crate::error::{ReactiveError, SchedulerError};
use crate::graph::{Dep, FlushDemand, MicrotaskQueue, NextTick, Scheduler, Step, TaskQueue, TrackKey};
use crate::store::Reactive;
use crate::value::{Raw, RawId, Value};

type ErrorHandler = Rc<dyn Fn(&ReactiveError)>;

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    context: ContextStack,
    registry: RefCell<WrapperRegistry>,
    subscribers: RefCell<HashMap<SubscriberId, Rc<Subscriber>>>,
    scheduler: RefCell<Scheduler>,
    queue: Rc<dyn TaskQueue>,
    error_handler: RefCell<ErrorHandler>,
    weak_self: Weak<RuntimeInner>,
}

/// The reactive runtime of one application instance.
///
/// Cloning a `Runtime` clones the handle.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// A non-owning runtime handle, held by wrappers and reactive primitives.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Rc<RuntimeInner>> {
        self.0.upgrade()
    }
}

/// Opens a batch for its lifetime; the outermost guard requests a flush.
pub(crate) struct BatchGuard<'a> {
    rt: &'a RuntimeInner,
}

impl<'a> BatchGuard<'a> {
    pub(crate) fn new(rt: &'a RuntimeInner) -> Self {
        rt.scheduler.borrow_mut().begin_batch();
        Self { rt }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let outermost = self.rt.scheduler.borrow_mut().end_batch();
        if outermost {
            self.rt.request_flush();
        }
    }
}

fn default_error_handler(err: &ReactiveError) {
    if err.is_diagnostic() {
        warn!(error = %err, "reactive diagnostic");
    } else {
        error!(error = %err, "reactive error");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Runtime {
    /// Create a runtime with the default configuration and a
    /// [`MicrotaskQueue`].
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default(), MicrotaskQueue::new())
    }

    /// Create a runtime with an explicit configuration and task queue.
    pub fn with_config(config: RuntimeConfig, queue: impl TaskQueue + 'static) -> Self {
        let registry = WrapperRegistry::new(config.registry_sweep_threshold);
        let inner = Rc::new_cyclic(|weak_self| RuntimeInner {
            config,
            context: ContextStack::default(),
            registry: RefCell::new(registry),
            subscribers: RefCell::new(HashMap::new()),
            scheduler: RefCell::new(Scheduler::new()),
            queue: Rc::new(queue),
            error_handler: RefCell::new(Rc::new(default_error_handler)),
            weak_self: weak_self.clone(),
        });
        debug!("reactive runtime created");
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    // ------------------------------------------------------------------
    // Wrapping
    // ------------------------------------------------------------------

    /// Wrap a raw container.
    ///
    /// Wrapping the same container twice yields views over the same
    /// dependency record.
    pub fn wrap(&self, raw: &Raw) -> Reactive {
        let dep = self.inner.dep_for(raw);
        Reactive::new(raw.clone(), dep, self.downgrade())
    }

    /// Wrap a value if it is a container.
    pub fn wrap_value(&self, value: &Value) -> Option<Reactive> {
        value.as_raw().map(|raw| self.wrap(raw))
    }

    /// The dependency record of a raw container, if it has been wrapped.
    pub fn dep_of(&self, raw: &Raw) -> Option<Dep> {
        self.inner.registry.borrow().get(raw.id())
    }

    /// The raw container behind `id`, if it has been wrapped and is still
    /// alive.
    pub fn raw(&self, id: RawId) -> Option<Raw> {
        self.inner.registry.borrow().raw(id)
    }

    /// Create a standalone dependency record, for collaborators that take
    /// part in the graph without a raw container.
    pub fn dep(&self) -> Dep {
        Dep::new(None)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Record that the running subscriber depends on `key` of `dep`.
    ///
    /// A no-op outside any subscriber.
    pub fn track(&self, dep: &Dep, key: TrackKey) {
        self.inner.track(dep, key);
    }

    /// Notify every subscriber of `key` of `dep`.
    ///
    /// A no-op when nobody depends on it.
    pub fn trigger(&self, dep: &Dep, key: TrackKey) {
        self.inner.trigger(dep, key);
    }

    /// Run `f` without tracking any reads.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.untracked(f)
    }

    /// The subscriber reads are currently attributed to.
    pub fn current_subscriber(&self) -> Option<SubscriberId> {
        self.inner.context.current_id()
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking(&self) -> bool {
        self.current_subscriber().is_some()
    }

    /// Register a cleanup on the running subscriber.
    ///
    /// Cleanups run before the subscriber's next run and when it is
    /// disposed. Returns `false` (dropping `cleanup`) outside a subscriber.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) -> bool {
        match self.inner.context.current() {
            Some(sub) if sub.is_active() => {
                sub.push_cleanup(Box::new(cleanup));
                true
            }
            _ => {
                debug!("on_cleanup called outside a subscriber");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Run `f` with flushing suspended; the outermost batch requests one
    /// flush at its end.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _batch = BatchGuard::new(&self.inner);
        f()
    }

    /// A future that resolves once all pending work, including work it
    /// cascades into, has been flushed.
    pub fn next_tick(&self) -> NextTick {
        let waiting = {
            let mut scheduler = self.inner.scheduler.borrow_mut();
            if scheduler.is_settled() {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                scheduler.add_waiter(tx);
                Some(rx)
            }
        };

        match waiting {
            None => NextTick::ready(),
            Some(rx) => {
                self.inner.request_flush();
                NextTick::waiting(Rc::downgrade(&self.inner.queue), rx)
            }
        }
    }

    /// Flush pending work now, synchronously.
    pub fn flush_sync(&self) {
        self.inner.flush();
    }

    /// Drain the task queue, running any requested flush.
    pub fn run_microtasks(&self) {
        self.inner.queue.drain();
    }

    /// Number of subscribers waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.scheduler.borrow().pending()
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.scheduler.borrow().is_flushing()
    }

    /// Whether a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.scheduler.borrow().batch_depth() > 0
    }

    /// Whether a subscriber is waiting in the queue.
    pub fn is_queued(&self, id: SubscriberId) -> bool {
        self.inner.scheduler.borrow().is_queued(id)
    }

    /// Number of live (not disposed) subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    /// Number of raw containers known to the wrapper registry.
    pub fn registry_len(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    /// Replace the handler that receives subscriber failures, scheduler
    /// aborts and traversal diagnostics.
    pub fn set_error_handler(&self, handler: impl Fn(&ReactiveError) + 'static) {
        *self.inner.error_handler.borrow_mut() = Rc::new(handler);
    }

    /// Send an error to the handler.
    pub fn report(&self, err: ReactiveError) {
        self.inner.report(err);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("subscribers", &self.subscriber_count())
            .field("pending", &self.pending())
            .field("registry", &self.registry_len())
            .finish()
    }
}

impl RuntimeInner {
    pub(crate) fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) fn dep_for(&self, raw: &Raw) -> Dep {
        self.registry.borrow_mut().dep_for(raw)
    }

    pub(crate) fn track(&self, dep: &Dep, key: TrackKey) {
        let Some(sub) = self.context.current() else {
            return;
        };
        if !sub.is_active() {
            return;
        }
        if dep.subscribe(key.clone(), sub.id()) {
            trace!(subscriber = %sub.id(), dep = dep.id().raw(), ?key, "track");
            sub.record_dep(dep.clone(), key);
        }
    }

    pub(crate) fn trigger(&self, dep: &Dep, key: TrackKey) {
        let subscribers = dep.subscribers_of(&key);
        if subscribers.is_empty() {
            return;
        }
        trace!(dep = dep.id().raw(), ?key, count = subscribers.len(), "trigger");

        // Computeds invalidated here trigger in turn; nothing may flush
        // until every one of them is dirty.
        let _batch = BatchGuard::new(self);
        for id in subscribers {
            self.notify(id);
        }
    }

    /// Bump the version of `dep` and its snapshotted ancestors, triggering
    /// their `Version` key.
    pub(crate) fn bump_version(&self, dep: &Dep) {
        for bumped in dep.bump_version() {
            self.trigger(&bumped, TrackKey::Version);
        }
    }

    fn notify(&self, id: SubscriberId) {
        let sub = self.subscribers.borrow().get(&id).cloned();
        let Some(sub) = sub else {
            return;
        };
        if !sub.is_active() {
            return;
        }

        if sub.kind().is_lazy() {
            if let Err(err) = (sub.job())() {
                self.report_failure(&sub, err);
            }
        } else {
            self.scheduler.borrow_mut().enqueue(id);
        }
    }

    pub(crate) fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::untracked(&self.context);
        f()
    }

    pub(crate) fn register(&self, kind: SubscriberKind, name: Option<String>, job: Job) -> Rc<Subscriber> {
        let sub = Subscriber::new(kind, name, job);
        self.subscribers.borrow_mut().insert(sub.id(), Rc::clone(&sub));
        debug!(subscriber = %sub.id(), kind = ?kind, "subscriber registered");
        sub
    }

    /// Run `f` as `sub`: previous cleanups run, stale dependencies are
    /// dropped, and reads made by `f` are tracked afresh.
    pub(crate) fn run_tracked<R>(&self, sub: &Rc<Subscriber>, f: impl FnOnce() -> R) -> R {
        let _batch = BatchGuard::new(self);
        for cleanup in sub.take_cleanups() {
            cleanup();
        }
        sub.clear_deps();

        let _ctx = ReactiveContext::enter(&self.context, Rc::clone(sub));
        let out = f();
        sub.record_run();
        out
    }

    /// Run a queued subscriber's job, reporting instead of propagating
    /// errors and panics.
    pub(crate) fn run_subscriber(&self, sub: &Rc<Subscriber>) {
        if !sub.is_active() {
            return;
        }
        let job = sub.job();
        let outcome = self.run_tracked(sub, || panic::catch_unwind(AssertUnwindSafe(|| job())));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.report_failure(sub, err),
            Err(payload) => self.report(ReactiveError::Panicked {
                subscriber: sub.id(),
                name: sub.label(),
                message: panic_message(payload),
            }),
        }
    }

    fn report_failure(&self, sub: &Subscriber, err: anyhow::Error) {
        self.report(ReactiveError::Subscriber {
            subscriber: sub.id(),
            name: sub.label(),
            error: Arc::new(err),
        });
    }

    /// Queue a subscriber and request a flush.
    pub(crate) fn schedule(&self, sub: &Subscriber) {
        if !sub.is_active() {
            return;
        }
        self.scheduler.borrow_mut().enqueue(sub.id());
        self.request_flush();
    }

    pub(crate) fn dispose(&self, sub: &Rc<Subscriber>) {
        if !sub.is_active() {
            return;
        }
        sub.deactivate();
        self.subscribers.borrow_mut().remove(&sub.id());
        self.scheduler.borrow_mut().dequeue(sub.id());
        sub.clear_deps();
        for cleanup in sub.take_cleanups() {
            cleanup();
        }
        debug!(subscriber = %sub.id(), runs = sub.run_count(), "subscriber disposed");
    }

    pub(crate) fn request_flush(&self) {
        let demand = self.scheduler.borrow_mut().demand();
        if demand == FlushDemand::Request {
            let weak = self.weak_self.clone();
            self.queue.queue(Box::new(move || {
                if let Some(rt) = weak.upgrade() {
                    rt.flush();
                }
            }));
        }
    }

    pub(crate) fn flush(&self) {
        let started = self.scheduler.borrow_mut().begin_flush();
        if !started {
            return;
        }
        debug!(pending = self.scheduler.borrow().pending(), "flush started");

        let limit = self.config.max_flush_iterations;
        let outcome = loop {
            let step = self.scheduler.borrow_mut().next(limit);
            match step {
                Step::Drained => break Ok(()),
                Step::Overflow { limit } => break Err(SchedulerError::CircularDependency { limit }),
                Step::Run(id) => {
                    let sub = self.subscribers.borrow().get(&id).cloned();
                    if let Some(sub) = sub {
                        self.run_subscriber(&sub);
                    }
                }
            }
        };

        let (waiters, iterations) = {
            let mut scheduler = self.scheduler.borrow_mut();
            let iterations = scheduler.iterations();
            (scheduler.end_flush(), iterations)
        };

        match &outcome {
            Ok(()) => debug!(iterations, "flush finished"),
            Err(err) => {
                error!(iterations, error = %err, "flush aborted");
                self.report(ReactiveError::Scheduler(err.clone()));
            }
        }

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    pub(crate) fn report(&self, err: ReactiveError) {
        let handler = Rc::clone(&self.error_handler.borrow());
        handler(&err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting_effect(rt: &Runtime, dep: &Dep, key: TrackKey) -> (Rc<Cell<usize>>, Rc<Subscriber>) {
        let runs = Rc::new(Cell::new(0));
        let (r, d, k, weak) = (Rc::clone(&runs), dep.clone(), key, rt.downgrade());
        let sub = rt.inner().register(
            SubscriberKind::Effect,
            None,
            Rc::new(move || {
                r.set(r.get() + 1);
                if let Some(rt) = weak.upgrade() {
                    rt.track(&d, k.clone());
                }
                Ok(())
            }),
        );
        rt.inner().run_subscriber(&sub);
        (runs, sub)
    }

    #[test]
    fn track_outside_subscriber_is_noop() {
        let rt = Runtime::new();
        let dep = rt.dep();
        rt.track(&dep, TrackKey::Length);
        assert_eq!(dep.tracked_key_count(), 0);
        rt.trigger(&dep, TrackKey::Length);
        assert_eq!(rt.pending(), 0);
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let rt = Runtime::new();
        let dep = rt.dep();
        let (runs, _sub) = counting_effect(&rt, &dep, TrackKey::Iterate);
        assert_eq!(runs.get(), 1);
        assert_eq!(dep.subscriber_count(&TrackKey::Iterate), 1);

        rt.trigger(&dep, TrackKey::Iterate);
        assert_eq!(rt.pending(), 1);
        rt.run_microtasks();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn runtime_clears_dependencies_on_dispose() {
        let rt = Runtime::new();
        let dep = rt.dep();
        let (runs, sub) = counting_effect(&rt, &dep, TrackKey::Length);

        rt.trigger(&dep, TrackKey::Length);
        rt.inner().dispose(&sub);
        assert_eq!(dep.tracked_key_count(), 0);
        assert_eq!(rt.subscriber_count(), 0);

        rt.flush_sync();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn errors_reach_the_handler() {
        let rt = Runtime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        rt.set_error_handler(move |err| s.borrow_mut().push(err.to_string()));

        let sub = rt.inner().register(
            SubscriberKind::Effect,
            Some("failing".into()),
            Rc::new(|| Err(anyhow::anyhow!("boom"))),
        );
        rt.inner().run_subscriber(&sub);

        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].contains("failing"));
        assert!(seen.borrow()[0].contains("boom"));
    }

    #[test]
    fn batch_guard_defers_flush_request() {
        let rt = Runtime::new();
        let dep = rt.dep();
        let (runs, _sub) = counting_effect(&rt, &dep, TrackKey::Shape);

        rt.batch(|| {
            rt.trigger(&dep, TrackKey::Shape);
            rt.batch(|| rt.trigger(&dep, TrackKey::Shape));
            rt.run_microtasks();
            assert_eq!(runs.get(), 1);
        });
        rt.run_microtasks();
        assert_eq!(runs.get(), 2);
    }
}
