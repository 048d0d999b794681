//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (unless created lazily).
//!
//! 2. When any dependency triggers, the effect is queued on the runtime's
//!    scheduler and re-runs on the next flush.
//!
//! 3. Before re-running, the effect runs its cleanups and clears its old
//!    dependencies, then tracks new ones during execution.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager.
//! - Computeds are invalidated inline; effects wait for the flush.
//!
//! # Cleanup
//!
//! An effect registers cleanups with [`Runtime::on_cleanup`] while it runs.
//! They are called before the effect re-runs and when it is disposed.

use std::fmt;
use std::rc::Rc;

use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{Job, Subscriber, SubscriberId, SubscriberKind};

/// What an effect body may return.
///
/// Implemented for `()` and for any `Result<(), E>` whose error converts
/// into `anyhow::Error`. An `Err` is reported to the runtime's error handler.
pub trait EffectOutput {
    fn into_result(self) -> anyhow::Result<()>;
}

impl EffectOutput for () {
    fn into_result(self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<E> EffectOutput for Result<(), E>
where
    E: Into<anyhow::Error>,
{
    fn into_result(self) -> anyhow::Result<()> {
        self.map_err(Into::into)
    }
}

/// Options for [`Runtime::create_effect`].
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Name used in logs and error reports.
    pub name: Option<String>,
    /// Skip the initial run. The effect tracks nothing until it is executed.
    pub lazy: bool,
}

impl EffectOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::{EffectOptions, ImmediateQueue, Raw, Runtime, RuntimeConfig};
///
/// let rt = Runtime::with_config(RuntimeConfig::default(), ImmediateQueue);
/// let state = rt.wrap(&Raw::object([("count", 0)]));
/// let obj = state.as_object().unwrap().clone();
///
/// let reader = obj.clone();
/// let effect = rt.create_effect(
///     move || println!("count is {:?}", reader.get("count")),
///     EffectOptions::default(),
/// );
///
/// obj.set("count", 5); // prints "count is 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
///
/// Cloning an `Effect` clones the handle. Dropping every handle does not
/// stop the effect; call [`Effect::dispose`].
#[derive(Clone)]
pub struct Effect {
    sub: Rc<Subscriber>,
    rt: WeakRuntime,
}

impl Effect {
    /// Get the effect's subscriber ID.
    pub fn id(&self) -> SubscriberId {
        self.sub.id()
    }

    /// Run the effect now, outside the scheduler.
    ///
    /// Does nothing once disposed.
    pub fn execute(&self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.run_subscriber(&self.sub);
        }
    }

    /// Queue the effect for the next flush.
    pub fn schedule(&self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.schedule(&self.sub);
        }
    }

    /// Dispose of the effect.
    ///
    /// After disposal the effect never runs again. Disposing from inside the
    /// effect's own body takes effect immediately.
    pub fn dispose(&self) {
        match self.rt.upgrade() {
            Some(rt) => rt.dispose(&self.sub),
            None => self.sub.deactivate(),
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        !self.sub.is_active()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.sub.run_count()
    }

    /// Get the number of `(dep, key)` pairs read by the latest run.
    pub fn dependency_count(&self) -> usize {
        self.sub.dep_count()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Runtime {
    /// Create an effect.
    ///
    /// Unless `options.lazy` is set, `f` runs once synchronously to
    /// establish its dependencies.
    pub fn create_effect<F, O>(&self, f: F, options: EffectOptions) -> Effect
    where
        F: Fn() -> O + 'static,
        O: EffectOutput,
    {
        let job: Job = Rc::new(move || f().into_result());
        let sub = self.inner().register(SubscriberKind::Effect, options.name, job);
        let effect = Effect {
            sub,
            rt: self.downgrade(),
        };
        if !options.lazy {
            effect.execute();
        }
        effect
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::graph::{ImmediateQueue, TrackKey};
    use std::cell::{Cell, RefCell};

    fn immediate() -> Runtime {
        Runtime::with_config(RuntimeConfig::default(), ImmediateQueue)
    }

    #[test]
    fn effect_runs_on_creation() {
        let rt = immediate();
        let run_count = Rc::new(Cell::new(0));
        let r = Rc::clone(&run_count);

        let _effect = rt.create_effect(move || r.set(r.get() + 1), EffectOptions::default());

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let rt = immediate();
        let run_count = Rc::new(Cell::new(0));
        let r = Rc::clone(&run_count);

        let effect = rt.create_effect(
            move || r.set(r.get() + 1),
            EffectOptions::named("lazy").lazy(),
        );
        assert_eq!(run_count.get(), 0);
        assert_eq!(effect.run_count(), 0);

        effect.execute();
        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_a_dependency_triggers() {
        let rt = immediate();
        let dep = rt.dep();
        let (d, handle) = (dep.clone(), rt.clone());

        let effect = rt.create_effect(
            move || handle.track(&d, TrackKey::Iterate),
            EffectOptions::default(),
        );
        assert_eq!(effect.dependency_count(), 1);

        rt.trigger(&dep, TrackKey::Iterate);
        assert_eq!(effect.run_count(), 2);

        // Untracked keys do nothing.
        rt.trigger(&dep, TrackKey::Length);
        assert_eq!(effect.run_count(), 2);
        effect.dispose();
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let rt = immediate();
        let dep = rt.dep();
        let (d, handle) = (dep.clone(), rt.clone());

        let effect = rt.create_effect(
            move || handle.track(&d, TrackKey::Shape),
            EffectOptions::default(),
        );
        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(dep.tracked_key_count(), 0);

        rt.trigger(&dep, TrackKey::Shape);
        effect.schedule();
        effect.execute();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn cleanups_run_before_rerun_and_on_dispose() {
        let rt = immediate();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l, handle) = (Rc::clone(&log), rt.clone());

        let effect = rt.create_effect(
            move || {
                let l = Rc::clone(&l);
                l.borrow_mut().push("run");
                handle.on_cleanup(move || l.borrow_mut().push("cleanup"));
            },
            EffectOptions::default(),
        );
        effect.execute();
        effect.dispose();

        assert_eq!(*log.borrow(), ["run", "cleanup", "run", "cleanup"]);
    }

    #[test]
    fn self_disposal_takes_effect_immediately() {
        let rt = immediate();
        let dep = rt.dep();
        let slot: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
        let (d, handle, s) = (dep.clone(), rt.clone(), Rc::clone(&slot));

        let effect = rt.create_effect(
            move || {
                handle.track(&d, TrackKey::Length);
                if let Some(me) = s.borrow().as_ref() {
                    me.dispose();
                }
            },
            EffectOptions::default(),
        );
        *slot.borrow_mut() = Some(effect.clone());

        rt.trigger(&dep, TrackKey::Length);
        assert!(effect.is_disposed());
        rt.trigger(&dep, TrackKey::Length);
        assert_eq!(effect.run_count(), 2);
        slot.borrow_mut().take();
    }

    #[test]
    fn failing_effect_does_not_stop_the_flush() {
        let rt = immediate();
        let dep = rt.dep();
        let errors = Rc::new(Cell::new(0));
        let e = Rc::clone(&errors);
        rt.set_error_handler(move |_| e.set(e.get() + 1));

        let (d1, h1) = (dep.clone(), rt.clone());
        let failing = rt.create_effect(
            move || -> anyhow::Result<()> {
                h1.track(&d1, TrackKey::Iterate);
                anyhow::bail!("nope")
            },
            EffectOptions::named("failing"),
        );
        let (d2, h2) = (dep.clone(), rt.clone());
        let healthy = rt.create_effect(
            move || h2.track(&d2, TrackKey::Iterate),
            EffectOptions::default(),
        );

        rt.trigger(&dep, TrackKey::Iterate);
        assert_eq!(errors.get(), 2);
        assert_eq!(failing.run_count(), 2);
        assert_eq!(healthy.run_count(), 2);
    }

    #[test]
    fn panicking_effect_is_reported() {
        let rt = immediate();
        let messages = Rc::new(RefCell::new(Vec::new()));
        let m = Rc::clone(&messages);
        rt.set_error_handler(move |err| m.borrow_mut().push(err.to_string()));

        let effect = rt.create_effect::<_, ()>(|| panic!("kaboom"), EffectOptions::named("boom"));
        assert_eq!(effect.run_count(), 1);
        assert!(messages.borrow()[0].contains("kaboom"));
    }

    #[test]
    fn effect_clone_shares_state() {
        let rt = immediate();
        let effect1 = rt.create_effect(|| {}, EffectOptions::default());
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());
        effect1.execute();
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
