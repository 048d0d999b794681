//! Reactive Primitives
//!
//! This module contains the runtime and the computations it drives:
//!
//! - [`Runtime`]: owns the wrapper registry, the tracking context and the
//!   scheduler of one application instance.
//! - [`Effect`]: side effects that re-run when their dependencies change.
//! - [`Computed`]: cached derived values, recomputed lazily.
//! - Watchers ([`Runtime::watch`]): callbacks fired when a getter's result
//!   changes, optionally compared deeply.
//!
//! # How Reactivity Works
//!
//! When a subscriber (effect, computed or watcher) runs, it executes inside
//! a tracking context. Reads made through wrapped values record the
//! subscriber against the key they read. When a write triggers that key, the
//! subscriber is invalidated (computeds) or queued for the next flush
//! (effects and watchers).
//!
//! ```text
//! wrapped value (count) ──────┐
//!                             ├──> computed (doubled) ───> effect (render)
//! wrapped value (multiplier) ─┘
//! ```
//!
//! When `count` changes:
//! 1. `doubled` is marked dirty during the trigger
//! 2. `render` is queued because it read `doubled`
//! 3. The flush re-runs `render`, which re-evaluates `doubled`

mod computed;
mod context;
mod effect;
mod registry;
mod runtime;
mod subscriber;
mod watch;

pub use computed::{Computed, ComputedState};
pub use effect::{Effect, EffectOptions, EffectOutput};
pub use runtime::Runtime;
pub use subscriber::{SubscriberId, SubscriberKind};
pub use watch::{WatchHandle, WatchOptions};

pub(crate) use runtime::{BatchGuard, RuntimeInner, WeakRuntime};
