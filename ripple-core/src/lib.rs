//! Ripple Core
//!
//! This crate provides the reactive state core of the Ripple UI framework.
//! It implements:
//!
//! - A dynamic data model of plain values and raw containers
//! - Wrapped (tracked) views over objects, arrays, keyed maps and sets
//! - Effects, lazy computeds and shallow or deep watchers
//! - A batching scheduler with circular-dependency detection
//! - Cycle-safe structural-sharing snapshots for deep comparisons
//!
//! Rendering, template compilation and expression evaluation live in other
//! crates; they drive this one through the [`Runtime`].
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `value`: plain data, untracked
//! - `store`: wrapped views that track reads and trigger writes
//! - `reactive`: the runtime, effects, computeds and watchers
//! - `graph`: dependency records, the scheduler and task queues
//! - `snapshot`: structural-sharing deep clones
//! - `config`, `error`: runtime limits and the error taxonomy
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{EffectOptions, ImmediateQueue, Raw, Runtime, RuntimeConfig, Value};
//!
//! let rt = Runtime::with_config(RuntimeConfig::default(), ImmediateQueue);
//! let state = rt.wrap(&Raw::object([("count", 1)]));
//! let count = state.as_object().unwrap().clone();
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = rt.computed(move || c.get("count").as_f64().unwrap_or(0.0) * 2.0);
//!
//! // Create an effect
//! let d = doubled.clone();
//! rt.create_effect(move || println!("doubled: {}", d.get()), EffectOptions::default());
//!
//! // Update the state
//! count.set("count", Value::from(5));
//! // Effect automatically runs, prints: "doubled: 10"
//! assert_eq!(doubled.get(), 10.0);
//! ```
//!
//! # Scheduling
//!
//! Writes never run subscribers directly. They queue work and ask the
//! runtime's [`TaskQueue`] for a flush; `Runtime::next_tick()` resolves
//! once that flush has settled. With the default [`MicrotaskQueue`] the flush
//! runs when `next_tick()` is awaited (or `run_microtasks()` is called);
//! [`ImmediateQueue`] runs it at the end of the outermost synchronous write.

pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod snapshot;
pub mod store;
pub mod value;

pub use config::{RuntimeConfig, SnapshotLimits};
pub use error::{ReactiveError, SchedulerError, TraversalLimit};
pub use graph::{
    Dep, ImmediateQueue, LocalTaskQueue, MicrotaskQueue, NextTick, TaskQueue, TrackKey,
};
pub use reactive::{
    Computed, ComputedState, Effect, EffectOptions, EffectOutput, Runtime, SubscriberId,
    SubscriberKind, WatchHandle, WatchOptions,
};
pub use snapshot::Snapshot;
pub use store::{Reactive, ReactiveArray, ReactiveMap, ReactiveObject, ReactiveSet};
pub use value::{Raw, RawId, RawKind, Value};
