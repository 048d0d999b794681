//! Dependency Graph
//!
//! This module holds the bookkeeping side of the reactive core: the
//! dependency records attached to every reactive node, and the scheduler
//! that decides when dirty subscribers run.
//!
//! # Overview
//!
//! The graph is distributed rather than centralized:
//!
//! - Each [`Dep`] maps the keys of one node to the subscribers that read them.
//! - Each subscriber remembers the `(Dep, key)` pairs it read, so it can
//!   unsubscribe from all of them before re-running.
//!
//! Edges are therefore stored in both directions, which lets triggers find
//! their subscribers and lets re-runs drop stale dependencies without a
//! global scan.

mod dep;
mod queue;
mod scheduler;

pub use dep::{Dep, DepId, TrackKey};
pub use queue::{ImmediateQueue, LocalTaskQueue, MicrotaskQueue, NextTick, Task, TaskQueue};
pub(crate) use scheduler::{FlushDemand, Scheduler, Step};
