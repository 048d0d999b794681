//! Update Scheduler
//!
//! The scheduler holds the pending work of a runtime: which subscribers are
//! dirty, whether a flush is running or requested, the batch depth, and who
//! is waiting for the flush to settle.
//!
//! # Algorithm
//!
//! 1. A trigger enqueues each affected subscriber once. Enqueueing a
//!    subscriber that is already queued keeps its position.
//! 2. Outside a batch, the first enqueue requests a flush from the
//!    runtime's task queue.
//! 3. The flush pops subscribers in enqueue order. Work enqueued while the
//!    flush runs is appended and drained by the same flush, so one logical
//!    update converges before anyone observes it.
//! 4. Every pop counts as one run of that subscriber. A subscriber that is
//!    re-dirtied more often than the ceiling within one flush is amplifying
//!    itself; the flush is aborted as a circular dependency and the queue is
//!    reset. How many distinct subscribers a flush fans out to is not
//!    bounded.
//!
//! The scheduler itself never runs user code; the runtime drives it and
//! releases every borrow before calling into subscribers.

use std::collections::{HashMap, HashSet, VecDeque};

use tokio::sync::oneshot;

use crate::error::SchedulerError;
use crate::reactive::SubscriberId;

pub(crate) type Waiter = oneshot::Sender<Result<(), SchedulerError>>;

/// Pending work of one runtime.
#[derive(Default)]
pub(crate) struct Scheduler {
    queue: VecDeque<SubscriberId>,
    queued: HashSet<SubscriberId>,
    batch_depth: usize,
    flushing: bool,
    flush_requested: bool,
    iterations: usize,
    runs: HashMap<SubscriberId, usize>,
    waiters: Vec<Waiter>,
}

/// What the caller of [`Scheduler::enqueue`] should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushDemand {
    /// Nothing; a flush is running, requested, or a batch is open.
    None,
    /// Ask the task queue for a flush.
    Request,
}

/// Outcome of one step of the flush loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Run(SubscriberId),
    Drained,
    Overflow { limit: usize },
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber to the pending queue.
    pub(crate) fn enqueue(&mut self, id: SubscriberId) {
        if self.queued.insert(id) {
            self.queue.push_back(id);
        }
    }

    /// Drop a subscriber from the pending queue, if it is queued.
    pub(crate) fn dequeue(&mut self, id: SubscriberId) {
        if self.queued.remove(&id) {
            self.queue.retain(|queued| *queued != id);
        }
    }

    pub(crate) fn is_queued(&self, id: SubscriberId) -> bool {
        self.queued.contains(&id)
    }

    pub(crate) fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether a flush should be requested now.
    pub(crate) fn demand(&mut self) -> FlushDemand {
        if self.batch_depth > 0 || self.flushing || self.flush_requested || self.queue.is_empty() {
            return FlushDemand::None;
        }
        self.flush_requested = true;
        FlushDemand::Request
    }

    pub(crate) fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close one batch level. Returns whether the outermost batch ended.
    pub(crate) fn end_batch(&mut self) -> bool {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        self.batch_depth == 0
    }

    pub(crate) fn batch_depth(&self) -> usize {
        self.batch_depth
    }

    /// Start a flush. Returns `false` if one is already running.
    pub(crate) fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        self.flush_requested = false;
        self.iterations = 0;
        self.runs.clear();
        true
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Whether `next_tick()` has anything to wait for.
    pub(crate) fn is_settled(&self) -> bool {
        !self.flushing && !self.flush_requested && self.queue.is_empty()
    }

    /// Pop the next subscriber to run.
    pub(crate) fn next(&mut self, limit: usize) -> Step {
        let Some(id) = self.queue.pop_front() else {
            return Step::Drained;
        };
        self.queued.remove(&id);

        self.iterations += 1;
        let runs = self.runs.entry(id).or_default();
        *runs += 1;
        if *runs > limit {
            self.queue.clear();
            self.queued.clear();
            return Step::Overflow { limit };
        }
        Step::Run(id)
    }

    /// Subscriber runs in the current (or last) flush, all subscribers
    /// together.
    pub(crate) fn iterations(&self) -> usize {
        self.iterations
    }

    /// Finish the flush and hand back everyone waiting on it.
    pub(crate) fn end_flush(&mut self) -> Vec<Waiter> {
        self.flushing = false;
        self.runs.clear();
        std::mem::take(&mut self.waiters)
    }

    pub(crate) fn add_waiter(&mut self, waiter: Waiter) {
        self.waiters.push(waiter);
    }
}
