//! Task Queues and the Settled Signal
//!
//! A flush is never run at the point a mutation happens; the runtime asks
//! its [`TaskQueue`] to run it once the current synchronous section yields.
//! This is the only asynchronous boundary of the reactive core, and
//! [`NextTick`] is the only way to observe it.
//!
//! Three queues are provided:
//!
//! - [`MicrotaskQueue`] holds tasks until the host drains it, either by
//!   awaiting [`NextTick`] or by calling `Runtime::run_microtasks`.
//! - [`ImmediateQueue`] runs tasks as soon as they are queued. The runtime
//!   only requests a flush outside batches and subscriber runs, so this is a
//!   fully synchronous mode for tests.
//! - [`LocalTaskQueue`] spawns each task on the current tokio `LocalSet`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Weak;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::SchedulerError;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Where the runtime sends its flush requests.
pub trait TaskQueue {
    /// Arrange for `task` to run once the current synchronous section ends.
    fn queue(&self, task: Task);

    /// Run queued tasks inline, for queues drained by their owner.
    ///
    /// Called whenever [`NextTick`] is polled.
    fn drain(&self) {}
}

/// Holds tasks until drained.
#[derive(Default)]
pub struct MicrotaskQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl TaskQueue for MicrotaskQueue {
    fn queue(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn drain(&self) {
        // Tasks may queue further tasks, so never hold the borrow while running one.
        loop {
            let next = self.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

/// Runs every task immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateQueue;

impl TaskQueue for ImmediateQueue {
    fn queue(&self, task: Task) {
        task();
    }
}

/// Spawns every task on the current tokio `LocalSet`.
///
/// Must be used from within `LocalSet::run_until` (or a task spawned on a
/// `LocalSet`); tokio panics otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTaskQueue;

impl TaskQueue for LocalTaskQueue {
    fn queue(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }
}

/// Resolves once the pending flush has settled.
///
/// Returned by `Runtime::next_tick`. Rejects with
/// [`SchedulerError::CircularDependency`] if that flush was aborted.
#[must_use = "futures do nothing unless awaited"]
pub struct NextTick {
    state: TickState,
}

enum TickState {
    Ready(Option<Result<(), SchedulerError>>),
    Waiting {
        queue: Weak<dyn TaskQueue>,
        rx: oneshot::Receiver<Result<(), SchedulerError>>,
    },
}

impl NextTick {
    pub(crate) fn ready() -> Self {
        Self {
            state: TickState::Ready(Some(Ok(()))),
        }
    }

    pub(crate) fn waiting(
        queue: Weak<dyn TaskQueue>,
        rx: oneshot::Receiver<Result<(), SchedulerError>>,
    ) -> Self {
        Self {
            state: TickState::Waiting { queue, rx },
        }
    }
}

impl Future for NextTick {
    type Output = Result<(), SchedulerError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            TickState::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
            TickState::Waiting { queue, rx } => {
                if let Some(queue) = queue.upgrade() {
                    queue.drain();
                }
                match Pin::new(rx).poll(cx) {
                    Poll::Ready(Ok(result)) => Poll::Ready(result),
                    Poll::Ready(Err(_)) => Poll::Ready(Err(SchedulerError::RuntimeDropped)),
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn microtasks_wait_for_drain() {
        let queue = MicrotaskQueue::new();
        let ran = Rc::new(Cell::new(0));

        let r = Rc::clone(&ran);
        queue.queue(Box::new(move || r.set(r.get() + 1)));
        assert_eq!(ran.get(), 0);
        assert_eq!(queue.len(), 1);

        queue.drain();
        assert_eq!(ran.get(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_runs_tasks_queued_by_tasks() {
        let queue = Rc::new(MicrotaskQueue::new());
        let ran = Rc::new(Cell::new(0));

        let (q, r) = (Rc::clone(&queue), Rc::clone(&ran));
        queue.queue(Box::new(move || {
            r.set(r.get() + 1);
            let r = Rc::clone(&r);
            q.queue(Box::new(move || r.set(r.get() + 1)));
        }));

        queue.drain();
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn immediate_queue_runs_inline() {
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);
        ImmediateQueue.queue(Box::new(move || r.set(true)));
        assert!(ran.get());
    }

    #[tokio::test]
    async fn ready_tick_resolves() {
        assert_eq!(NextTick::ready().await, Ok(()));
    }

    #[tokio::test]
    async fn dropped_sender_rejects() {
        let queue: Rc<dyn TaskQueue> = Rc::new(MicrotaskQueue::new());
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let tick = NextTick::waiting(Rc::downgrade(&queue), rx);
        assert_eq!(tick.await, Err(SchedulerError::RuntimeDropped));
    }

    #[tokio::test]
    async fn local_queue_runs_on_local_set() {
        let local = tokio::task::LocalSet::new();
        let ran = local
            .run_until(async {
                let (tx, rx) = oneshot::channel();
                LocalTaskQueue.queue(Box::new(move || {
                    let _ = tx.send(true);
                }));
                rx.await
            })
            .await;
        assert_eq!(ran, Ok(true));
    }
}
