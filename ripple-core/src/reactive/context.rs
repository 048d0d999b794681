//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a wrapped value is read,
//! the current computation is registered as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. Running a subscriber pushes a
//! tracking frame; `untracked` pushes an opaque frame so reads inside it do
//! not leak into the enclosing subscriber. Frames are popped by a guard, so
//! the stack stays balanced even if the computation panics.

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId};

enum Frame {
    Tracking(Rc<Subscriber>),
    Untracked,
}

/// The per-runtime stack of running computations.
#[derive(Default)]
pub(crate) struct ContextStack {
    frames: RefCell<Vec<Frame>>,
}

impl ContextStack {
    /// The subscriber reads should be attributed to, if any.
    pub(crate) fn current(&self) -> Option<Rc<Subscriber>> {
        match self.frames.borrow().last() {
            Some(Frame::Tracking(sub)) => Some(Rc::clone(sub)),
            _ => None,
        }
    }

    pub(crate) fn current_id(&self) -> Option<SubscriberId> {
        match self.frames.borrow().last() {
            Some(Frame::Tracking(sub)) => Some(sub.id()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Guard that pops its frame when dropped.
pub(crate) struct ReactiveContext<'a> {
    stack: &'a ContextStack,
    subscriber: Option<SubscriberId>,
}

impl<'a> ReactiveContext<'a> {
    /// Enter a tracking context for `subscriber`.
    pub(crate) fn enter(stack: &'a ContextStack, subscriber: Rc<Subscriber>) -> Self {
        let id = subscriber.id();
        stack.frames.borrow_mut().push(Frame::Tracking(subscriber));
        Self {
            stack,
            subscriber: Some(id),
        }
    }

    /// Enter a context in which reads are not tracked.
    pub(crate) fn untracked(stack: &'a ContextStack) -> Self {
        stack.frames.borrow_mut().push(Frame::Untracked);
        Self {
            stack,
            subscriber: None,
        }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let popped = self.stack.frames.borrow_mut().pop();

        // Verify we're popping the right context.
        if let Some(frame) = popped {
            let popped_id = match frame {
                Frame::Tracking(sub) => Some(sub.id()),
                Frame::Untracked => None,
            };
            debug_assert_eq!(
                popped_id, self.subscriber,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber, popped_id
            );
        }
    }
}
