//! Error Types
//!
//! Nothing in the reactive core propagates as an unhandled error to callers.
//! Failures are either reported to the runtime's error handler (see
//! [`Runtime::set_error_handler`](crate::reactive::Runtime::set_error_handler))
//! or delivered through the [`NextTick`](crate::graph::NextTick) future.

use std::sync::Arc;

use thiserror::Error;

use crate::reactive::SubscriberId;
use crate::value::RawId;

/// Fatal scheduler failures, delivered to everyone awaiting `next_tick()`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// A subscriber kept re-dirtying itself past the per-flush ceiling.
    /// Usually an effect that writes a value it also reads.
    #[error("circular dependency: a subscriber ran more than {limit} times in one flush")]
    CircularDependency { limit: usize },

    /// The runtime was dropped before the awaited flush settled.
    #[error("runtime dropped before the flush settled")]
    RuntimeDropped,
}

/// Everything the reactive core can report.
#[derive(Debug, Clone, Error)]
pub enum ReactiveError {
    /// A subscriber returned an error. The flush continued.
    #[error("subscriber {subscriber} ({name}) failed: {error}")]
    Subscriber {
        subscriber: SubscriberId,
        name: String,
        error: Arc<anyhow::Error>,
    },

    /// A subscriber panicked. The flush continued.
    #[error("subscriber {subscriber} ({name}) panicked: {message}")]
    Panicked {
        subscriber: SubscriberId,
        name: String,
        message: String,
    },

    /// The flush was aborted.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// A snapshot stopped descending into a subtree.
    #[error("snapshot traversal stopped at {value}: {limit}")]
    TraversalLimit { limit: TraversalLimit, value: RawId },

    /// A cyclic graph cannot be converted to JSON.
    #[error("value {id} is part of a cycle")]
    CyclicValue { id: RawId },

    /// A graph nested too deeply to convert to JSON.
    #[error("value {id} is nested deeper than {max_depth} levels")]
    NestingTooDeep { id: RawId, max_depth: usize },
}

impl ReactiveError {
    /// Whether this is a diagnostic rather than a failure.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, ReactiveError::TraversalLimit { .. })
    }
}

/// Which snapshot ceiling was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalLimit {
    Depth(usize),
    Nodes(usize),
}

impl std::fmt::Display for TraversalLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraversalLimit::Depth(max) => write!(f, "maximum depth {max} exceeded"),
            TraversalLimit::Nodes(max) => write!(f, "maximum node count {max} exceeded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_errors_convert() {
        let err: ReactiveError = SchedulerError::CircularDependency { limit: 10 }.into();
        assert_eq!(
            err.to_string(),
            "circular dependency: a subscriber ran more than 10 times in one flush"
        );
        assert!(!err.is_diagnostic());
    }

    #[test]
    fn traversal_limits_are_diagnostics() {
        let raw = crate::value::Raw::array(Vec::<i32>::new());
        let err = ReactiveError::TraversalLimit {
            limit: TraversalLimit::Depth(3),
            value: raw.id(),
        };
        assert!(err.is_diagnostic());
        assert!(err.to_string().contains("maximum depth 3"));
    }
}
