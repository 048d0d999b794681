//! Runtime Configuration
//!
//! All limits of the reactive core live here. The configuration is plain
//! data so hosts can load it from their own settings files.

use serde::{Deserialize, Serialize};

/// Ceilings for one snapshot traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotLimits {
    /// Maximum container nesting depth below the root.
    pub max_depth: usize,
    /// Maximum number of containers cloned in one traversal.
    pub max_nodes: usize,
}

impl Default for SnapshotLimits {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_nodes: 100_000,
        }
    }
}

/// Configuration of a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runs of any one subscriber allowed in one flush before the flush is
    /// treated as a circular dependency.
    pub max_flush_iterations: usize,
    /// Limits for deep-watch snapshots.
    pub snapshot: SnapshotLimits,
    /// Registry size at which entries of dropped raw values are swept.
    pub registry_sweep_threshold: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_iterations: 10_000,
            snapshot: SnapshotLimits::default(),
            registry_sweep_threshold: 1024,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_flush_iterations(mut self, limit: usize) -> Self {
        self.max_flush_iterations = limit;
        self
    }

    pub fn with_snapshot_limits(mut self, max_depth: usize, max_nodes: usize) -> Self {
        self.snapshot = SnapshotLimits {
            max_depth,
            max_nodes,
        };
        self
    }

    pub fn with_registry_sweep_threshold(mut self, threshold: usize) -> Self {
        self.registry_sweep_threshold = threshold.max(1);
        self
    }
}
