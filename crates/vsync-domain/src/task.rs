//! Unit of work produced by the comparator and consumed by the applier.

use crate::insight::Insight;

/// The operation a [`Task`] asks the applier to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Path exists in origin but not destination.
    Add,
    /// Path exists in both but origin's content differs.
    Update,
    /// Path exists in destination but not origin.
    Delete,
}

/// A unit of work for the applier. For [`Op::Delete`] the insight is the
/// zero value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// The untransformed origin path.
    pub path: String,
    /// Which action to perform.
    pub op: Op,
    /// The origin insight to record once the task completes.
    pub insight: Insight,
}

impl Task {
    /// Construct an add task.
    pub fn add(path: impl Into<String>, insight: Insight) -> Self {
        Self {
            path: path.into(),
            op: Op::Add,
            insight,
        }
    }

    /// Construct an update task.
    pub fn update(path: impl Into<String>, insight: Insight) -> Self {
        Self {
            path: path.into(),
            op: Op::Update,
            insight,
        }
    }

    /// Construct a delete task. Its insight is always the zero value.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: Op::Delete,
            insight: Insight::zero(),
        }
    }
}
