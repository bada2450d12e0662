//! Task definitions
//!
//! A task is a resumable unit of sequential game logic. Instead of a
//! language-level coroutine, each task is an explicit state machine advanced
//! one step per scheduler tick; returning `TaskStep::Yield` is the suspension
//! point.

use core::fmt;

use super::commands::TaskCommands;

// ----------------------------------------------------------------------------
// Task Identity and State
// ----------------------------------------------------------------------------

/// Unique handle of a task within one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id, for logging
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Lifecycle of a task inside its list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Added, not yet advanced
    Queued,
    /// Advanced at least once and suspended
    Running,
    /// Ran to completion
    Completed,
    /// Killed before completion
    Killed,
}

impl TaskState {
    /// Whether the task will still be stepped
    pub fn is_live(self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Running)
    }
}

/// Result of advancing a task by one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStep {
    /// Suspend until the next tick of the owning list
    Yield,
    /// The task has finished
    Complete,
}

// ----------------------------------------------------------------------------
// Task Trait
// ----------------------------------------------------------------------------

/// A suspendable unit of logic operating on a shared context `C`
pub trait Task<C> {
    /// Advance to the next suspension point
    fn step(&mut self, ctx: &mut C, commands: &mut TaskCommands<'_, C>) -> TaskStep;

    /// Run when the task is killed instead of completing
    fn cleanup(&mut self, _ctx: &mut C) {}

    /// Name used in logs
    fn name(&self) -> &str {
        "task"
    }
}
