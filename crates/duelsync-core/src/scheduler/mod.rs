//! Cooperative task scheduling
//!
//! Game logic runs as tasks grouped into named lists. Each frame the owner
//! ticks the lists it cares about; every live task advances to its next
//! suspension point. Nothing here is thread-aware: all tasks share one
//! mutable context and run on the caller's thread.

mod commands;
mod runner;
mod task;
pub mod tasks;

pub use commands::TaskCommands;
pub use runner::TaskScheduler;
pub use task::{Task, TaskId, TaskState, TaskStep};
pub use tasks::{FnTask, RunOnce, Sequence, WaitFrames, WaitUntil};
