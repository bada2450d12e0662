//! Reusable task building blocks
//!
//! Game logic composes these into scripted sequences: wait a number of
//! frames, wait for a condition, run a closure, then move on.

use std::collections::VecDeque;

use super::commands::TaskCommands;
use super::task::{Task, TaskStep};

// ----------------------------------------------------------------------------
// Waiting
// ----------------------------------------------------------------------------

/// Suspends for a fixed number of frames
#[derive(Debug, Clone)]
pub struct WaitFrames {
    remaining: u32,
}

impl WaitFrames {
    pub fn new(frames: u32) -> Self {
        Self { remaining: frames }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl<C> Task<C> for WaitFrames {
    fn step(&mut self, _ctx: &mut C, _commands: &mut TaskCommands<'_, C>) -> TaskStep {
        if self.remaining == 0 {
            return TaskStep::Complete;
        }
        self.remaining -= 1;
        TaskStep::Yield
    }

    fn name(&self) -> &str {
        "wait_frames"
    }
}

/// Suspends until a predicate over the context holds
pub struct WaitUntil<F> {
    name: &'static str,
    condition: F,
}

impl<F> WaitUntil<F> {
    pub fn new(name: &'static str, condition: F) -> Self {
        Self { name, condition }
    }
}

impl<C, F> Task<C> for WaitUntil<F>
where
    F: FnMut(&C) -> bool,
{
    fn step(&mut self, ctx: &mut C, _commands: &mut TaskCommands<'_, C>) -> TaskStep {
        if (self.condition)(ctx) {
            TaskStep::Complete
        } else {
            TaskStep::Yield
        }
    }

    fn name(&self) -> &str {
        self.name
    }
}

// ----------------------------------------------------------------------------
// Closures
// ----------------------------------------------------------------------------

/// Task driven by a closure, stepped until it returns `Complete`
pub struct FnTask<F> {
    name: &'static str,
    body: F,
}

impl<F> FnTask<F> {
    pub fn new<C>(name: &'static str, body: F) -> Self
    where
        F: FnMut(&mut C, &mut TaskCommands<'_, C>) -> TaskStep,
    {
        Self { name, body }
    }
}

impl<C, F> Task<C> for FnTask<F>
where
    F: FnMut(&mut C, &mut TaskCommands<'_, C>) -> TaskStep,
{
    fn step(&mut self, ctx: &mut C, commands: &mut TaskCommands<'_, C>) -> TaskStep {
        (self.body)(ctx, commands)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// A closure that runs exactly once and completes
pub struct RunOnce<G> {
    name: &'static str,
    action: G,
}

impl<G> RunOnce<G> {
    pub fn new(name: &'static str, action: G) -> Self {
        Self { name, action }
    }
}

impl<C, G> Task<C> for RunOnce<G>
where
    G: FnMut(&mut C, &mut TaskCommands<'_, C>),
{
    fn step(&mut self, ctx: &mut C, commands: &mut TaskCommands<'_, C>) -> TaskStep {
        (self.action)(ctx, commands);
        TaskStep::Complete
    }

    fn name(&self) -> &str {
        self.name
    }
}

// ----------------------------------------------------------------------------
// Sequencing
// ----------------------------------------------------------------------------

/// Runs child tasks back to back as one task.
///
/// When a child completes the next one starts within the same step, so a
/// sequence only suspends where one of its children does.
pub struct Sequence<C> {
    name: &'static str,
    children: VecDeque<Box<dyn Task<C>>>,
}

impl<C> Sequence<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            children: VecDeque::new(),
        }
    }

    /// Append a child task
    pub fn then<T>(mut self, task: T) -> Self
    where
        T: Task<C> + 'static,
    {
        self.children.push_back(Box::new(task));
        self
    }

    /// Append a closure that runs once
    pub fn then_do<G>(self, name: &'static str, action: G) -> Self
    where
        G: FnMut(&mut C, &mut TaskCommands<'_, C>) + 'static,
    {
        self.then(RunOnce::new(name, action))
    }

    /// Append a wait of `frames` frames
    pub fn wait(self, frames: u32) -> Self {
        self.then(WaitFrames::new(frames))
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl<C> Task<C> for Sequence<C> {
    fn step(&mut self, ctx: &mut C, commands: &mut TaskCommands<'_, C>) -> TaskStep {
        while let Some(current) = self.children.front_mut() {
            match current.step(ctx, commands) {
                TaskStep::Yield => return TaskStep::Yield,
                TaskStep::Complete => {
                    self.children.pop_front();
                }
            }
        }
        TaskStep::Complete
    }

    fn cleanup(&mut self, ctx: &mut C) {
        if let Some(current) = self.children.front_mut() {
            current.cleanup(ctx);
        }
        self.children.clear();
    }

    fn name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskScheduler;

    #[derive(Default)]
    struct Counter {
        value: u32,
        log: Vec<&'static str>,
    }

    #[test]
    fn test_wait_frames_yields_then_completes() {
        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list("game").unwrap();
        let mut ctx = Counter::default();
        let id = scheduler.add_task("game", WaitFrames::new(2), false, &mut ctx).unwrap();

        scheduler.tick("game", &mut ctx).unwrap();
        scheduler.tick("game", &mut ctx).unwrap();
        assert!(scheduler.is_alive(id));
        scheduler.tick("game", &mut ctx).unwrap();
        assert!(!scheduler.is_alive(id));
    }

    #[test]
    fn test_wait_until_condition() {
        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list("game").unwrap();
        let mut ctx = Counter::default();
        let id = scheduler
            .add_task("game", WaitUntil::new("ten", |c: &Counter| c.value >= 10), false, &mut ctx)
            .unwrap();

        scheduler.tick("game", &mut ctx).unwrap();
        assert!(scheduler.is_alive(id));
        ctx.value = 10;
        scheduler.tick("game", &mut ctx).unwrap();
        assert!(!scheduler.is_alive(id));
    }

    #[test]
    fn test_sequence_runs_children_in_order() {
        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list("game").unwrap();
        let mut ctx = Counter::default();

        let sequence = Sequence::new("intro")
            .then_do("first", |c: &mut Counter, _: &mut TaskCommands<'_, Counter>| c.log.push("first"))
            .wait(1)
            .then_do("second", |c: &mut Counter, _: &mut TaskCommands<'_, Counter>| c.log.push("second"));
        let id = scheduler.add_task("game", sequence, true, &mut ctx).unwrap();

        assert_eq!(ctx.log, vec!["first"]);
        scheduler.tick("game", &mut ctx).unwrap();
        assert_eq!(ctx.log, vec!["first", "second"]);
        assert!(!scheduler.is_alive(id));
    }

    #[test]
    fn test_sequence_cleanup_stops_remaining_children() {
        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list("game").unwrap();
        let mut ctx = Counter::default();

        let sequence = Sequence::new("outro")
            .wait(5)
            .then_do("never", |c: &mut Counter, _: &mut TaskCommands<'_, Counter>| c.log.push("never"));
        scheduler.add_task("game", sequence, true, &mut ctx).unwrap();
        scheduler.kill_all_tasks("game", true, &mut ctx).unwrap();

        for _ in 0..10 {
            scheduler.tick("game", &mut ctx).unwrap();
        }
        assert!(ctx.log.is_empty());
    }
}
