//! Task Scheduler
//!
//! Owns every task list and is the single point of cooperative concurrency.
//! Lists are ticked independently: ticking or killing one list never touches
//! the tasks of another, except through explicit requests a task makes.

use tracing::{debug, trace};

use super::commands::{TaskCommands, TaskRequest};
use super::task::{Task, TaskId, TaskState, TaskStep};
use crate::errors::SchedulerError;

// ----------------------------------------------------------------------------
// Task List
// ----------------------------------------------------------------------------

struct TaskEntry<C> {
    id: TaskId,
    state: TaskState,
    /// Cleanup has run for a killed task
    cleaned: bool,
    task: Box<dyn Task<C>>,
}

impl<C> TaskEntry<C> {
    fn retained(&self) -> bool {
        self.state.is_live() || (self.state == TaskState::Killed && !self.cleaned)
    }
}

struct TaskList<C> {
    name: String,
    entries: Vec<TaskEntry<C>>,
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

/// Cooperative scheduler over named task lists sharing a context `C`
pub struct TaskScheduler<C> {
    lists: Vec<TaskList<C>>,
    next_id: u64,
    /// List currently inside `tick`; its entries must not be removed mid-pass
    ticking: Option<usize>,
}

impl<C> Default for TaskScheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> TaskScheduler<C> {
    /// Create a scheduler with no task lists
    pub fn new() -> Self {
        Self {
            lists: Vec::new(),
            next_id: 0,
            ticking: None,
        }
    }

    /// Create an empty, independently ticked task list
    pub fn new_task_list(&mut self, name: &str) -> Result<(), SchedulerError> {
        if self.lists.iter().any(|list| list.name == name) {
            return Err(SchedulerError::DuplicateTaskList(name.to_string()));
        }
        debug!(list = name, "task list created");
        self.lists.push(TaskList {
            name: name.to_string(),
            entries: Vec::new(),
        });
        Ok(())
    }

    /// Whether a list with this name exists
    pub fn has_task_list(&self, name: &str) -> bool {
        self.lists.iter().any(|list| list.name == name)
    }

    /// Names of all lists in creation order
    pub fn list_names(&self) -> impl Iterator<Item = &str> {
        self.lists.iter().map(|list| list.name.as_str())
    }

    /// Append a task to `list`.
    ///
    /// With `start_immediately` the task is advanced once before this returns,
    /// so at least one unit of its logic has run within the current frame.
    pub fn add_task<T>(
        &mut self,
        list: &str,
        task: T,
        start_immediately: bool,
        ctx: &mut C,
    ) -> Result<TaskId, SchedulerError>
    where
        T: Task<C> + 'static,
    {
        let list_index = self.list_index(list)?;
        self.next_id += 1;
        let id = TaskId::new(self.next_id);
        trace!(list, %id, name = task.name(), start_immediately, "task added");
        self.push_entry(list_index, id, Box::new(task), start_immediately, ctx)?;
        Ok(id)
    }

    /// Advance every live task in `list` exactly once, in insertion order.
    ///
    /// Tasks added during the pass are not advanced by it. Finished tasks are
    /// removed once the pass is over.
    pub fn tick(&mut self, list: &str, ctx: &mut C) -> Result<(), SchedulerError> {
        let list_index = self.list_index(list)?;
        let pass_len = self.lists[list_index].entries.len();

        self.ticking = Some(list_index);
        let result = (0..pass_len).try_for_each(|position| self.advance(list_index, position, ctx));
        self.ticking = None;

        self.sweep(list_index);
        result
    }

    /// Mark a task as killed. Its cleanup runs the next time it would resume.
    /// Returns false if the task is not tracked or already finished.
    pub fn kill_task(&mut self, id: TaskId) -> bool {
        for list in &mut self.lists {
            if let Some(entry) = list.entries.iter_mut().find(|entry| entry.id == id) {
                if entry.state.is_live() {
                    trace!(list = %list.name, %id, "task killed");
                    entry.state = TaskState::Killed;
                    return true;
                }
                return false;
            }
        }
        false
    }

    /// Kill every task in `list`.
    ///
    /// With `immediate` each task's cleanup runs now; otherwise cleanup waits
    /// for the task's next tick so an in-progress pass over the same list never
    /// sees entries disappear.
    pub fn kill_all_tasks(
        &mut self,
        list: &str,
        immediate: bool,
        ctx: &mut C,
    ) -> Result<(), SchedulerError> {
        let list_index = self.list_index(list)?;
        let mut killed = 0usize;

        for entry in &mut self.lists[list_index].entries {
            if entry.state.is_live() {
                entry.state = TaskState::Killed;
                killed += 1;
            } else if entry.state != TaskState::Killed {
                continue;
            }
            // Also flushes tasks killed earlier whose cleanup was deferred
            if immediate && !entry.cleaned {
                entry.task.cleanup(ctx);
                entry.cleaned = true;
            }
        }

        debug!(list, killed, immediate, "killed all tasks");
        if immediate && self.ticking != Some(list_index) {
            self.sweep(list_index);
        }
        Ok(())
    }

    /// Whether the task is still queued or running
    pub fn is_alive(&self, id: TaskId) -> bool {
        self.state_of(id).map(TaskState::is_live).unwrap_or(false)
    }

    /// State of a tracked task; `None` once it has been removed
    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.lists
            .iter()
            .flat_map(|list| list.entries.iter())
            .find(|entry| entry.id == id)
            .map(|entry| entry.state)
    }

    /// Number of queued or running tasks in `list`
    pub fn live_count(&self, list: &str) -> usize {
        self.lists
            .iter()
            .find(|l| l.name == list)
            .map(|l| l.entries.iter().filter(|e| e.state.is_live()).count())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn list_index(&self, name: &str) -> Result<usize, SchedulerError> {
        self.lists
            .iter()
            .position(|list| list.name == name)
            .ok_or_else(|| SchedulerError::UnknownTaskList(name.to_string()))
    }

    fn push_entry(
        &mut self,
        list_index: usize,
        id: TaskId,
        task: Box<dyn Task<C>>,
        start_immediately: bool,
        ctx: &mut C,
    ) -> Result<(), SchedulerError> {
        let entries = &mut self.lists[list_index].entries;
        entries.push(TaskEntry {
            id,
            state: TaskState::Queued,
            cleaned: false,
            task,
        });

        if start_immediately {
            let position = entries.len() - 1;
            self.advance(list_index, position, ctx)?;
            if self.ticking != Some(list_index) {
                self.sweep(list_index);
            }
        }
        Ok(())
    }

    /// Step one entry, then apply whatever it requested
    fn advance(
        &mut self,
        list_index: usize,
        position: usize,
        ctx: &mut C,
    ) -> Result<(), SchedulerError> {
        let mut commands = TaskCommands::new(&mut self.next_id);
        let entry = &mut self.lists[list_index].entries[position];

        match entry.state {
            TaskState::Completed => return Ok(()),
            TaskState::Killed => {
                if !entry.cleaned {
                    entry.task.cleanup(ctx);
                    entry.cleaned = true;
                }
                return Ok(());
            }
            TaskState::Queued | TaskState::Running => {
                entry.state = TaskState::Running;
                if entry.task.step(ctx, &mut commands) == TaskStep::Complete {
                    trace!(id = %entry.id, name = entry.task.name(), "task completed");
                    entry.state = TaskState::Completed;
                }
            }
        }

        let requests = commands.into_requests();
        self.apply(requests, ctx)
    }

    fn apply(&mut self, requests: Vec<TaskRequest<C>>, ctx: &mut C) -> Result<(), SchedulerError> {
        for request in requests {
            match request {
                TaskRequest::Spawn {
                    list,
                    id,
                    task,
                    start_immediately,
                } => {
                    let list_index = self.list_index(&list)?;
                    trace!(list = %list, %id, name = task.name(), "task spawned by task");
                    self.push_entry(list_index, id, task, start_immediately, ctx)?;
                }
                TaskRequest::Kill(id) => {
                    self.kill_task(id);
                }
                TaskRequest::KillAll { list, immediate } => {
                    self.kill_all_tasks(&list, immediate, ctx)?;
                }
            }
        }
        Ok(())
    }

    fn sweep(&mut self, list_index: usize) {
        self.lists[list_index].entries.retain(TaskEntry::retained);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::tasks::{FnTask, WaitFrames};

    /// Shared log of what ran, in order
    #[derive(Default)]
    struct Trace {
        events: Vec<String>,
    }

    /// Records each step and completes after `steps` steps
    struct Recorder {
        label: &'static str,
        steps: u32,
        taken: u32,
    }

    impl Recorder {
        fn new(label: &'static str, steps: u32) -> Self {
            Self {
                label,
                steps,
                taken: 0,
            }
        }
    }

    impl Task<Trace> for Recorder {
        fn step(&mut self, ctx: &mut Trace, _: &mut TaskCommands<'_, Trace>) -> TaskStep {
            self.taken += 1;
            ctx.events.push(format!("{}:{}", self.label, self.taken));
            if self.taken >= self.steps {
                TaskStep::Complete
            } else {
                TaskStep::Yield
            }
        }

        fn cleanup(&mut self, ctx: &mut Trace) {
            ctx.events.push(format!("{}:cleanup", self.label));
        }
    }

    fn scheduler_with(lists: &[&str]) -> TaskScheduler<Trace> {
        let mut scheduler = TaskScheduler::new();
        for list in lists {
            scheduler.new_task_list(list).unwrap();
        }
        scheduler
    }

    #[test]
    fn test_duplicate_list_rejected() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        assert_eq!(
            scheduler.new_task_list("gameplay"),
            Err(SchedulerError::DuplicateTaskList("gameplay".into()))
        );
    }

    #[test]
    fn test_unknown_list_rejected() {
        let mut scheduler = scheduler_with(&[]);
        let mut trace = Trace::default();
        assert!(scheduler.tick("missing", &mut trace).is_err());
        assert!(scheduler
            .add_task("missing", Recorder::new("a", 1), false, &mut trace)
            .is_err());
    }

    #[test]
    fn test_tick_runs_in_insertion_order() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        scheduler.add_task("gameplay", Recorder::new("a", 2), false, &mut trace).unwrap();
        scheduler.add_task("gameplay", Recorder::new("b", 1), false, &mut trace).unwrap();
        assert!(trace.events.is_empty());

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(trace.events, vec!["a:1", "b:1"]);
        assert_eq!(scheduler.live_count("gameplay"), 1);

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(trace.events, vec!["a:1", "b:1", "a:2"]);
        assert_eq!(scheduler.live_count("gameplay"), 0);
    }

    #[test]
    fn test_start_immediately_runs_before_return() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        scheduler.add_task("gameplay", Recorder::new("later", 1), false, &mut trace).unwrap();
        let id = scheduler
            .add_task("gameplay", Recorder::new("now", 2), true, &mut trace)
            .unwrap();

        assert_eq!(trace.events, vec!["now:1"]);
        assert!(scheduler.is_alive(id));

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(trace.events, vec!["now:1", "later:1", "now:2"]);
    }

    #[test]
    fn test_start_immediately_completing_task_is_removed() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        let id = scheduler
            .add_task("gameplay", Recorder::new("once", 1), true, &mut trace)
            .unwrap();
        assert_eq!(scheduler.state_of(id), None);
        assert_eq!(scheduler.live_count("gameplay"), 0);
    }

    #[test]
    fn test_task_spawned_during_pass_waits_for_next_pass() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        let spawner = FnTask::new("spawner", |ctx: &mut Trace, commands: &mut TaskCommands<'_, Trace>| {
            ctx.events.push("spawner".into());
            commands.spawn("gameplay", Recorder::new("child", 1), false);
            TaskStep::Complete
        });
        scheduler.add_task("gameplay", spawner, false, &mut trace).unwrap();

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(trace.events, vec!["spawner"]);
        assert_eq!(scheduler.live_count("gameplay"), 1);

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(trace.events, vec!["spawner", "child:1"]);
    }

    #[test]
    fn test_spawn_immediately_from_task_runs_after_spawner_step() {
        let mut scheduler = scheduler_with(&["gameplay", "audio"]);
        let mut trace = Trace::default();
        let spawner = FnTask::new("spawner", |ctx: &mut Trace, commands: &mut TaskCommands<'_, Trace>| {
            ctx.events.push("spawner".into());
            commands.spawn("audio", Recorder::new("sting", 2), true);
            TaskStep::Complete
        });
        scheduler.add_task("gameplay", spawner, false, &mut trace).unwrap();
        scheduler.tick("gameplay", &mut trace).unwrap();

        assert_eq!(trace.events, vec!["spawner", "sting:1"]);
        assert_eq!(scheduler.live_count("audio"), 1);
        assert_eq!(scheduler.live_count("gameplay"), 0);
    }

    #[test]
    fn test_kill_task_defers_cleanup_to_next_tick() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        let id = scheduler
            .add_task("gameplay", Recorder::new("a", 5), false, &mut trace)
            .unwrap();
        scheduler.tick("gameplay", &mut trace).unwrap();

        assert!(scheduler.kill_task(id));
        assert!(!scheduler.is_alive(id));
        assert_eq!(trace.events, vec!["a:1"]);

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(trace.events, vec!["a:1", "a:cleanup"]);
        assert_eq!(scheduler.state_of(id), None);
    }

    #[test]
    fn test_kill_unknown_task_is_noop() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        let id = scheduler
            .add_task("gameplay", Recorder::new("a", 1), false, &mut trace)
            .unwrap();
        scheduler.tick("gameplay", &mut trace).unwrap();

        // Already completed naturally
        assert!(!scheduler.kill_task(id));
        assert_eq!(trace.events, vec!["a:1"]);
    }

    #[test]
    fn test_kill_all_immediate_leaves_no_live_tasks() {
        let mut scheduler = scheduler_with(&["gameplay", "game"]);
        let mut trace = Trace::default();
        scheduler.add_task("gameplay", Recorder::new("a", 3), false, &mut trace).unwrap();
        scheduler.add_task("gameplay", Recorder::new("b", 3), true, &mut trace).unwrap();
        scheduler.add_task("game", Recorder::new("g", 3), false, &mut trace).unwrap();

        scheduler.kill_all_tasks("gameplay", true, &mut trace).unwrap();

        assert_eq!(scheduler.live_count("gameplay"), 0);
        assert_eq!(scheduler.live_count("game"), 1);
        assert_eq!(trace.events, vec!["b:1", "a:cleanup", "b:cleanup"]);
    }

    #[test]
    fn test_kill_all_deferred_cleans_up_on_tick() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        scheduler.add_task("gameplay", Recorder::new("a", 3), false, &mut trace).unwrap();

        scheduler.kill_all_tasks("gameplay", false, &mut trace).unwrap();
        assert_eq!(scheduler.live_count("gameplay"), 0);
        assert!(trace.events.is_empty());

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(trace.events, vec!["a:cleanup"]);
    }

    #[test]
    fn test_kill_all_from_inside_same_list() {
        let mut scheduler = scheduler_with(&["gameplay"]);
        let mut trace = Trace::default();
        let killer = FnTask::new("killer", |ctx: &mut Trace, commands: &mut TaskCommands<'_, Trace>| {
            ctx.events.push("killer".into());
            commands.kill_all("gameplay", false);
            TaskStep::Yield
        });
        scheduler.add_task("gameplay", killer, false, &mut trace).unwrap();
        scheduler.add_task("gameplay", Recorder::new("victim", 3), false, &mut trace).unwrap();

        scheduler.tick("gameplay", &mut trace).unwrap();
        // The victim is reached later in the same pass and runs its cleanup
        // instead of its step.
        assert_eq!(trace.events, vec!["killer", "victim:cleanup"]);

        scheduler.tick("gameplay", &mut trace).unwrap();
        assert_eq!(
            trace.events,
            vec!["killer", "victim:cleanup", "killer:cleanup"]
        );
        assert_eq!(scheduler.live_count("gameplay"), 0);
    }

    #[test]
    fn test_lists_are_independent() {
        let mut scheduler = scheduler_with(&["gameplay", "audio"]);
        let mut trace = Trace::default();
        scheduler.add_task("gameplay", WaitFrames::new(3), false, &mut trace).unwrap();
        let audio = scheduler
            .add_task("audio", Recorder::new("music", 10), false, &mut trace)
            .unwrap();

        scheduler.tick("gameplay", &mut trace).unwrap();
        scheduler.kill_all_tasks("gameplay", true, &mut trace).unwrap();

        assert!(scheduler.is_alive(audio));
        assert!(trace.events.is_empty());
    }
}
