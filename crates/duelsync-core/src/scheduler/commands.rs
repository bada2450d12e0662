//! Requests a running task makes of its scheduler
//!
//! A task cannot borrow the scheduler while it is being stepped, so spawns and
//! kills are buffered here and applied right after the step returns.

use super::task::{Task, TaskId};

pub(crate) enum TaskRequest<C> {
    Spawn {
        list: String,
        id: TaskId,
        task: Box<dyn Task<C>>,
        start_immediately: bool,
    },
    Kill(TaskId),
    KillAll {
        list: String,
        immediate: bool,
    },
}

/// Buffer of scheduler requests handed to `Task::step`
pub struct TaskCommands<'a, C> {
    next_id: &'a mut u64,
    requests: Vec<TaskRequest<C>>,
}

impl<'a, C> TaskCommands<'a, C> {
    pub(crate) fn new(next_id: &'a mut u64) -> Self {
        Self {
            next_id,
            requests: Vec::new(),
        }
    }

    /// Add a task to `list`. It does not run during the pass that spawned it
    /// unless `start_immediately` is set, in which case it is advanced once as
    /// soon as the current step returns.
    pub fn spawn<T>(&mut self, list: &str, task: T, start_immediately: bool) -> TaskId
    where
        T: Task<C> + 'static,
    {
        *self.next_id += 1;
        let id = TaskId::new(*self.next_id);
        self.requests.push(TaskRequest::Spawn {
            list: list.to_string(),
            id,
            task: Box::new(task),
            start_immediately,
        });
        id
    }

    /// Kill a task by id; unknown or finished ids are ignored
    pub fn kill(&mut self, id: TaskId) {
        self.requests.push(TaskRequest::Kill(id));
    }

    /// Kill every task in `list`
    pub fn kill_all(&mut self, list: &str, immediate: bool) {
        self.requests.push(TaskRequest::KillAll {
            list: list.to_string(),
            immediate,
        });
    }

    pub(crate) fn into_requests(self) -> Vec<TaskRequest<C>> {
        self.requests
    }
}
