//! Session operations as scheduled tasks
//!
//! Creating, finding and joining a session each run as a task on the network
//! list: pause background discovery, wait for it to confirm, make sure no
//! session is active, then start the platform operation and wait for it.
//! Failures are transport faults: logged, the session torn down, and the
//! outcome reported as a failed operation rather than propagated.

use std::cell::RefCell;
use std::rc::Rc;

use duelsync_core::{SchedulerError, Task, TaskCommands, TaskScheduler, TaskStep, TransportError};
use tracing::{debug, info, warn};

use super::manager::{OperationKind, SessionHost};
use super::platform::{AvailableSession, OperationOutput, PendingOperation, SessionId};
use super::NETWORK_LIST;

// ----------------------------------------------------------------------------
// Operation Results
// ----------------------------------------------------------------------------

/// What a successful operation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Created(SessionId),
    Joined(SessionId),
    Found(Vec<AvailableSession>),
}

/// Progress of an operation as seen through its handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Succeeded(OperationOutcome),
    Failed(TransportError),
}

impl OperationStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, OperationStatus::Pending)
    }
}

/// Shared view of an operation's status, updated by its task
pub type OperationHandle = Rc<RefCell<OperationStatus>>;

/// Invoked once with the outcome, from inside the task
pub type OperationCallback<C> = Box<dyn FnOnce(&mut C, &Result<OperationOutcome, TransportError>)>;

// ----------------------------------------------------------------------------
// Operation Task
// ----------------------------------------------------------------------------

enum Phase {
    RequestPause,
    WaitPaused,
    EnsureNoSession,
    Begin,
    Waiting {
        operation: Box<dyn PendingOperation>,
        frames: u32,
    },
    Done,
}

/// Runs one platform session operation to completion
pub struct SessionOperationTask<C> {
    kind: OperationKind,
    phase: Phase,
    timeout_frames: u32,
    handle: OperationHandle,
    callback: Option<OperationCallback<C>>,
}

impl<C: SessionHost> SessionOperationTask<C> {
    fn new(kind: OperationKind, timeout_frames: u32, callback: Option<OperationCallback<C>>) -> Self {
        Self {
            kind,
            phase: Phase::RequestPause,
            timeout_frames,
            handle: Rc::new(RefCell::new(OperationStatus::Pending)),
            callback,
        }
    }

    pub fn handle(&self) -> OperationHandle {
        Rc::clone(&self.handle)
    }

    fn finish(&mut self, ctx: &mut C, result: Result<OperationOutcome, TransportError>) -> TaskStep {
        match &result {
            Ok(outcome) => {
                info!(operation = self.kind.name(), ?outcome, "session operation succeeded");
                *self.handle.borrow_mut() = OperationStatus::Succeeded(outcome.clone());
            }
            Err(error) => {
                warn!(operation = self.kind.name(), %error, "session operation failed");
                // A failed platform call may have left a half-created session
                let session = ctx.session();
                session.set_invite_pending(false);
                session.shutdown_session();
                *self.handle.borrow_mut() = OperationStatus::Failed(error.clone());
            }
        }
        if let Some(callback) = self.callback.take() {
            callback(ctx, &result);
        }
        self.phase = Phase::Done;
        TaskStep::Complete
    }

    fn complete(&mut self, ctx: &mut C, output: OperationOutput) -> TaskStep {
        let result = match (self.kind, output) {
            (OperationKind::Find, OperationOutput::Found(sessions)) => {
                ctx.session().resume_discovery();
                Ok(OperationOutcome::Found(sessions))
            }
            (OperationKind::Create, OperationOutput::Session(session)) => {
                let id = session.id();
                ctx.session().install_session(session);
                Ok(OperationOutcome::Created(id))
            }
            (OperationKind::Join(_) | OperationKind::JoinInvited, OperationOutput::Session(session)) => {
                let id = session.id();
                ctx.session().install_session(session);
                Ok(OperationOutcome::Joined(id))
            }
            (kind, _) => Err(TransportError::OperationFailed {
                operation: kind.name().to_string(),
                reason: "platform returned an unexpected result".to_string(),
            }),
        };
        self.finish(ctx, result)
    }
}

impl<C: SessionHost> Task<C> for SessionOperationTask<C> {
    fn step(&mut self, ctx: &mut C, _commands: &mut TaskCommands<'_, C>) -> TaskStep {
        loop {
            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::RequestPause => {
                    debug!(operation = self.kind.name(), "pausing background discovery");
                    ctx.session().request_discovery_pause();
                    self.phase = Phase::WaitPaused;
                    return TaskStep::Yield;
                }
                Phase::WaitPaused => {
                    if !ctx.session().confirm_discovery_paused() {
                        self.phase = Phase::WaitPaused;
                        return TaskStep::Yield;
                    }
                    self.phase = Phase::EnsureNoSession;
                }
                Phase::EnsureNoSession => {
                    if ctx.session().is_active() {
                        ctx.session().dispose_session();
                    }
                    self.phase = Phase::Begin;
                }
                Phase::Begin => match ctx.session().start_platform_operation(self.kind) {
                    Ok(operation) => {
                        self.phase = Phase::Waiting {
                            operation,
                            frames: 0,
                        };
                        return TaskStep::Yield;
                    }
                    Err(error) => return self.finish(ctx, Err(error)),
                },
                Phase::Waiting {
                    mut operation,
                    frames,
                } => match operation.poll() {
                    None if frames + 1 >= self.timeout_frames => {
                        return self.finish(
                            ctx,
                            Err(TransportError::OperationTimeout {
                                operation: self.kind.name().to_string(),
                                frames: frames + 1,
                            }),
                        );
                    }
                    None => {
                        self.phase = Phase::Waiting {
                            operation,
                            frames: frames + 1,
                        };
                        return TaskStep::Yield;
                    }
                    Some(Ok(output)) => return self.complete(ctx, output),
                    Some(Err(error)) => return self.finish(ctx, Err(error)),
                },
                Phase::Done => return TaskStep::Complete,
            }
        }
    }

    fn cleanup(&mut self, _ctx: &mut C) {
        let mut status = self.handle.borrow_mut();
        if status.is_pending() {
            *status = OperationStatus::Failed(TransportError::OperationFailed {
                operation: self.kind.name().to_string(),
                reason: "cancelled".to_string(),
            });
        }
    }

    fn name(&self) -> &str {
        "session_operation"
    }
}

// ----------------------------------------------------------------------------
// Entry Points
// ----------------------------------------------------------------------------

fn begin<C: SessionHost + 'static>(
    kind: OperationKind,
    scheduler: &mut TaskScheduler<C>,
    ctx: &mut C,
    callback: Option<OperationCallback<C>>,
) -> Result<OperationHandle, SchedulerError> {
    let timeout = ctx.session().config().operation_timeout_frames;
    let task = SessionOperationTask::new(kind, timeout, callback);
    let handle = task.handle();
    scheduler.add_task(NETWORK_LIST, task, true, ctx)?;
    Ok(handle)
}

/// Host a new session
pub fn begin_create<C: SessionHost + 'static>(
    scheduler: &mut TaskScheduler<C>,
    ctx: &mut C,
    callback: Option<OperationCallback<C>>,
) -> Result<OperationHandle, SchedulerError> {
    begin(OperationKind::Create, scheduler, ctx, callback)
}

/// Look for joinable sessions
pub fn begin_find<C: SessionHost + 'static>(
    scheduler: &mut TaskScheduler<C>,
    ctx: &mut C,
    callback: Option<OperationCallback<C>>,
) -> Result<OperationHandle, SchedulerError> {
    begin(OperationKind::Find, scheduler, ctx, callback)
}

/// Join a session returned by a find
pub fn begin_join<C: SessionHost + 'static>(
    scheduler: &mut TaskScheduler<C>,
    ctx: &mut C,
    session: SessionId,
    callback: Option<OperationCallback<C>>,
) -> Result<OperationHandle, SchedulerError> {
    begin(OperationKind::Join(session), scheduler, ctx, callback)
}

/// Accept a pending invite. Discovery stays paused until the join settles.
pub fn begin_join_invited<C: SessionHost + 'static>(
    scheduler: &mut TaskScheduler<C>,
    ctx: &mut C,
    callback: Option<OperationCallback<C>>,
) -> Result<OperationHandle, SchedulerError> {
    ctx.session().set_invite_pending(true);
    begin(OperationKind::JoinInvited, scheduler, ctx, callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::loopback::{LoopbackConfig, LoopbackNetwork};
    use crate::session::manager::SessionManager;
    use duelsync_core::{Gamertag, SessionConfig};

    struct Ctx {
        session: SessionManager,
        outcomes: Vec<Result<OperationOutcome, TransportError>>,
    }

    impl SessionHost for Ctx {
        fn session(&mut self) -> &mut SessionManager {
            &mut self.session
        }
    }

    fn setup(network: &LoopbackNetwork, name: &str, timeout: u32) -> (TaskScheduler<Ctx>, Ctx) {
        let mut scheduler = TaskScheduler::new();
        scheduler.new_task_list(NETWORK_LIST).unwrap();
        let config = SessionConfig {
            operation_timeout_frames: timeout,
            ..SessionConfig::default()
        };
        let ctx = Ctx {
            session: SessionManager::new(
                config,
                Gamertag::new(name),
                Box::new(network.platform()),
                Box::new(network.discovery(name)),
            ),
            outcomes: Vec::new(),
        };
        (scheduler, ctx)
    }

    fn run(scheduler: &mut TaskScheduler<Ctx>, ctx: &mut Ctx, handle: &OperationHandle) {
        for _ in 0..50 {
            if !handle.borrow().is_pending() {
                return;
            }
            scheduler.tick(NETWORK_LIST, ctx).unwrap();
        }
    }

    #[test]
    fn test_create_pauses_discovery_first() {
        let network = LoopbackNetwork::with_config(LoopbackConfig {
            operation_latency_frames: 2,
            pause_latency_frames: 2,
        });
        let (mut scheduler, mut ctx) = setup(&network, "A", 100);

        let handle = begin_create(&mut scheduler, &mut ctx, None).unwrap();
        assert!(network.is_discovery_pause_requested(&Gamertag::new("A")));
        assert!(network.sessions().is_empty());

        run(&mut scheduler, &mut ctx, &handle);
        assert!(matches!(*handle.borrow(), OperationStatus::Succeeded(OperationOutcome::Created(_))));
        assert!(ctx.session.is_valid());
        assert!(ctx.session.is_host());
        assert!(network.is_discovery_paused(&Gamertag::new("A")));
    }

    #[test]
    fn test_callback_receives_outcome() {
        let network = LoopbackNetwork::new();
        let (mut scheduler, mut ctx) = setup(&network, "A", 100);
        let callback: OperationCallback<Ctx> =
            Box::new(|ctx: &mut Ctx, result: &Result<OperationOutcome, TransportError>| {
                ctx.outcomes.push(result.clone())
            });

        let handle = begin_find(&mut scheduler, &mut ctx, Some(callback)).unwrap();
        run(&mut scheduler, &mut ctx, &handle);

        assert_eq!(ctx.outcomes, vec![Ok(OperationOutcome::Found(Vec::new()))]);
        assert!(!network.is_discovery_paused(&Gamertag::new("A")));
    }

    #[test]
    fn test_failed_join_is_recovered() {
        let network = LoopbackNetwork::new();
        let (mut scheduler, mut ctx) = setup(&network, "B", 100);

        let handle = begin_join(&mut scheduler, &mut ctx, SessionId::nil(), None).unwrap();
        run(&mut scheduler, &mut ctx, &handle);

        assert_eq!(
            *handle.borrow(),
            OperationStatus::Failed(TransportError::NoSessionAvailable)
        );
        assert!(!ctx.session.is_active());
        assert!(!network.is_discovery_paused(&Gamertag::new("B")));
    }

    #[test]
    fn test_operation_times_out() {
        let network = LoopbackNetwork::with_config(LoopbackConfig {
            operation_latency_frames: 1_000,
            pause_latency_frames: 0,
        });
        let (mut scheduler, mut ctx) = setup(&network, "A", 3);

        let handle = begin_create(&mut scheduler, &mut ctx, None).unwrap();
        run(&mut scheduler, &mut ctx, &handle);

        assert!(matches!(
            *handle.borrow(),
            OperationStatus::Failed(TransportError::OperationTimeout { frames: 3, .. })
        ));
        assert_eq!(scheduler.live_count(NETWORK_LIST), 0);
    }

    #[test]
    fn test_create_replaces_active_session() {
        let network = LoopbackNetwork::new();
        let (mut scheduler, mut ctx) = setup(&network, "A", 100);

        let first = begin_create(&mut scheduler, &mut ctx, None).unwrap();
        run(&mut scheduler, &mut ctx, &first);
        let first_id = ctx.session.session_id().unwrap();

        let second = begin_create(&mut scheduler, &mut ctx, None).unwrap();
        run(&mut scheduler, &mut ctx, &second);

        assert_ne!(ctx.session.session_id(), Some(first_id));
        assert_eq!(network.sessions().len(), 1);
    }
}
