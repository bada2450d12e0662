//! Session transport
//!
//! Wraps one platform network session behind `SessionManager`, queues its
//! events, and runs create/find/join as scheduled tasks on the network list.

mod events;
mod manager;
mod operations;
mod platform;

pub mod loopback;

/// Task list session operations run on
pub const NETWORK_LIST: &str = "network";

use duelsync_core::{DuelError, DuelResult};
use tracing::warn;

pub use events::{EventQueue, SessionEndReason, SessionEvent};
pub use loopback::{LoopbackConfig, LoopbackNetwork};
pub use manager::{OperationKind, Received, SessionHost, SessionManager};
pub use operations::{
    begin_create, begin_find, begin_join, begin_join_invited, OperationCallback, OperationHandle,
    OperationOutcome, OperationStatus, SessionOperationTask,
};
pub use platform::{
    AvailableSession, BackgroundActivity, InboundPacket, OperationOutput, PendingOperation,
    PlatformSession, Recipient, SessionId, SessionPlatform,
};

/// Transport faults on send are logged and dropped; the session-ended event
/// that follows them is what screens react to
pub(crate) fn recover_transport(result: DuelResult<()>) -> DuelResult<()> {
    match result {
        Err(DuelError::Transport(error)) => {
            warn!(%error, "send failed");
            Ok(())
        }
        other => other,
    }
}
