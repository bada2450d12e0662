//! Error types for DuelSync
//!
//! The taxonomy follows how each fault is recovered:
//! - `TransportError`: session create/find/join/send failures. Always caught,
//!   logged and turned into "no session"; never a crash.
//! - `ProtocolError`: a payload that cannot be framed or parsed. Fatal, since
//!   it means both ends disagree about the wire format mid-match.
//! - `SchedulerError`: misuse of task list names (programmer error).
//!
//! `DuelError` unifies them for callers that propagate with `?`.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Faults raised by the session transport and the platform beneath it
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("No network session is active")]
    NoSession,
    #[error("Network session has ended")]
    SessionEnded,
    #[error("Session operation {operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },
    #[error("Session operation {operation} timed out after {frames} frames")]
    OperationTimeout { operation: String, frames: u32 },
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
    #[error("Gamer not found in session: {gamertag}")]
    GamerNotFound { gamertag: String },
    #[error("Session is full ({max} gamers)")]
    SessionFull { max: usize },
    #[error("No joinable session available")]
    NoSessionAvailable,
}

/// Faults raised while encoding or decoding a network message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Message type {0} cannot be written to the wire")]
    UnwritableMessage(&'static str),
    #[error("Unknown message discriminator: {0:?}")]
    UnknownDiscriminator(String),
    #[error("Unknown welcome pack kind: {0:?}")]
    UnknownWelcomePack(String),
    #[error("Payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("Payload contains invalid UTF-8 text")]
    InvalidUtf8,
    #[error("Payload has {0} trailing bytes")]
    TrailingData(usize),
    #[error("Field {field} too long for the wire: {len}")]
    LengthOverflow { field: &'static str, len: usize },
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// Faults raised by the task scheduler
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Task list already exists: {0}")]
    DuplicateTaskList(String),
    #[error("Unknown task list: {0}")]
    UnknownTaskList(String),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for DuelSync
#[derive(Debug, thiserror::Error)]
pub enum DuelError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// A state machine was asked to do something its current state forbids
    #[error("Invalid state transition from {from_state}: {reason}")]
    StateTransition { from_state: String, reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl DuelError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        DuelError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a state transition error
    pub fn invalid_transition<S: Into<String>, R: Into<String>>(from_state: S, reason: R) -> Self {
        DuelError::StateTransition {
            from_state: from_state.into(),
            reason: reason.into(),
        }
    }

    /// Create a failed session operation error
    pub fn operation_failed<O: Into<String>, R: Into<String>>(operation: O, reason: R) -> Self {
        DuelError::Transport(TransportError::OperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        })
    }

    /// Whether this error must abort the match rather than be recovered locally
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DuelError::Protocol(_) | DuelError::Scheduler(_) | DuelError::Configuration { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, DuelError>;
pub type DuelResult<T> = Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(DuelError::from(ProtocolError::InvalidUtf8).is_fatal());
        assert!(DuelError::from(SchedulerError::UnknownTaskList("x".into())).is_fatal());
        assert!(!DuelError::from(TransportError::NoSession).is_fatal());
        assert!(!DuelError::invalid_transition("Intro", "not host").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = DuelError::operation_failed("create", "platform busy");
        assert_eq!(
            err.to_string(),
            "Transport error: Session operation create failed: platform busy"
        );
    }
}
