//! Session events and the queue they wait in
//!
//! The platform reports roster and lifecycle changes asynchronously; they are
//! queued here and drained by the active screen once per frame, before any
//! message is processed.

use std::collections::VecDeque;
use std::fmt;

use duelsync_core::Gamertag;
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Session Events
// ----------------------------------------------------------------------------

/// Why a session stopped being usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEndReason {
    ClientSignedOut,
    Disconnected,
    HostEndedSession,
    RemovedByHost,
}

impl fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionEndReason::ClientSignedOut => "signed out",
            SessionEndReason::Disconnected => "disconnected",
            SessionEndReason::HostEndedSession => "host ended the session",
            SessionEndReason::RemovedByHost => "removed by host",
        };
        f.write_str(text)
    }
}

/// Something that happened to the network session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    GamerJoined { gamer: Gamertag },
    GamerLeft { gamer: Gamertag },
    GameStarted,
    GameEnded,
    SessionEnded { reason: SessionEndReason },
}

impl SessionEvent {
    pub fn is_session_ended(&self) -> bool {
        matches!(self, SessionEvent::SessionEnded { .. })
    }

    /// Roster changes, as opposed to lifecycle changes
    pub fn is_roster_change(&self) -> bool {
        matches!(
            self,
            SessionEvent::GamerJoined { .. } | SessionEvent::GamerLeft { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Event Queue
// ----------------------------------------------------------------------------

/// FIFO of pending session events with front re-insertion
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<SessionEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an event from the platform.
    ///
    /// `SessionEnded` makes everything still pending moot: the queue is
    /// cleared and the ended event is left alone in it.
    pub fn push(&mut self, event: SessionEvent) {
        if event.is_session_ended() {
            if !self.events.is_empty() {
                info!(discarded = self.events.len(), "session ended, discarding pending events");
            }
            self.events.clear();
        }
        debug!(?event, "session event queued");
        self.events.push_back(event);
    }

    /// Dequeue the oldest event
    pub fn get_next_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    /// Put an event back at the front, to be handled first next time
    pub fn push_back_event(&mut self, event: SessionEvent) {
        self.events.push_front(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(name: &str) -> SessionEvent {
        SessionEvent::GamerJoined {
            gamer: Gamertag::new(name),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = EventQueue::new();
        queue.push(joined("A"));
        queue.push(SessionEvent::GameStarted);
        assert_eq!(queue.get_next_event(), Some(joined("A")));
        assert_eq!(queue.get_next_event(), Some(SessionEvent::GameStarted));
        assert_eq!(queue.get_next_event(), None);
    }

    #[test]
    fn test_push_back_reinserts_at_front() {
        let mut queue = EventQueue::new();
        queue.push(joined("A"));
        queue.push(joined("B"));
        let first = queue.get_next_event().unwrap();
        queue.push_back_event(first.clone());
        assert_eq!(queue.get_next_event(), Some(first));
    }

    #[test]
    fn test_session_ended_clears_pending() {
        let mut queue = EventQueue::new();
        queue.push(joined("A"));
        queue.push(SessionEvent::GameStarted);
        queue.push(SessionEvent::SessionEnded {
            reason: SessionEndReason::Disconnected,
        });
        assert_eq!(queue.len(), 1);
        assert!(queue.get_next_event().unwrap().is_session_ended());
    }
}
