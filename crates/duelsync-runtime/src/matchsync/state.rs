//! Match states
//!
//! Host and clients each hold their own `MatchState`; the message protocol,
//! not shared memory, drives them into agreement.

use core::fmt;

use crate::session::SessionEndReason;

// ----------------------------------------------------------------------------
// Role
// ----------------------------------------------------------------------------

/// Which side of the protocol a participant plays, fixed for a whole match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Authoritative: generates questions, confirms inputs, decides outcomes
    Host,
    /// Proposes input and waits for host confirmation
    Client,
}

impl Role {
    pub fn is_host(self) -> bool {
        self == Role::Host
    }
}

// ----------------------------------------------------------------------------
// Match State
// ----------------------------------------------------------------------------

/// Per-screen match state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchState {
    Intro,
    /// Host: waiting for every client's ready acknowledgement
    WaitForReady,
    /// Client: waiting for the host's question content
    WaitForQuestion,
    QuestionIntro,
    QuestionDisplay,
    WaitForAnswer,
    AnswerCorrect,
    AnswerWrong,
    AnswerNotGiven,
    QuestionOutro,
    /// The outcome is decided and the closing animation is playing
    Concluding,
    /// The match has a winner
    GameWon,
    /// The match ended without a winner
    GameLost,
    Outro,
    Finished,
}

impl MatchState {
    /// The outcome of the match has been decided
    pub fn is_concluded(self) -> bool {
        matches!(
            self,
            MatchState::Concluding
                | MatchState::GameWon
                | MatchState::GameLost
                | MatchState::Outro
                | MatchState::Finished
        )
    }

    /// A question is on screen or being resolved
    pub fn is_question_phase(self) -> bool {
        matches!(
            self,
            MatchState::QuestionIntro
                | MatchState::QuestionDisplay
                | MatchState::WaitForAnswer
                | MatchState::AnswerCorrect
                | MatchState::AnswerWrong
                | MatchState::AnswerNotGiven
                | MatchState::QuestionOutro
        )
    }
}

impl fmt::Display for MatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ----------------------------------------------------------------------------
// Joining State
// ----------------------------------------------------------------------------

/// Catch-up progress of a client that attached to a match underway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoiningState {
    WaitingForWelcomePack,
    /// World state applied; waiting for the snapshot fence
    WaitingToWatch,
    Joined,
}

// ----------------------------------------------------------------------------
// Update Status
// ----------------------------------------------------------------------------

/// What a frame of match logic produced, for the screen owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Running,
    Finished,
    /// The session ended; the owner must run session-loss handling
    SessionLost(SessionEndReason),
}

/// Whether a handler used up the message in the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Consumed,
    /// Leave it in the slot for a later state
    Deferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concluded_states() {
        assert!(MatchState::GameWon.is_concluded());
        assert!(MatchState::Concluding.is_concluded());
        assert!(!MatchState::QuestionOutro.is_concluded());
        assert!(MatchState::AnswerNotGiven.is_question_phase());
        assert!(!MatchState::WaitForReady.is_question_phase());
    }
}
