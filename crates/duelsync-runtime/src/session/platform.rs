//! Platform networking collaborator
//!
//! The engine never talks to a concrete network stack. It drives these traits,
//! which a console/PC platform layer or the in-memory loopback implements.
//! Every call that can fail returns a typed `TransportError` instead of
//! throwing, so callers decide explicitly how to recover.

use duelsync_core::{Gamertag, TransportError};
use uuid::Uuid;

use super::events::SessionEvent;

/// Identifies one hosted session on the platform
pub type SessionId = Uuid;

// ----------------------------------------------------------------------------
// Data Shapes
// ----------------------------------------------------------------------------

/// Where an outbound payload goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every gamer in the session, the sender included
    All,
    /// The session host only
    Host,
    /// One specific gamer
    Gamer(Gamertag),
}

/// A payload received from another participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundPacket {
    pub sender: Gamertag,
    /// Whether the sender is the session host
    pub from_host: bool,
    pub payload: Vec<u8>,
}

/// A joinable session returned by a find operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableSession {
    pub id: SessionId,
    pub host: Gamertag,
    pub open_slots: usize,
    pub game_in_progress: bool,
}

/// What a finished platform operation produced
pub enum OperationOutput {
    /// Create/join: the session now owned by the caller
    Session(Box<dyn PlatformSession>),
    /// Find: candidate sessions, possibly none
    Found(Vec<AvailableSession>),
}

// ----------------------------------------------------------------------------
// Platform Traits
// ----------------------------------------------------------------------------

/// An asynchronous platform operation in flight
pub trait PendingOperation {
    /// `None` while still running
    fn poll(&mut self) -> Option<Result<OperationOutput, TransportError>>;
}

/// Entry point to the platform's session services
pub trait SessionPlatform {
    fn begin_create(
        &mut self,
        local: &Gamertag,
        max_gamers: usize,
    ) -> Result<Box<dyn PendingOperation>, TransportError>;

    fn begin_find(&mut self, local: &Gamertag) -> Result<Box<dyn PendingOperation>, TransportError>;

    fn begin_join(
        &mut self,
        local: &Gamertag,
        session: SessionId,
    ) -> Result<Box<dyn PendingOperation>, TransportError>;

    /// Join the session the local gamer was invited to
    fn begin_join_invited(
        &mut self,
        local: &Gamertag,
    ) -> Result<Box<dyn PendingOperation>, TransportError>;
}

/// One live platform session, owned by the session manager
pub trait PlatformSession {
    fn id(&self) -> SessionId;

    fn local_gamer(&self) -> &Gamertag;

    fn host(&self) -> Gamertag;

    fn is_host(&self) -> bool {
        *self.local_gamer() == self.host()
    }

    /// Gamers currently in the session, in join order
    fn gamers(&self) -> Vec<Gamertag>;

    fn is_game_in_progress(&self) -> bool;

    /// Reliable, ordered delivery of an opaque payload
    fn send(&mut self, recipient: &Recipient, payload: &[u8]) -> Result<(), TransportError>;

    /// Next inbound payload for the local gamer, oldest first
    fn receive(&mut self) -> Option<InboundPacket>;

    /// Roster and lifecycle events since the last poll
    fn poll_events(&mut self) -> Vec<SessionEvent>;

    fn start_game(&mut self) -> Result<(), TransportError>;

    fn end_game(&mut self) -> Result<(), TransportError>;

    /// Leave and release the session; further calls fail
    fn dispose(&mut self);
}

/// Best-effort background networking (peer discovery) that must release the
/// network before a session operation starts
pub trait BackgroundActivity {
    fn request_pause(&mut self);

    /// True once the activity has actually stopped
    fn confirm_paused(&mut self) -> bool;

    fn resume(&mut self);
}
