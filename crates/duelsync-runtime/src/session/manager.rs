//! Session Manager
//!
//! Owns the single platform session, the session event queue and the shared
//! serialization buffer. It is constructed once per process and handed to the
//! components that need it through `SessionHost`, so "exactly one session"
//! holds by construction.

use duelsync_core::{
    DuelResult, Gamertag, MessageSlot, NetworkMessage, ProtocolError, SessionConfig,
    TransportError, WireFormat,
};
use tracing::{debug, error, info, warn};

use super::events::{EventQueue, SessionEvent};
use super::platform::{
    BackgroundActivity, PendingOperation, PlatformSession, Recipient, SessionId, SessionPlatform,
};

// ----------------------------------------------------------------------------
// Context Access
// ----------------------------------------------------------------------------

/// Gives tasks and screens access to the one session manager
pub trait SessionHost {
    fn session(&mut self) -> &mut SessionManager;
}

// ----------------------------------------------------------------------------
// Operation Kinds
// ----------------------------------------------------------------------------

/// Platform operation a session task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
    Find,
    Join(SessionId),
    JoinInvited,
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Find => "find",
            OperationKind::Join(_) => "join",
            OperationKind::JoinInvited => "join_invited",
        }
    }
}

/// Outcome of trying to fill a message slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A new message was placed in the slot
    Filled,
    /// The slot still holds an unconsumed message; nothing was read
    Occupied,
    /// A payload from the wrong role was read and thrown away
    Discarded,
    /// Nothing is waiting
    Nothing,
}

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

pub struct SessionManager {
    config: SessionConfig,
    local: Gamertag,
    platform: Box<dyn SessionPlatform>,
    discovery: Box<dyn BackgroundActivity>,
    session: Option<Box<dyn PlatformSession>>,
    /// `SessionEnded` has been observed for the current session
    ended: bool,
    /// An invite accept is in flight; discovery must stay paused
    invite_pending: bool,
    events: EventQueue,
    /// Shared serialization buffer for every outbound message
    buffer: Vec<u8>,
    packets_sent: u64,
}

impl SessionManager {
    pub fn new(
        config: SessionConfig,
        local: Gamertag,
        platform: Box<dyn SessionPlatform>,
        discovery: Box<dyn BackgroundActivity>,
    ) -> Self {
        Self {
            config,
            local,
            platform,
            discovery,
            session: None,
            ended: false,
            invite_pending: false,
            events: EventQueue::new(),
            buffer: Vec::new(),
            packets_sent: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn local_gamer(&self) -> &Gamertag {
        &self.local
    }

    // ------------------------------------------------------------------------
    // Session State
    // ------------------------------------------------------------------------

    /// A session object exists, whether or not it has ended
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// A session exists and has not ended
    pub fn is_valid(&self) -> bool {
        self.session.is_some() && !self.ended
    }

    pub fn is_host(&self) -> bool {
        self.session.as_ref().map(|s| s.is_host()).unwrap_or(false)
    }

    pub fn host_gamer(&self) -> Option<Gamertag> {
        self.session.as_ref().map(|s| s.host())
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id())
    }

    pub fn gamers(&self) -> Vec<Gamertag> {
        self.session.as_ref().map(|s| s.gamers()).unwrap_or_default()
    }

    pub fn is_game_in_progress(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.is_game_in_progress())
            .unwrap_or(false)
    }

    /// Outbound messages handed to the platform so far
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Adopt the session produced by a create or join
    pub fn install_session(&mut self, session: Box<dyn PlatformSession>) {
        info!(session = %session.id(), host = %session.host(), "session installed");
        self.session = Some(session);
        self.ended = false;
        self.invite_pending = false;
    }

    /// Dispose the session if any, clear the ended flag and resume discovery
    /// unless an invite accept is in flight
    pub fn shutdown_session(&mut self) {
        self.dispose_session();
        if !self.invite_pending {
            self.discovery.resume();
        }
    }

    /// Dispose the session without touching background discovery
    pub fn dispose_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            info!(session = %session.id(), "shutting down session");
            session.dispose();
        }
        self.ended = false;
        self.events.clear();
    }

    pub fn set_invite_pending(&mut self, pending: bool) {
        self.invite_pending = pending;
    }

    pub fn is_invite_pending(&self) -> bool {
        self.invite_pending
    }

    pub fn start_game(&mut self) -> Result<(), TransportError> {
        self.valid_session()?.start_game()
    }

    pub fn end_game(&mut self) -> Result<(), TransportError> {
        self.valid_session()?.end_game()
    }

    fn valid_session(&mut self) -> Result<&mut Box<dyn PlatformSession>, TransportError> {
        if self.ended {
            return Err(TransportError::SessionEnded);
        }
        self.session.as_mut().ok_or(TransportError::NoSession)
    }

    // ------------------------------------------------------------------------
    // Background Discovery
    // ------------------------------------------------------------------------

    pub fn request_discovery_pause(&mut self) {
        self.discovery.request_pause();
    }

    pub fn confirm_discovery_paused(&mut self) -> bool {
        self.discovery.confirm_paused()
    }

    pub fn resume_discovery(&mut self) {
        if !self.invite_pending {
            self.discovery.resume();
        }
    }

    /// Start the platform half of a session operation
    pub fn start_platform_operation(
        &mut self,
        kind: OperationKind,
    ) -> Result<Box<dyn PendingOperation>, TransportError> {
        match kind {
            OperationKind::Create => self.platform.begin_create(&self.local, self.config.max_gamers),
            OperationKind::Find => self.platform.begin_find(&self.local),
            OperationKind::Join(id) => self.platform.begin_join(&self.local, id),
            OperationKind::JoinInvited => self.platform.begin_join_invited(&self.local),
        }
    }

    // ------------------------------------------------------------------------
    // Event Queue
    // ------------------------------------------------------------------------

    /// Move platform events into the queue
    pub fn pump(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        for event in session.poll_events() {
            if self.ended {
                debug!(?event, "ignoring event after session end");
                continue;
            }
            if event.is_session_ended() {
                warn!(?event, "session ended");
                self.ended = true;
            }
            self.events.push(event);
        }
    }

    pub fn get_next_event(&mut self) -> Option<SessionEvent> {
        self.events.get_next_event()
    }

    pub fn push_back_event(&mut self, event: SessionEvent) {
        self.events.push_back_event(event);
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    pub fn send_to_host(&mut self, message: &NetworkMessage) -> DuelResult<()> {
        self.send(Recipient::Host, message)
    }

    /// Broadcast, including back to the local gamer
    pub fn send_to_all(&mut self, message: &NetworkMessage) -> DuelResult<()> {
        self.send(Recipient::All, message)
    }

    pub fn send_to(&mut self, gamer: &Gamertag, message: &NetworkMessage) -> DuelResult<()> {
        self.send(Recipient::Gamer(gamer.clone()), message)
    }

    fn send(&mut self, recipient: Recipient, message: &NetworkMessage) -> DuelResult<()> {
        if self.ended {
            return Err(TransportError::SessionEnded.into());
        }
        let Some(session) = self.session.as_mut() else {
            return Err(TransportError::NoSession.into());
        };

        WireFormat::encode_into(message, &mut self.buffer)?;
        session.send(&recipient, &self.buffer)?;
        self.packets_sent += 1;
        debug!(kind = message.discriminator(), ?recipient, bytes = self.buffer.len(), "message sent");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Receiving
    // ------------------------------------------------------------------------

    /// Fill `slot` with the next message if it came from the host
    pub fn receive_from_host(&mut self, slot: &mut MessageSlot) -> Result<Received, ProtocolError> {
        self.receive(slot, true)
    }

    /// Fill `slot` with the next message if it came from a non-host gamer
    pub fn receive_from_client(&mut self, slot: &mut MessageSlot) -> Result<Received, ProtocolError> {
        self.receive(slot, false)
    }

    fn receive(&mut self, slot: &mut MessageSlot, from_host: bool) -> Result<Received, ProtocolError> {
        if !slot.is_empty() {
            return Ok(Received::Occupied);
        }
        if self.ended {
            return Ok(Received::Nothing);
        }
        let Some(packet) = self.session.as_mut().and_then(|s| s.receive()) else {
            return Ok(Received::Nothing);
        };

        if packet.from_host != from_host {
            debug!(sender = %packet.sender, "discarding payload from unexpected role");
            return Ok(Received::Discarded);
        }

        let message = WireFormat::decode(&packet.payload).map_err(|e| {
            error!(sender = %packet.sender, error = %e, "undecodable payload");
            e
        })?;
        debug!(kind = message.discriminator(), sender = %packet.sender, "message received");
        slot.accept(packet.sender, message);
        Ok(Received::Filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::loopback::LoopbackNetwork;
    use crate::session::SessionEndReason;

    fn manager(network: &LoopbackNetwork, name: &str) -> SessionManager {
        SessionManager::new(
            SessionConfig::default(),
            Gamertag::new(name),
            Box::new(network.platform()),
            Box::new(network.discovery(name)),
        )
    }

    fn connect(network: &LoopbackNetwork, host: &mut SessionManager, client: &mut SessionManager) {
        let session = network.create_now(host.local_gamer(), 8).unwrap();
        let id = session.id();
        host.install_session(session);
        client.install_session(network.join_now(client.local_gamer(), id).unwrap());
    }

    #[test]
    fn test_no_session_sends_fail() {
        let network = LoopbackNetwork::new();
        let mut alice = manager(&network, "A");
        let result = alice.send_to_all(&NetworkMessage::ReadyForNextQuestion { question_index: 1 });
        assert!(matches!(
            result,
            Err(duelsync_core::DuelError::Transport(TransportError::NoSession))
        ));
        assert!(!alice.is_active());
    }

    #[test]
    fn test_client_receives_only_from_host() {
        let network = LoopbackNetwork::new();
        let mut host = manager(&network, "A");
        let mut client = manager(&network, "B");
        connect(&network, &mut host, &mut client);

        let ready = NetworkMessage::ReadyForNextQuestion { question_index: 2 };
        client.send_to_all(&ready).unwrap();
        host.send_to_all(&ready).unwrap();

        // The client's own broadcast loops back but is not from the host
        let mut slot = MessageSlot::new();
        assert_eq!(client.receive_from_host(&mut slot), Ok(Received::Discarded));
        assert_eq!(client.receive_from_host(&mut slot), Ok(Received::Filled));
        assert_eq!(slot.sender().map(Gamertag::as_str), Some("A"));
        assert_eq!(client.receive_from_host(&mut slot), Ok(Received::Occupied));

        let mut host_slot = MessageSlot::new();
        assert_eq!(host.receive_from_client(&mut host_slot), Ok(Received::Filled));
        assert_eq!(host.receive_from_client(&mut host_slot), Ok(Received::Occupied));
        host_slot.consume();
        // Own loopback broadcast is discarded
        assert_eq!(host.receive_from_client(&mut host_slot), Ok(Received::Discarded));
        assert_eq!(host.receive_from_client(&mut host_slot), Ok(Received::Nothing));
    }

    #[test]
    fn test_session_end_makes_session_invalid_but_active() {
        let network = LoopbackNetwork::new();
        let mut host = manager(&network, "A");
        let mut client = manager(&network, "B");
        connect(&network, &mut host, &mut client);
        client.pump();
        while client.get_next_event().is_some() {}

        network.end_session(host.session_id().unwrap());
        client.pump();

        assert!(client.is_active());
        assert!(!client.is_valid());
        assert_eq!(
            client.get_next_event(),
            Some(SessionEvent::SessionEnded {
                reason: SessionEndReason::HostEndedSession
            })
        );

        let sent_before = network.packets_sent_by(&Gamertag::new("B"));
        assert!(client
            .send_to_host(&NetworkMessage::ReadyForNextQuestion { question_index: 1 })
            .is_err());
        assert_eq!(network.packets_sent_by(&Gamertag::new("B")), sent_before);

        client.shutdown_session();
        assert!(!client.is_active());
        assert!(!client.is_valid());
    }

    #[test]
    fn test_shutdown_respects_pending_invite() {
        let network = LoopbackNetwork::new();
        let mut alice = manager(&network, "A");
        alice.request_discovery_pause();
        while !alice.confirm_discovery_paused() {}

        alice.set_invite_pending(true);
        alice.shutdown_session();
        assert!(network.is_discovery_paused(&Gamertag::new("A")));

        alice.set_invite_pending(false);
        alice.shutdown_session();
        assert!(!network.is_discovery_paused(&Gamertag::new("A")));
    }
}
