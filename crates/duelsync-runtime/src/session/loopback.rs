//! In-memory loopback platform
//!
//! A single-process stand-in for the platform networking layer. Every
//! participant in a local simulation shares one hub; sessions, mailboxes and
//! discovery state live there. Operations complete after a configurable number
//! of polls, and faults (host ending the session, kicks, disconnects, failed
//! operations) can be injected from tests and the CLI.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use duelsync_core::{Gamertag, TransportError};
use tracing::{debug, info};
use uuid::Uuid;

use super::events::{SessionEndReason, SessionEvent};
use super::platform::{
    AvailableSession, BackgroundActivity, InboundPacket, OperationOutput, PendingOperation,
    PlatformSession, Recipient, SessionId, SessionPlatform,
};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Simulated latencies, in polls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackConfig {
    /// Polls before a create/find/join completes
    pub operation_latency_frames: u32,
    /// Polls before background discovery confirms it has paused
    pub pause_latency_frames: u32,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            operation_latency_frames: 1,
            pause_latency_frames: 1,
        }
    }
}

// ----------------------------------------------------------------------------
// Hub State
// ----------------------------------------------------------------------------

struct HubSession {
    id: SessionId,
    host: Gamertag,
    max_gamers: usize,
    gamers: Vec<Gamertag>,
    in_progress: bool,
}

#[derive(Default)]
struct Mailbox {
    packets: VecDeque<InboundPacket>,
    events: Vec<SessionEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiscoveryState {
    Running,
    Pausing(u32),
    Paused,
}

#[derive(Default)]
struct Hub {
    config: LoopbackConfig,
    sessions: Vec<HubSession>,
    mailboxes: HashMap<(SessionId, Gamertag), Mailbox>,
    invites: HashMap<Gamertag, SessionId>,
    discovery: HashMap<Gamertag, DiscoveryState>,
    sent: HashMap<Gamertag, usize>,
    injected_failures: VecDeque<TransportError>,
    /// Gamers whose next payload arrives cut down to its first byte
    truncate_next: HashSet<Gamertag>,
}

impl Hub {
    fn session(&self, id: SessionId) -> Option<&HubSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut HubSession> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    fn mailbox(&mut self, id: SessionId, gamer: &Gamertag) -> &mut Mailbox {
        self.mailboxes.entry((id, gamer.clone())).or_default()
    }

    fn notify(&mut self, id: SessionId, gamer: &Gamertag, event: SessionEvent) {
        self.mailbox(id, gamer).events.push(event);
    }

    fn notify_all(&mut self, id: SessionId, except: Option<&Gamertag>, event: SessionEvent) {
        let gamers = self.session(id).map(|s| s.gamers.clone()).unwrap_or_default();
        for gamer in gamers.iter().filter(|g| Some(*g) != except) {
            self.notify(id, gamer, event.clone());
        }
    }

    fn available(&self) -> Vec<AvailableSession> {
        self.sessions
            .iter()
            .map(|s| AvailableSession {
                id: s.id,
                host: s.host.clone(),
                open_slots: s.max_gamers.saturating_sub(s.gamers.len()),
                game_in_progress: s.in_progress,
            })
            .collect()
    }

    fn create(&mut self, local: &Gamertag, max_gamers: usize) -> SessionId {
        let id = Uuid::new_v4();
        info!(session = %id, host = %local, "loopback session created");
        self.sessions.push(HubSession {
            id,
            host: local.clone(),
            max_gamers,
            gamers: vec![local.clone()],
            in_progress: false,
        });
        self.notify(id, local, SessionEvent::GamerJoined { gamer: local.clone() });
        id
    }

    fn join(&mut self, local: &Gamertag, id: SessionId) -> Result<Gamertag, TransportError> {
        let session = self.session_mut(id).ok_or(TransportError::NoSessionAvailable)?;
        if session.gamers.contains(local) {
            return Ok(session.host.clone());
        }
        if session.gamers.len() >= session.max_gamers {
            return Err(TransportError::SessionFull {
                max: session.max_gamers,
            });
        }
        session.gamers.push(local.clone());
        let host = session.host.clone();
        let existing = session.gamers.clone();
        info!(session = %id, gamer = %local, "loopback gamer joined");

        self.notify_all(id, Some(local), SessionEvent::GamerJoined { gamer: local.clone() });
        for gamer in &existing {
            self.notify(id, local, SessionEvent::GamerJoined { gamer: gamer.clone() });
        }
        self.invites.remove(local);
        Ok(host)
    }

    /// Take `gamer` out of session `id`. `reason` is what the removed gamer
    /// is told; `None` means it left on its own.
    fn remove_gamer(&mut self, id: SessionId, gamer: &Gamertag, reason: Option<SessionEndReason>) {
        let Some(session) = self.session_mut(id) else {
            return;
        };
        if session.host == *gamer {
            self.end_session(id);
            if let Some(reason) = reason {
                self.notify(id, gamer, SessionEvent::SessionEnded { reason });
            }
            return;
        }
        session.gamers.retain(|g| g != gamer);
        self.notify_all(id, None, SessionEvent::GamerLeft { gamer: gamer.clone() });
        if let Some(reason) = reason {
            self.notify(id, gamer, SessionEvent::SessionEnded { reason });
        }
    }

    /// The host has ended the session for everyone else
    fn end_session(&mut self, id: SessionId) {
        let Some(index) = self.sessions.iter().position(|s| s.id == id) else {
            return;
        };
        let session = self.sessions.remove(index);
        info!(session = %id, "loopback session ended");
        for gamer in session.gamers.iter().filter(|g| **g != session.host) {
            self.notify(
                id,
                gamer,
                SessionEvent::SessionEnded {
                    reason: SessionEndReason::HostEndedSession,
                },
            );
        }
    }

    fn deliver(
        &mut self,
        id: SessionId,
        from: &Gamertag,
        recipient: &Recipient,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let session = self.session(id).ok_or(TransportError::SessionEnded)?;
        if !session.gamers.contains(from) {
            return Err(TransportError::SessionEnded);
        }
        let targets = match recipient {
            Recipient::All => session.gamers.clone(),
            Recipient::Host => vec![session.host.clone()],
            Recipient::Gamer(gamer) if session.gamers.contains(gamer) => vec![gamer.clone()],
            Recipient::Gamer(gamer) => {
                return Err(TransportError::GamerNotFound {
                    gamertag: gamer.to_string(),
                })
            }
        };
        let from_host = session.host == *from;
        let payload = if self.truncate_next.remove(from) {
            debug!(%from, "truncating payload");
            &payload[..payload.len().min(1)]
        } else {
            payload
        };

        for target in &targets {
            self.mailbox(id, target).packets.push_back(InboundPacket {
                sender: from.clone(),
                from_host,
                payload: payload.to_vec(),
            });
        }
        *self.sent.entry(from.clone()).or_default() += 1;
        Ok(())
    }

    fn sessions_of(&self, gamer: &Gamertag) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|s| s.gamers.contains(gamer))
            .map(|s| s.id)
            .collect()
    }
}

// ----------------------------------------------------------------------------
// Loopback Network
// ----------------------------------------------------------------------------

/// Shared in-memory network all local participants connect through
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LoopbackConfig) -> Self {
        let network = Self::default();
        network.hub.borrow_mut().config = config;
        network
    }

    /// Platform entry point for one participant
    pub fn platform(&self) -> LoopbackPlatform {
        LoopbackPlatform {
            hub: Rc::clone(&self.hub),
        }
    }

    /// Background discovery for one participant
    pub fn discovery(&self, gamer: impl Into<Gamertag>) -> LoopbackDiscovery {
        let gamer = gamer.into();
        self.hub
            .borrow_mut()
            .discovery
            .insert(gamer.clone(), DiscoveryState::Running);
        LoopbackDiscovery {
            hub: Rc::clone(&self.hub),
            gamer,
        }
    }

    /// Create a session synchronously, bypassing operation latency
    pub fn create_now(
        &self,
        local: &Gamertag,
        max_gamers: usize,
    ) -> Result<Box<dyn PlatformSession>, TransportError> {
        let id = self.hub.borrow_mut().create(local, max_gamers);
        Ok(Box::new(LoopbackSession::new(&self.hub, id, local.clone(), local.clone())))
    }

    /// Join a session synchronously, bypassing operation latency
    pub fn join_now(
        &self,
        local: &Gamertag,
        id: SessionId,
    ) -> Result<Box<dyn PlatformSession>, TransportError> {
        let host = self.hub.borrow_mut().join(local, id)?;
        Ok(Box::new(LoopbackSession::new(&self.hub, id, local.clone(), host)))
    }

    pub fn sessions(&self) -> Vec<AvailableSession> {
        self.hub.borrow().available()
    }

    pub fn gamers_in(&self, id: SessionId) -> Vec<Gamertag> {
        self.hub
            .borrow()
            .session(id)
            .map(|s| s.gamers.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------------
    // Fault Injection
    // ------------------------------------------------------------------------

    /// The host ends the session; every other gamer sees `HostEndedSession`
    pub fn end_session(&self, id: SessionId) {
        self.hub.borrow_mut().end_session(id);
    }

    /// The host removes a gamer
    pub fn kick(&self, id: SessionId, gamer: &Gamertag) {
        self.hub
            .borrow_mut()
            .remove_gamer(id, gamer, Some(SessionEndReason::RemovedByHost));
    }

    /// A gamer loses its connection
    pub fn disconnect(&self, gamer: &Gamertag) {
        self.drop_gamer(gamer, SessionEndReason::Disconnected);
    }

    /// A gamer signs out of the platform
    pub fn sign_out(&self, gamer: &Gamertag) {
        self.drop_gamer(gamer, SessionEndReason::ClientSignedOut);
    }

    fn drop_gamer(&self, gamer: &Gamertag, reason: SessionEndReason) {
        let mut hub = self.hub.borrow_mut();
        for id in hub.sessions_of(gamer) {
            hub.remove_gamer(id, gamer, Some(reason));
        }
    }

    pub fn send_invite(&self, to: &Gamertag, id: SessionId) {
        self.hub.borrow_mut().invites.insert(to.clone(), id);
    }

    /// The next platform operation to complete fails with `error`
    pub fn fail_next_operation(&self, error: TransportError) {
        self.hub.borrow_mut().injected_failures.push_back(error);
    }

    /// The next payload `gamer` sends reaches every recipient truncated
    pub fn truncate_next_packet(&self, gamer: &Gamertag) {
        self.hub.borrow_mut().truncate_next.insert(gamer.clone());
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Outbound payloads a gamer has handed to the network
    pub fn packets_sent_by(&self, gamer: &Gamertag) -> usize {
        self.hub.borrow().sent.get(gamer).copied().unwrap_or(0)
    }

    pub fn is_discovery_paused(&self, gamer: &Gamertag) -> bool {
        self.hub.borrow().discovery.get(gamer) == Some(&DiscoveryState::Paused)
    }

    pub fn is_discovery_pause_requested(&self, gamer: &Gamertag) -> bool {
        !matches!(
            self.hub.borrow().discovery.get(gamer),
            None | Some(DiscoveryState::Running)
        )
    }
}

// ----------------------------------------------------------------------------
// Platform
// ----------------------------------------------------------------------------

/// One participant's view of the loopback platform
pub struct LoopbackPlatform {
    hub: Rc<RefCell<Hub>>,
}

impl LoopbackPlatform {
    fn operation(&self, request: Request) -> Box<dyn PendingOperation> {
        let latency = self.hub.borrow().config.operation_latency_frames;
        Box::new(LoopbackOperation {
            hub: Rc::clone(&self.hub),
            request,
            polls_left: latency,
        })
    }
}

impl SessionPlatform for LoopbackPlatform {
    fn begin_create(
        &mut self,
        local: &Gamertag,
        max_gamers: usize,
    ) -> Result<Box<dyn PendingOperation>, TransportError> {
        Ok(self.operation(Request::Create {
            local: local.clone(),
            max_gamers,
        }))
    }

    fn begin_find(&mut self, _local: &Gamertag) -> Result<Box<dyn PendingOperation>, TransportError> {
        Ok(self.operation(Request::Find))
    }

    fn begin_join(
        &mut self,
        local: &Gamertag,
        session: SessionId,
    ) -> Result<Box<dyn PendingOperation>, TransportError> {
        Ok(self.operation(Request::Join {
            local: local.clone(),
            session: Some(session),
        }))
    }

    fn begin_join_invited(
        &mut self,
        local: &Gamertag,
    ) -> Result<Box<dyn PendingOperation>, TransportError> {
        Ok(self.operation(Request::Join {
            local: local.clone(),
            session: None,
        }))
    }
}

enum Request {
    Create { local: Gamertag, max_gamers: usize },
    Find,
    /// `None` joins whatever the local gamer was invited to
    Join {
        local: Gamertag,
        session: Option<SessionId>,
    },
}

struct LoopbackOperation {
    hub: Rc<RefCell<Hub>>,
    request: Request,
    polls_left: u32,
}

impl PendingOperation for LoopbackOperation {
    fn poll(&mut self) -> Option<Result<OperationOutput, TransportError>> {
        if self.polls_left > 0 {
            self.polls_left -= 1;
            return None;
        }

        let mut hub = self.hub.borrow_mut();
        if let Some(error) = hub.injected_failures.pop_front() {
            return Some(Err(error));
        }

        let result = match &self.request {
            Request::Create { local, max_gamers } => {
                let id = hub.create(local, *max_gamers);
                Ok((id, local.clone(), local.clone()))
            }
            Request::Find => return Some(Ok(OperationOutput::Found(hub.available()))),
            Request::Join { local, session } => {
                let target = session.or_else(|| hub.invites.get(local).copied());
                match target {
                    Some(id) => hub.join(local, id).map(|host| (id, local.clone(), host)),
                    None => Err(TransportError::NoSessionAvailable),
                }
            }
        };
        drop(hub);

        Some(result.map(|(id, local, host)| {
            let session = LoopbackSession::new(&self.hub, id, local, host);
            OperationOutput::Session(Box::new(session))
        }))
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

/// A participant's handle on a loopback session
pub struct LoopbackSession {
    hub: Rc<RefCell<Hub>>,
    id: SessionId,
    local: Gamertag,
    host: Gamertag,
    disposed: bool,
}

impl LoopbackSession {
    fn new(hub: &Rc<RefCell<Hub>>, id: SessionId, local: Gamertag, host: Gamertag) -> Self {
        Self {
            hub: Rc::clone(hub),
            id,
            local,
            host,
            disposed: false,
        }
    }

    fn set_in_progress(&mut self, in_progress: bool) -> Result<(), TransportError> {
        if self.disposed {
            return Err(TransportError::NoSession);
        }
        if self.local != self.host {
            return Err(TransportError::OperationFailed {
                operation: "start_game".to_string(),
                reason: "only the host controls the game state".to_string(),
            });
        }
        let mut hub = self.hub.borrow_mut();
        let session = hub.session_mut(self.id).ok_or(TransportError::SessionEnded)?;
        session.in_progress = in_progress;
        let event = if in_progress {
            SessionEvent::GameStarted
        } else {
            SessionEvent::GameEnded
        };
        hub.notify_all(self.id, None, event);
        Ok(())
    }
}

impl PlatformSession for LoopbackSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn local_gamer(&self) -> &Gamertag {
        &self.local
    }

    fn host(&self) -> Gamertag {
        self.host.clone()
    }

    fn gamers(&self) -> Vec<Gamertag> {
        self.hub
            .borrow()
            .session(self.id)
            .map(|s| s.gamers.clone())
            .unwrap_or_default()
    }

    fn is_game_in_progress(&self) -> bool {
        self.hub
            .borrow()
            .session(self.id)
            .map(|s| s.in_progress)
            .unwrap_or(false)
    }

    fn send(&mut self, recipient: &Recipient, payload: &[u8]) -> Result<(), TransportError> {
        if self.disposed {
            return Err(TransportError::NoSession);
        }
        self.hub
            .borrow_mut()
            .deliver(self.id, &self.local, recipient, payload)
    }

    fn receive(&mut self) -> Option<InboundPacket> {
        if self.disposed {
            return None;
        }
        self.hub
            .borrow_mut()
            .mailbox(self.id, &self.local)
            .packets
            .pop_front()
    }

    fn poll_events(&mut self) -> Vec<SessionEvent> {
        if self.disposed {
            return Vec::new();
        }
        std::mem::take(&mut self.hub.borrow_mut().mailbox(self.id, &self.local).events)
    }

    fn start_game(&mut self) -> Result<(), TransportError> {
        self.set_in_progress(true)
    }

    fn end_game(&mut self) -> Result<(), TransportError> {
        self.set_in_progress(false)
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        let mut hub = self.hub.borrow_mut();
        hub.remove_gamer(self.id, &self.local, None);
        hub.mailboxes.remove(&(self.id, self.local.clone()));
        debug!(session = %self.id, gamer = %self.local, "loopback session disposed");
    }
}

// ----------------------------------------------------------------------------
// Discovery
// ----------------------------------------------------------------------------

/// Simulated peer discovery that takes a few polls to pause
pub struct LoopbackDiscovery {
    hub: Rc<RefCell<Hub>>,
    gamer: Gamertag,
}

impl BackgroundActivity for LoopbackDiscovery {
    fn request_pause(&mut self) {
        let mut hub = self.hub.borrow_mut();
        let latency = hub.config.pause_latency_frames;
        let state = hub
            .discovery
            .entry(self.gamer.clone())
            .or_insert(DiscoveryState::Running);
        if *state == DiscoveryState::Running {
            *state = DiscoveryState::Pausing(latency);
        }
    }

    fn confirm_paused(&mut self) -> bool {
        let mut hub = self.hub.borrow_mut();
        let state = hub
            .discovery
            .entry(self.gamer.clone())
            .or_insert(DiscoveryState::Running);
        match *state {
            DiscoveryState::Running => false,
            DiscoveryState::Paused => true,
            DiscoveryState::Pausing(0) => {
                *state = DiscoveryState::Paused;
                true
            }
            DiscoveryState::Pausing(left) => {
                *state = DiscoveryState::Pausing(left - 1);
                false
            }
        }
    }

    fn resume(&mut self) {
        self.hub
            .borrow_mut()
            .discovery
            .insert(self.gamer.clone(), DiscoveryState::Running);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> Gamertag {
        Gamertag::new(name)
    }

    fn drain_events(session: &mut Box<dyn PlatformSession>) -> Vec<SessionEvent> {
        session.poll_events()
    }

    #[test]
    fn test_join_notifies_both_sides() {
        let network = LoopbackNetwork::new();
        let mut host = network.create_now(&tag("A"), 4).unwrap();
        let mut client = network.join_now(&tag("B"), host.id()).unwrap();

        assert_eq!(
            drain_events(&mut host),
            vec![
                SessionEvent::GamerJoined { gamer: tag("A") },
                SessionEvent::GamerJoined { gamer: tag("B") },
            ]
        );
        assert_eq!(
            drain_events(&mut client),
            vec![
                SessionEvent::GamerJoined { gamer: tag("A") },
                SessionEvent::GamerJoined { gamer: tag("B") },
            ]
        );
        assert_eq!(client.host(), tag("A"));
        assert!(!client.is_host());
    }

    #[test]
    fn test_full_session_rejects_join() {
        let network = LoopbackNetwork::new();
        let host = network.create_now(&tag("A"), 2).unwrap();
        network.join_now(&tag("B"), host.id()).unwrap();
        assert!(matches!(
            network.join_now(&tag("C"), host.id()),
            Err(TransportError::SessionFull { max: 2 })
        ));
    }

    #[test]
    fn test_broadcast_loops_back_to_sender() {
        let network = LoopbackNetwork::new();
        let mut host = network.create_now(&tag("A"), 4).unwrap();
        let mut client = network.join_now(&tag("B"), host.id()).unwrap();

        host.send(&Recipient::All, b"hi").unwrap();
        let own = host.receive().unwrap();
        assert!(own.from_host);
        assert_eq!(own.sender, tag("A"));
        assert_eq!(client.receive().unwrap().payload, b"hi".to_vec());
        assert_eq!(network.packets_sent_by(&tag("A")), 1);
    }

    #[test]
    fn test_kick_ends_session_for_kicked_gamer_only() {
        let network = LoopbackNetwork::new();
        let mut host = network.create_now(&tag("A"), 4).unwrap();
        let mut client = network.join_now(&tag("B"), host.id()).unwrap();
        drain_events(&mut host);
        drain_events(&mut client);

        network.kick(host.id(), &tag("B"));

        assert_eq!(
            drain_events(&mut client),
            vec![SessionEvent::SessionEnded {
                reason: SessionEndReason::RemovedByHost
            }]
        );
        assert_eq!(
            drain_events(&mut host),
            vec![SessionEvent::GamerLeft { gamer: tag("B") }]
        );
        assert!(client.send(&Recipient::Host, b"x").is_err());
    }

    #[test]
    fn test_host_dispose_ends_session_for_clients() {
        let network = LoopbackNetwork::new();
        let mut host = network.create_now(&tag("A"), 4).unwrap();
        let mut client = network.join_now(&tag("B"), host.id()).unwrap();
        drain_events(&mut client);

        host.dispose();

        assert_eq!(
            drain_events(&mut client),
            vec![SessionEvent::SessionEnded {
                reason: SessionEndReason::HostEndedSession
            }]
        );
        assert!(network.sessions().is_empty());
    }

    #[test]
    fn test_invited_join() {
        let network = LoopbackNetwork::with_config(LoopbackConfig {
            operation_latency_frames: 0,
            pause_latency_frames: 0,
        });
        let host = network.create_now(&tag("A"), 4).unwrap();
        network.send_invite(&tag("B"), host.id());

        let mut platform = network.platform();
        let mut operation = platform.begin_join_invited(&tag("B")).unwrap();
        match operation.poll() {
            Some(Ok(OperationOutput::Session(session))) => assert_eq!(session.id(), host.id()),
            _ => panic!("invited join should complete immediately"),
        }
        assert_eq!(network.gamers_in(host.id()), vec![tag("A"), tag("B")]);
    }
}
