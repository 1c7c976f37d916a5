use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, Mutex};

use crate::{
    client::{
        negotiation::{Effect, NegotiationEvent, NegotiationSession, NegotiationState},
        transport::{DataChannel, PeerTransport, SdpKind, TransportEvent},
    },
    error::{Result, ShareError},
    models::SessionId,
    protocol::{ClientMessage, ServerMessage},
};

/// What the application hears about a peer after feeding the manager a
/// transport event.
#[derive(Clone)]
pub enum PeerUpdate {
    Connected {
        remote: SessionId,
        channel: Arc<dyn DataChannel>,
    },
    Closed {
        remote: SessionId,
    },
}

impl std::fmt::Debug for PeerUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerUpdate::Connected { remote, .. } => {
                f.debug_struct("Connected").field("remote", remote).finish()
            }
            PeerUpdate::Closed { remote } => {
                f.debug_struct("Closed").field("remote", remote).finish()
            }
        }
    }
}

struct PeerEntry {
    negotiation: NegotiationSession,
    started: Instant,
    closed_at: Option<Instant>,
    channel: Option<Arc<dyn DataChannel>>,
}

impl PeerEntry {
    fn new(remote: &str) -> Self {
        Self {
            negotiation: NegotiationSession::new(remote),
            started: Instant::now(),
            closed_at: None,
            channel: None,
        }
    }

    fn is_closed(&self) -> bool {
        self.negotiation.state() == NegotiationState::Closed
    }
}

/// Owns every negotiation of one local client, keyed by remote session id.
///
/// Inbound signaling and transport events are fed in through
/// [`handle_server_message`](Self::handle_server_message) and
/// [`handle_transport_event`](Self::handle_transport_event); the resulting
/// effects are carried out against the transport and the outbound signaling
/// queue before the call returns.
#[derive(Clone)]
pub struct ConnectionManager {
    transport: Arc<dyn PeerTransport>,
    signaling: mpsc::Sender<ClientMessage>,
    peers: Arc<Mutex<HashMap<SessionId, PeerEntry>>>,
    negotiation_timeout: Duration,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        signaling: mpsc::Sender<ClientMessage>,
        negotiation_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            signaling,
            peers: Arc::new(Mutex::new(HashMap::new())),
            negotiation_timeout,
        }
    }

    /// Starts a negotiation toward `remote` and sends the offer.
    pub async fn connect(&self, remote: &str) -> Result<()> {
        let mut peers = self.peers.lock().await;
        if peers.get(remote).is_some_and(|entry| !entry.is_closed()) {
            return Err(ShareError::DuplicateNegotiation(remote.to_string()));
        }

        info!("Connecting to {remote}");
        peers.insert(remote.to_string(), PeerEntry::new(remote));
        match peers.get_mut(remote) {
            Some(entry) => self.drive(entry, NegotiationEvent::Initiate).await,
            None => Err(ShareError::UnknownPeer(remote.to_string())),
        }
    }

    /// Routes a relayed `offer`, `answer` or `ice-candidate`. Returns false
    /// for any other message so the caller can handle it.
    pub async fn handle_server_message(&self, msg: ServerMessage) -> bool {
        let (remote, event) = match msg {
            ServerMessage::Offer { caller_id, sdp } => {
                (caller_id, NegotiationEvent::RemoteOffer { sdp })
            }
            ServerMessage::Answer { responder_id, sdp } => {
                (responder_id, NegotiationEvent::RemoteAnswer { sdp })
            }
            ServerMessage::IceCandidate {
                sender_id,
                candidate,
            } => (sender_id, NegotiationEvent::RemoteCandidate(candidate)),
            _ => return false,
        };

        let mut peers = self.peers.lock().await;
        let existing = peers.get(&remote).map(|entry| entry.negotiation.state());
        match (&event, existing) {
            (NegotiationEvent::RemoteOffer { .. }, Some(NegotiationState::Closed)) => {
                // a fresh attempt from a peer we gave up on
                peers.insert(remote.clone(), PeerEntry::new(&remote));
            }
            (NegotiationEvent::RemoteOffer { .. }, Some(state)) if state != NegotiationState::Idle => {
                warn!("Ignoring offer from {remote}: negotiation already in {state:?}");
                return true;
            }
            (NegotiationEvent::RemoteAnswer { .. }, None) => {
                debug!("Dropping answer from {remote}: no negotiation");
                return true;
            }
            (_, None) => {
                // offers and early candidates open a session
                peers.insert(remote.clone(), PeerEntry::new(&remote));
            }
            _ => {}
        }

        if let Some(entry) = peers.get_mut(&remote) {
            if let Err(e) = self.drive(entry, event).await {
                warn!("Signaling from {remote} rejected: {e}");
            }
        }
        true
    }

    /// Applies a transport event. Local candidates are relayed to the remote
    /// side; channel open and close are reported back.
    pub async fn handle_transport_event(&self, event: TransportEvent) -> Result<Option<PeerUpdate>> {
        match event {
            TransportEvent::LocalCandidate { remote, candidate } => {
                let peers = self.peers.lock().await;
                if peers.get(&remote).map_or(true, PeerEntry::is_closed) {
                    trace!("Dropping local candidate for {remote}");
                    return Ok(None);
                }
                drop(peers);
                self.signal(ClientMessage::IceCandidate {
                    target: remote,
                    candidate,
                })
                .await?;
                Ok(None)
            }
            TransportEvent::ChannelOpen { remote, channel } => {
                let mut peers = self.peers.lock().await;
                let Some(entry) = peers.get_mut(&remote) else {
                    warn!("Channel opened for unknown peer {remote}");
                    channel.close().await;
                    return Ok(None);
                };
                match self.drive(entry, NegotiationEvent::ChannelOpen).await {
                    Ok(()) if entry.negotiation.state() == NegotiationState::Connected => {
                        info!("Connected to {remote}");
                        entry.channel = Some(channel.clone());
                        Ok(Some(PeerUpdate::Connected { remote, channel }))
                    }
                    Ok(()) => {
                        channel.close().await;
                        Ok(None)
                    }
                    Err(e) => {
                        warn!("Channel open for {remote} out of order: {e}");
                        channel.close().await;
                        Ok(None)
                    }
                }
            }
            TransportEvent::Closed { remote } => {
                if self.close(&remote).await? {
                    Ok(Some(PeerUpdate::Closed { remote }))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Closes the negotiation with `remote`. Returns whether anything was
    /// open.
    pub async fn close(&self, remote: &str) -> Result<bool> {
        let mut peers = self.peers.lock().await;
        match peers.get_mut(remote) {
            Some(entry) if !entry.is_closed() => {
                self.drive(entry, NegotiationEvent::Close).await?;
                info!("Closed connection with {remote}");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Closes every negotiation that has been pending longer than the
    /// negotiation timeout and returns their remote ids. Sessions that have
    /// been closed for a full timeout are forgotten.
    pub async fn expire_stale(&self, now: Instant) -> Vec<SessionId> {
        let mut peers = self.peers.lock().await;
        let timeout = self.negotiation_timeout;
        peers.retain(|remote, entry| {
            let forget = entry
                .closed_at
                .is_some_and(|at| now.saturating_duration_since(at) >= timeout);
            if forget {
                trace!("Forgetting closed session {remote}");
            }
            !forget
        });

        let mut expired = Vec::new();
        for (remote, entry) in peers.iter_mut() {
            let pending = entry.negotiation.state().is_pending();
            if pending && now.saturating_duration_since(entry.started) >= self.negotiation_timeout {
                warn!(
                    "Negotiation with {remote} timed out in {:?}",
                    entry.negotiation.state()
                );
                if let Err(e) = self.drive(entry, NegotiationEvent::Close).await {
                    warn!("Could not close {remote}: {e}");
                }
                entry.closed_at = Some(now);
                expired.push(remote.clone());
            }
        }
        expired
    }

    pub async fn state(&self, remote: &str) -> Option<NegotiationState> {
        self.peers
            .lock()
            .await
            .get(remote)
            .map(|entry| entry.negotiation.state())
    }

    pub async fn channel(&self, remote: &str) -> Option<Arc<dyn DataChannel>> {
        self.peers
            .lock()
            .await
            .get(remote)
            .and_then(|entry| entry.channel.clone())
    }

    /// Steps the state machine and performs its effects until no follow-up
    /// event is left. A failing transport call closes the session.
    async fn drive(&self, entry: &mut PeerEntry, event: NegotiationEvent) -> Result<()> {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let effects = entry.negotiation.step(event)?;
            for effect in effects {
                match self.perform(entry, effect).await {
                    Ok(Some(next)) => queue.push_back(next),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            "Negotiation with {} failed: {e}",
                            entry.negotiation.remote_id()
                        );
                        queue.clear();
                        queue.push_back(NegotiationEvent::Close);
                        break;
                    }
                }
            }
        }
        if entry.is_closed() && entry.closed_at.is_none() {
            entry.closed_at = Some(Instant::now());
        }
        Ok(())
    }

    async fn perform(&self, entry: &mut PeerEntry, effect: Effect) -> Result<Option<NegotiationEvent>> {
        let remote = entry.negotiation.remote_id().to_string();
        trace!("{remote}: {effect:?}");
        let next = match effect {
            Effect::CreateOffer => {
                let sdp = self.transport.create_offer(&remote).await?;
                Some(NegotiationEvent::LocalOffer { sdp })
            }
            Effect::SendOffer { sdp } => {
                self.signal(ClientMessage::Offer { target: remote, sdp })
                    .await?;
                None
            }
            Effect::ApplyRemoteDescription { kind, sdp } => {
                self.transport
                    .set_remote_description(&remote, kind, &sdp)
                    .await?;
                debug!(
                    "Applied remote {} from {remote}",
                    if kind == SdpKind::Offer { "offer" } else { "answer" }
                );
                Some(NegotiationEvent::RemoteDescriptionApplied)
            }
            Effect::CreateAnswer => {
                let sdp = self.transport.create_answer(&remote).await?;
                Some(NegotiationEvent::LocalAnswer { sdp })
            }
            Effect::SendAnswer { sdp } => {
                self.signal(ClientMessage::Answer { target: remote, sdp })
                    .await?;
                None
            }
            Effect::AddCandidate(candidate) => {
                self.transport.add_ice_candidate(&remote, candidate).await?;
                None
            }
            Effect::CloseTransport => {
                if let Some(channel) = entry.channel.take() {
                    channel.close().await;
                }
                self.transport.close(&remote).await;
                None
            }
        };
        Ok(next)
    }

    async fn signal(&self, msg: ClientMessage) -> Result<()> {
        self.signaling
            .send(msg)
            .await
            .map_err(|_| ShareError::ChannelClosed)
    }
}
