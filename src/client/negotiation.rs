//! Offer/answer/candidate handshake for one remote peer.
//!
//! [`NegotiationSession::step`] does no I/O: it takes an event, updates the
//! session, and returns the effects the caller has to carry out against the
//! transport and the relay. Results of those effects come back as further
//! events.
//!
//! ```text
//! initiator: Idle -> OfferCreated -> OfferSent ---------------\
//! responder: Idle -> OfferReceived -> AnswerCreated -> AnswerSent -> Connected
//! any state -> Closed
//! ```

use std::collections::VecDeque;

use crate::{
    client::transport::SdpKind,
    error::{Result, ShareError},
    models::{IceCandidate, SessionId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    Idle,
    OfferCreated,
    OfferSent,
    OfferReceived,
    AnswerCreated,
    AnswerSent,
    Connected,
    Closed,
}

impl NegotiationState {
    /// Waiting on the other side or on the transport to open the channel.
    pub fn is_pending(self) -> bool {
        !matches!(self, NegotiationState::Connected | NegotiationState::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationEvent {
    /// Local user wants to connect.
    Initiate,
    /// Transport produced our offer.
    LocalOffer { sdp: String },
    RemoteOffer { sdp: String },
    RemoteAnswer { sdp: String },
    /// Transport accepted the remote description from the last
    /// `ApplyRemoteDescription`.
    RemoteDescriptionApplied,
    /// Transport produced our answer.
    LocalAnswer { sdp: String },
    RemoteCandidate(IceCandidate),
    ChannelOpen,
    /// Explicit close, transport failure, or timeout.
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CreateOffer,
    SendOffer { sdp: String },
    ApplyRemoteDescription { kind: SdpKind, sdp: String },
    CreateAnswer,
    SendAnswer { sdp: String },
    AddCandidate(IceCandidate),
    CloseTransport,
}

#[derive(Debug)]
pub struct NegotiationSession {
    remote_id: SessionId,
    state: NegotiationState,
    has_remote_description: bool,
    pending_candidates: VecDeque<IceCandidate>,
}

impl NegotiationSession {
    pub fn new(remote_id: impl Into<SessionId>) -> Self {
        Self {
            remote_id: remote_id.into(),
            state: NegotiationState::Idle,
            has_remote_description: false,
            pending_candidates: VecDeque::new(),
        }
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Applies one event. An event that makes no sense in the current state
    /// is rejected and leaves the session untouched.
    pub fn step(&mut self, event: NegotiationEvent) -> Result<Vec<Effect>> {
        use NegotiationEvent as E;
        use NegotiationState as S;

        if self.state == S::Closed {
            // nothing moves once closed; late candidates are discarded here
            return Ok(Vec::new());
        }

        let effects = match (self.state, event) {
            (_, E::Close) => {
                self.state = S::Closed;
                self.pending_candidates.clear();
                vec![Effect::CloseTransport]
            }

            (_, E::RemoteCandidate(candidate)) => {
                if self.has_remote_description {
                    vec![Effect::AddCandidate(candidate)]
                } else {
                    self.pending_candidates.push_back(candidate);
                    Vec::new()
                }
            }

            (S::Idle, E::Initiate) => {
                self.state = S::OfferCreated;
                vec![Effect::CreateOffer]
            }
            (S::OfferCreated, E::LocalOffer { sdp }) => {
                self.state = S::OfferSent;
                vec![Effect::SendOffer { sdp }]
            }
            (S::OfferSent, E::RemoteAnswer { sdp }) if !self.has_remote_description => {
                vec![Effect::ApplyRemoteDescription {
                    kind: SdpKind::Answer,
                    sdp,
                }]
            }

            (S::Idle, E::RemoteOffer { sdp }) => {
                self.state = S::OfferReceived;
                vec![Effect::ApplyRemoteDescription {
                    kind: SdpKind::Offer,
                    sdp,
                }]
            }
            (S::OfferReceived, E::RemoteDescriptionApplied) => {
                self.state = S::AnswerCreated;
                let mut effects = self.flush_candidates();
                effects.push(Effect::CreateAnswer);
                effects
            }
            (S::OfferSent, E::RemoteDescriptionApplied) if !self.has_remote_description => {
                self.flush_candidates()
            }
            (S::AnswerCreated, E::LocalAnswer { sdp }) => {
                self.state = S::AnswerSent;
                vec![Effect::SendAnswer { sdp }]
            }
            (S::Connected, E::LocalAnswer { sdp }) => vec![Effect::SendAnswer { sdp }],

            // the RTC stack can open the channel before our own answer
            // is out, so any in-flight state may connect
            (
                S::OfferSent | S::OfferReceived | S::AnswerCreated | S::AnswerSent,
                E::ChannelOpen,
            ) => {
                self.state = S::Connected;
                Vec::new()
            }

            (state, event) => {
                return Err(ShareError::InvalidTransition(format!(
                    "{event:?} in {state:?} for {}",
                    self.remote_id
                )))
            }
        };

        Ok(effects)
    }

    /// Marks the remote description as present and releases every queued
    /// candidate in arrival order.
    fn flush_candidates(&mut self) -> Vec<Effect> {
        self.has_remote_description = true;
        self.pending_candidates
            .drain(..)
            .map(Effect::AddCandidate)
            .collect()
    }
}
