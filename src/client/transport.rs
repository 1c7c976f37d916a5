//! Seam between this crate and the local RTC stack.
//!
//! Description generation, candidate gathering and the data channel itself
//! live outside the crate (a browser, or an RTC library). The negotiation
//! and transfer logic only talk to these traits, so the same code runs
//! against the in-memory implementations in [`mock`](super::mock).

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{IceCandidate, SessionId},
};

/// Which half of the offer/answer exchange a description is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// One message on an open peer channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Reliable, ordered, message-oriented channel to a single peer.
#[async_trait]
pub trait DataChannel: Send + Sync {
    async fn send(&self, frame: ChannelFrame) -> Result<()>;

    /// Next frame, or `None` once the channel is closed.
    async fn recv(&self) -> Option<ChannelFrame>;

    fn is_open(&self) -> bool;

    async fn close(&self);
}

/// Local RTC stack, addressed per remote peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Generates and sets the local offer for `remote`.
    async fn create_offer(&self, remote: &str) -> Result<String>;

    async fn set_remote_description(&self, remote: &str, kind: SdpKind, sdp: &str) -> Result<()>;

    /// Generates and sets the local answer; the remote offer must already be
    /// applied.
    async fn create_answer(&self, remote: &str) -> Result<String>;

    async fn add_ice_candidate(&self, remote: &str, candidate: IceCandidate) -> Result<()>;

    /// Tears down whatever exists for `remote`.
    async fn close(&self, remote: &str);
}

/// Things the RTC stack reports on its own schedule.
#[derive(Clone)]
pub enum TransportEvent {
    LocalCandidate {
        remote: SessionId,
        candidate: IceCandidate,
    },
    ChannelOpen {
        remote: SessionId,
        channel: Arc<dyn DataChannel>,
    },
    /// Connection failed, disconnected, or the channel closed.
    Closed { remote: SessionId },
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::LocalCandidate { remote, candidate } => f
                .debug_struct("LocalCandidate")
                .field("remote", remote)
                .field("candidate", candidate)
                .finish(),
            TransportEvent::ChannelOpen { remote, .. } => {
                f.debug_struct("ChannelOpen").field("remote", remote).finish()
            }
            TransportEvent::Closed { remote } => {
                f.debug_struct("Closed").field("remote", remote).finish()
            }
        }
    }
}

#[async_trait]
impl<T: DataChannel + ?Sized> DataChannel for Arc<T> {
    async fn send(&self, frame: ChannelFrame) -> Result<()> {
        (**self).send(frame).await
    }

    async fn recv(&self) -> Option<ChannelFrame> {
        (**self).recv().await
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn close(&self) {
        (**self).close().await
    }
}
