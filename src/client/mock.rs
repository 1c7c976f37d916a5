//! In-memory transport and data channel for tests and simulation.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    client::transport::{ChannelFrame, DataChannel, PeerTransport, SdpKind, TransportEvent},
    error::{Result, ShareError},
    models::IceCandidate,
};

/// Every call the manager made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    CreateOffer(String),
    SetRemote(String, SdpKind, String),
    CreateAnswer(String),
    AddCandidate(String, IceCandidate),
    Close(String),
}

/// Fake RTC stack. Descriptions are synthetic strings, and each generated
/// description is followed by `candidates_per_description` local candidate
/// events.
pub struct MockTransport {
    local_id: String,
    calls: Mutex<Vec<TransportCall>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    candidates_per_description: usize,
    fail_remote_description: AtomicBool,
}

impl MockTransport {
    pub fn new(
        local_id: impl Into<String>,
        candidates_per_description: usize,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                local_id: local_id.into(),
                calls: Mutex::new(Vec::new()),
                events,
                candidates_per_description,
                fail_remote_description: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Candidates applied for `remote`, in application order.
    pub fn applied_candidates(&self, remote: &str) -> Vec<IceCandidate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::AddCandidate(r, c) if r == remote => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Reports `event` as if the RTC stack raised it, e.g. a channel opening.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Makes every following `set_remote_description` fail.
    pub fn fail_remote_descriptions(&self) {
        self.fail_remote_description.store(true, Ordering::Relaxed);
    }

    fn record(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn gather(&self, remote: &str, kind: &str) {
        for i in 0..self.candidates_per_description {
            let candidate = IceCandidate {
                candidate: format!("candidate:{kind}{i} 1 udp {} {} typ host", self.local_id, i),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            };
            let _ = self.events.send(TransportEvent::LocalCandidate {
                remote: remote.to_string(),
                candidate,
            });
        }
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self, remote: &str) -> Result<String> {
        self.record(TransportCall::CreateOffer(remote.to_string()));
        self.gather(remote, "offer");
        Ok(format!("offer:{}->{remote}", self.local_id))
    }

    async fn set_remote_description(&self, remote: &str, kind: SdpKind, sdp: &str) -> Result<()> {
        if self.fail_remote_description.load(Ordering::Relaxed) {
            return Err(ShareError::Transport("rejected remote description".into()));
        }
        self.record(TransportCall::SetRemote(
            remote.to_string(),
            kind,
            sdp.to_string(),
        ));
        Ok(())
    }

    async fn create_answer(&self, remote: &str) -> Result<String> {
        self.record(TransportCall::CreateAnswer(remote.to_string()));
        self.gather(remote, "answer");
        Ok(format!("answer:{}->{remote}", self.local_id))
    }

    async fn add_ice_candidate(&self, remote: &str, candidate: IceCandidate) -> Result<()> {
        self.record(TransportCall::AddCandidate(remote.to_string(), candidate));
        Ok(())
    }

    async fn close(&self, remote: &str) {
        self.record(TransportCall::Close(remote.to_string()));
    }
}

/// One end of an in-memory channel pair. Delivery is reliable and ordered.
pub struct MockDataChannel {
    tx: Mutex<Option<mpsc::Sender<ChannelFrame>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<ChannelFrame>>,
    open: AtomicBool,
}

impl MockDataChannel {
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(64);
        let (tx_b, rx_b) = mpsc::channel(64);

        let chan_a = Self {
            tx: Mutex::new(Some(tx_b)), // A sends to B's receiver
            rx: tokio::sync::Mutex::new(rx_a),
            open: AtomicBool::new(true),
        };
        let chan_b = Self {
            tx: Mutex::new(Some(tx_a)),
            rx: tokio::sync::Mutex::new(rx_b),
            open: AtomicBool::new(true),
        };
        (chan_a, chan_b)
    }

    fn sender(&self) -> Option<mpsc::Sender<ChannelFrame>> {
        self.tx.lock().ok().and_then(|tx| tx.clone())
    }
}

#[async_trait]
impl DataChannel for MockDataChannel {
    async fn send(&self, frame: ChannelFrame) -> Result<()> {
        let tx = self.sender().ok_or(ShareError::ChannelClosed)?;
        tx.send(frame).await.map_err(|_| ShareError::ChannelClosed)
    }

    async fn recv(&self) -> Option<ChannelFrame> {
        if !self.open.load(Ordering::Relaxed) {
            return None;
        }
        self.rx.lock().await.recv().await
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed) && self.sender().is_some_and(|tx| !tx.is_closed())
    }

    /// Stops sending; the peer sees the channel end once in-flight frames
    /// are drained.
    async fn close(&self) {
        self.open.store(false, Ordering::Relaxed);
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_pair_roundtrip() {
        let (a, b) = MockDataChannel::pair();
        a.send(ChannelFrame::Text("hello".into())).await.unwrap();
        a.send(ChannelFrame::Binary(vec![1, 2, 3])).await.unwrap();
        assert_eq!(b.recv().await, Some(ChannelFrame::Text("hello".into())));
        assert_eq!(b.recv().await, Some(ChannelFrame::Binary(vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn dropping_one_end_closes_the_other() {
        let (a, b) = MockDataChannel::pair();
        drop(a);
        assert_eq!(b.recv().await, None);
        assert!(!b.is_open());
        assert!(b.send(ChannelFrame::Text("x".into())).await.is_err());
    }

    #[tokio::test]
    async fn close_ends_peer_stream() {
        let (a, b) = MockDataChannel::pair();
        a.send(ChannelFrame::Binary(vec![9])).await.unwrap();
        a.close().await;
        assert!(!a.is_open());
        assert_eq!(b.recv().await, Some(ChannelFrame::Binary(vec![9])));
        assert_eq!(b.recv().await, None);
    }

    #[tokio::test]
    async fn transport_emits_candidates_after_descriptions() {
        let (transport, mut events) = MockTransport::new("local", 2);
        let offer = transport.create_offer("remote").await.unwrap();
        assert_eq!(offer, "offer:local->remote");

        for _ in 0..2 {
            assert!(matches!(
                events.recv().await,
                Some(TransportEvent::LocalCandidate { remote, .. }) if remote == "remote"
            ));
        }
        assert_eq!(
            transport.calls(),
            vec![TransportCall::CreateOffer("remote".into())]
        );
    }
}
