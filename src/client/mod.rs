pub mod library;
pub mod manager;
pub mod mock;
pub mod negotiation;
pub mod signaling;
pub mod transfer;
pub mod transport;

pub use library::FileLibrary;
pub use manager::{ConnectionManager, PeerUpdate};
pub use negotiation::{NegotiationSession, NegotiationState};
pub use signaling::SignalingClient;
pub use transport::{ChannelFrame, DataChannel, PeerTransport, TransportEvent};
