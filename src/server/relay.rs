use log::{debug, trace};

use crate::{
    models::SessionId,
    protocol::{ClientMessage, ServerMessage},
    server::registry::PeerRegistry,
};

/// Rewrites a signaling message for its target, naming the sender the way the
/// recipient expects (`callerId`, `responderId`, `senderId`). Returns `None`
/// for anything that is not signaling.
pub fn addressed(from: &str, msg: ClientMessage) -> Option<(SessionId, ServerMessage)> {
    let from = from.to_string();
    match msg {
        ClientMessage::Offer { target, sdp } => {
            Some((target, ServerMessage::Offer { caller_id: from, sdp }))
        }
        ClientMessage::Answer { target, sdp } => Some((
            target,
            ServerMessage::Answer {
                responder_id: from,
                sdp,
            },
        )),
        ClientMessage::IceCandidate { target, candidate } => Some((
            target,
            ServerMessage::IceCandidate {
                sender_id: from,
                candidate,
            },
        )),
        _ => None,
    }
}

/// Forwards a signaling message to its target. Unknown targets are dropped
/// without telling anyone; the caller finds out by timing out.
///
/// Returns whether the message was handed to the target's queue.
pub async fn forward(registry: &PeerRegistry, from: &str, msg: ClientMessage) -> bool {
    let kind = msg.kind();
    let Some((target, outbound)) = addressed(from, msg) else {
        return false;
    };

    let Some(tx) = registry.sender(&target).await else {
        debug!("dropping {kind} from {from}: {target} is not connected");
        return false;
    };

    match tx.send(outbound).await {
        Ok(()) => {
            trace!("relayed {kind} {from} -> {target}");
            true
        }
        Err(_) => {
            debug!("dropping {kind} from {from}: {target} went away");
            false
        }
    }
}
