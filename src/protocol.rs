//! Typed messages for the signaling websocket and the direct peer channel.
//!
//! Every signaling frame is one JSON text message tagged by `type`, using the
//! event names the browser client already speaks (`publish_files`,
//! `ice-candidate`, ...). Direct-channel control frames use the same
//! encoding; file bytes travel as untagged binary frames.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{FileDescriptor, IceCandidate, SearchResult, SessionId};

/// Plain-text password as typed by the user. Only ever hashed, never shown.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Client → server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Register {
        username: String,
        password: Password,
    },
    Login {
        username: String,
        password: Password,
    },
    PublishFiles {
        files: Vec<FileDescriptor>,
    },
    Search {
        keyword: String,
    },
    Offer {
        target: SessionId,
        sdp: String,
    },
    Answer {
        target: SessionId,
        sdp: String,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        target: SessionId,
        candidate: IceCandidate,
    },
}

impl ClientMessage {
    /// Name used on the wire, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::Login { .. } => "login",
            ClientMessage::PublishFiles { .. } => "publish_files",
            ClientMessage::Search { .. } => "search",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
        }
    }
}

/// Server → client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        session_id: SessionId,
    },
    AuthSuccess {
        message: String,
    },
    AuthError {
        message: String,
    },
    LoginSuccess {
        username: String,
        session_id: SessionId,
    },
    SearchResults {
        results: Vec<SearchResult>,
    },
    FilesUpdated {
        username: String,
    },
    Offer {
        caller_id: SessionId,
        sdp: String,
    },
    Answer {
        responder_id: SessionId,
        sdp: String,
    },
    #[serde(rename = "ice-candidate")]
    IceCandidate {
        sender_id: SessionId,
        candidate: IceCandidate,
    },
    /// `request` names the kind of client message that failed, so a late
    /// rejection is not mistaken for the reply to a later request.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request: Option<String>,
    },
}

impl ServerMessage {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Control frames exchanged over an open peer channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ControlMessage {
    RequestFile { file_name: String },
    EndOfFile { file_name: String },
    FileNotFound { file_name: String },
}
