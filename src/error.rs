#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Async join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("User already exists, try logging in")]
    UserExists,

    #[error("User not found, register first")]
    UserNotFound,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("A negotiation with {0} is already in progress")]
    DuplicateNegotiation(String),

    #[error("Unknown peer {0}")]
    UnknownPeer(String),

    #[error("Invalid negotiation transition: {0}")]
    InvalidTransition(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Transfer aborted")]
    TransferAborted,

    #[error("A transfer is already running on this channel")]
    TransferInProgress,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected message from server")]
    UnexpectedMessage,

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Server rejected request: {0}")]
    ServerError(String),

    #[error("Not a file")]
    NotAFile,

    #[error("Error: could not get $HOME value")]
    NoHomeDir,

    #[error("Could not serialize config")]
    ConfigSerializationFail(#[from] toml::ser::Error),

    #[error("Could not parse config file")]
    ConfigParseError(#[from] Box<figment::Error>),
}

impl From<tokio_tungstenite::tungstenite::Error> for ShareError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocketError(Box::new(e))
    }
}

impl ShareError {
    /// Whether this error belongs to the authentication family reported back
    /// to the originating client as `auth_error`.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ShareError::UserExists | ShareError::UserNotFound | ShareError::WrongPassword
        )
    }
}

pub type Result<T> = std::result::Result<T, ShareError>;
