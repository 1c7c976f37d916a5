pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod server;

pub use config::Config;
pub use error::{Result, ShareError};
pub use server::SignalServer;

/// Port the signaling server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 3001;

/// Size of every binary frame of a file transfer except the last.
pub const CHUNK_SIZE: usize = 16 * 1024;
