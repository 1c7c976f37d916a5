use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ShareError;

/// Connection id assigned by the server when a client connects.
pub type SessionId = String;

/// Metadata a peer advertises for one of its files. There is no content hash
/// and no id: the name is the only handle, and `size` is whatever the owner
/// claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDescriptor {
    pub file_name: String,
    #[serde(default)]
    pub description: String,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(file_name: impl Into<String>, description: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            description: description.into(),
            size,
        }
    }

    /// Builds a descriptor from a file on disk. Without an explicit
    /// description the guessed mime type is used.
    pub fn from_path(path: &Path, description: Option<String>) -> crate::error::Result<Self> {
        let metadata = path.metadata()?;
        if !metadata.is_file() {
            return Err(ShareError::NotAFile);
        }

        let file_name = path
            .file_name()
            .ok_or(ShareError::NotAFile)?
            .to_string_lossy()
            .to_string();

        let description = description.unwrap_or_else(|| {
            mime_guess::from_path(path)
                .first()
                .map(|mime| mime.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string())
        });

        Ok(FileDescriptor {
            file_name,
            description,
            size: metadata.len(),
        })
    }

    /// Case-insensitive substring match on name and description. `needle`
    /// must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.file_name.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub username: String,
    pub owner_session_id: SessionId,
    pub matching_files: Vec<FileDescriptor>,
}

/// A single ICE candidate as produced by the local RTC stack. Opaque to
/// everything in this crate except for its ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}
