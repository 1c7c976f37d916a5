//! File transfer over an open peer channel.
//!
//! The owner streams a requested file as binary frames of [`CHUNK_SIZE`]
//! bytes (the last one shorter) followed by an `end_of_file` control frame.
//! Frames carry no sequence numbers; the channel's ordered delivery is what
//! keeps the chunks in file order.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use log::{debug, info, warn};
use tokio::{
    fs::File,
    io::AsyncReadExt,
    sync::{watch, Mutex},
};

use crate::{
    client::{
        library::FileLibrary,
        transport::{ChannelFrame, DataChannel},
    },
    error::{Result, ShareError},
    models::FileDescriptor,
    protocol::ControlMessage,
    CHUNK_SIZE,
};

async fn send_control(channel: &dyn DataChannel, msg: &ControlMessage) -> Result<()> {
    let text = serde_json::to_string(msg)?;
    channel.send(ChannelFrame::Text(text)).await
}

/// Streams an in-memory file.
pub async fn send_bytes(channel: &dyn DataChannel, file_name: &str, bytes: &[u8]) -> Result<()> {
    for chunk in bytes.chunks(CHUNK_SIZE) {
        channel.send(ChannelFrame::Binary(chunk.to_vec())).await?;
    }
    send_control(
        channel,
        &ControlMessage::EndOfFile {
            file_name: file_name.to_string(),
        },
    )
    .await
}

/// Streams a file from disk without loading it whole.
pub async fn send_path(channel: &dyn DataChannel, file_name: &str, path: &Path) -> Result<()> {
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = read_chunk(&mut file, &mut buf).await?;
        if n == 0 {
            break;
        }
        channel.send(ChannelFrame::Binary(buf[..n].to_vec())).await?;
        sent += n as u64;
    }
    debug!("Sent {sent} bytes of {file_name}");
    send_control(
        channel,
        &ControlMessage::EndOfFile {
            file_name: file_name.to_string(),
        },
    )
    .await
}

/// Fills `buf` unless the file ends first, so only the final chunk is short.
async fn read_chunk(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Owner side: answers `request_file` frames from `library` until the
/// channel closes. Unknown names get a `file_not_found` reply.
pub async fn serve_file_requests(channel: &dyn DataChannel, library: &FileLibrary) -> Result<()> {
    while let Some(frame) = channel.recv().await {
        let ChannelFrame::Text(text) = frame else {
            debug!("Ignoring binary frame on the serving side");
            continue;
        };
        let file_name = match serde_json::from_str::<ControlMessage>(&text) {
            Ok(ControlMessage::RequestFile { file_name }) => file_name,
            Ok(other) => {
                debug!("Ignoring control message {other:?}");
                continue;
            }
            Err(e) => {
                warn!("Malformed control frame: {e}");
                continue;
            }
        };

        match library.lookup(&file_name).await {
            Some(shared) => {
                info!("Sending {file_name}");
                send_path(channel, &file_name, &shared.path).await?;
            }
            None => {
                warn!("Requested file not shared: {file_name}");
                send_control(channel, &ControlMessage::FileNotFound { file_name }).await?;
            }
        }
    }
    Ok(())
}

/// Receiver-side reassembly buffer for a single file.
#[derive(Debug, Default)]
pub struct TransferState {
    expected_size: u64,
    received: u64,
    chunks: Vec<Vec<u8>>,
}

impl TransferState {
    pub fn new(expected_size: u64) -> Self {
        Self {
            expected_size,
            ..Default::default()
        }
    }

    /// Appends a chunk and returns the new progress.
    pub fn on_chunk(&mut self, chunk: Vec<u8>) -> u8 {
        self.received += chunk.len() as u64;
        self.chunks.push(chunk);
        self.progress()
    }

    /// Percentage of the advertised size received so far, capped at 99.
    /// The advertised size is only a claim, so completion is known from
    /// `end_of_file` alone and only [`download`] reports 100.
    pub fn progress(&self) -> u8 {
        if self.expected_size == 0 {
            return 0;
        }
        let percent = (self.received as f64 / self.expected_size as f64 * 100.0).round();
        percent.min(99.0) as u8
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Concatenates the chunks in arrival order and resets for reuse.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.received as usize);
        for chunk in self.chunks.drain(..) {
            bytes.extend_from_slice(&chunk);
        }
        self.received = 0;
        bytes
    }

    /// Drops everything received so far.
    pub fn abort(&mut self) {
        self.chunks.clear();
        self.received = 0;
    }
}

/// Requester side: asks for `descriptor` and collects the file. Progress
/// goes to `progress`; it ends at 100 on success and is reset to 0 when the
/// transfer fails.
///
/// A timeout closes `channel`: the owner may still be streaming, and those
/// frames must never reach a later download.
pub async fn download(
    channel: &dyn DataChannel,
    descriptor: &FileDescriptor,
    timeout: Duration,
    progress: &watch::Sender<u8>,
) -> Result<Vec<u8>> {
    let mut state = TransferState::new(descriptor.size);
    progress.send_replace(0);

    send_control(
        channel,
        &ControlMessage::RequestFile {
            file_name: descriptor.file_name.clone(),
        },
    )
    .await?;

    let receiving = receive(channel, descriptor, &mut state, progress);
    let outcome = tokio::time::timeout(timeout, receiving)
        .await
        .unwrap_or(Err(ShareError::Timeout));

    match outcome {
        Ok(bytes) => {
            progress.send_replace(100);
            info!("Received {} ({} bytes)", descriptor.file_name, bytes.len());
            Ok(bytes)
        }
        Err(e) => {
            warn!("Transfer of {} failed: {e}", descriptor.file_name);
            if matches!(e, ShareError::Timeout) {
                channel.close().await;
            }
            state.abort();
            progress.send_replace(0);
            Err(e)
        }
    }
}

async fn receive(
    channel: &dyn DataChannel,
    descriptor: &FileDescriptor,
    state: &mut TransferState,
    progress: &watch::Sender<u8>,
) -> Result<Vec<u8>> {
    while let Some(frame) = channel.recv().await {
        match frame {
            ChannelFrame::Binary(chunk) => {
                let percent = state.on_chunk(chunk);
                progress.send_if_modified(|current| {
                    let changed = *current != percent;
                    *current = percent;
                    changed
                });
            }
            ChannelFrame::Text(text) => match serde_json::from_str::<ControlMessage>(&text) {
                Ok(ControlMessage::EndOfFile { file_name }) if file_name == descriptor.file_name => {
                    if state.received() != descriptor.size {
                        debug!(
                            "{file_name}: advertised {} bytes, received {}",
                            descriptor.size,
                            state.received()
                        );
                    }
                    return Ok(state.finish());
                }
                Ok(ControlMessage::FileNotFound { file_name }) if file_name == descriptor.file_name => {
                    return Err(ShareError::FileNotFound(file_name));
                }
                Ok(other) => debug!("Ignoring control message {other:?}"),
                Err(e) => warn!("Malformed control frame: {e}"),
            },
        }
    }
    Err(ShareError::TransferAborted)
}

/// A channel to one peer plus the single transfer slot it allows.
pub struct Downloader {
    channel: Arc<dyn DataChannel>,
    slot: Mutex<()>,
    timeout: Duration,
    progress: watch::Sender<u8>,
}

impl Downloader {
    pub fn new(channel: Arc<dyn DataChannel>, timeout: Duration) -> Self {
        Self {
            channel,
            slot: Mutex::new(()),
            timeout,
            progress: watch::Sender::new(0),
        }
    }

    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    /// Downloads `descriptor`, or fails right away if another download is
    /// still running on this channel.
    pub async fn fetch(&self, descriptor: &FileDescriptor) -> Result<Vec<u8>> {
        let _busy = self
            .slot
            .try_lock()
            .map_err(|_| ShareError::TransferInProgress)?;
        download(&*self.channel, descriptor, self.timeout, &self.progress).await
    }
}

/// Writes a finished download into `dir`. Only the final component of
/// `file_name` is used, so a peer cannot write outside `dir`.
pub async fn materialize(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let name = Path::new(file_name)
        .file_name()
        .ok_or(ShareError::NotAFile)?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    info!("Saved {}", path.display());
    Ok(path)
}
