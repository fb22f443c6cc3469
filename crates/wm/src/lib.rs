//! i3pm WM IPC client.
//!
//! Thin, typed wrapper over the i3/sway IPC protocol: framed
//! request/response messages over a Unix socket discovered through
//! `$I3SOCK` (or `$SWAYSOCK`), plus a dedicated subscription connection
//! that yields a continuous stream of lifecycle events.
//!
//! Every message is `"i3-ipc"` + payload length + message type (both
//! native-endian `u32`), followed by a JSON payload. Event replies have
//! the high bit set in the type word.
//!
//! The event stream is unbounded and not restartable: when the transport
//! drops, [`EventStream::next`] returns `None` and the caller reconnects
//! with backoff.

pub mod proc_env;
pub mod tree;

pub use tree::{CommandOutcome, Node, OutputInfo, WindowProperties, WorkspaceInfo};

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Protocol magic prefixed to every message.
const MAGIC: &[u8; 6] = b"i3-ipc";

/// High bit marking a frame as an event rather than a reply.
const EVENT_MASK: u32 = 1 << 31;

/// Request message types.
mod msg {
    pub const RUN_COMMAND: u32 = 0;
    pub const GET_WORKSPACES: u32 = 1;
    pub const SUBSCRIBE: u32 = 2;
    pub const GET_OUTPUTS: u32 = 3;
    pub const GET_TREE: u32 = 4;
}

/// Event kind codes (frame type with the event bit stripped).
mod event_code {
    pub const WORKSPACE: u32 = 0;
    pub const OUTPUT: u32 = 1;
    pub const WINDOW: u32 = 3;
    pub const SHUTDOWN: u32 = 6;
}

/// Errors from WM IPC.
#[derive(Debug, Error)]
pub enum WmError {
    #[error("window manager socket not found: neither $I3SOCK nor $SWAYSOCK is set")]
    SocketNotFound,

    #[error("window manager transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("window manager request timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed window manager reply: {0}")]
    Protocol(String),

    #[error("window manager rejected the event subscription")]
    SubscribeRejected,
}

impl WmError {
    /// Transport-class failures are retryable exactly once before being
    /// surfaced as a daemon-health condition.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WmError::Transport(_) | WmError::Timeout(_))
    }
}

/// Resolve the WM socket path from the environment.
pub fn socket_path() -> Result<PathBuf, WmError> {
    std::env::var_os("I3SOCK")
        .or_else(|| std::env::var_os("SWAYSOCK"))
        .map(PathBuf::from)
        .ok_or(WmError::SocketNotFound)
}

/// Write one framed message.
async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg_type: u32,
    payload: &[u8],
) -> Result<(), WmError> {
    let mut frame = Vec::with_capacity(14 + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
    frame.extend_from_slice(&msg_type.to_ne_bytes());
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    Ok(())
}

/// Read one framed message, returning the raw type word and payload.
async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(u32, Vec<u8>), WmError> {
    let mut header = [0u8; 14];
    reader.read_exact(&mut header).await?;
    if &header[..6] != MAGIC {
        return Err(WmError::Protocol("bad magic in frame header".to_string()));
    }

    let len = u32::from_ne_bytes([header[6], header[7], header[8], header[9]]) as usize;
    let msg_type = u32::from_ne_bytes([header[10], header[11], header[12], header[13]]);

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok((msg_type, payload))
}

fn decode<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, WmError> {
    serde_json::from_slice(payload).map_err(|e| WmError::Protocol(e.to_string()))
}

/// Request/response surface of the window manager.
///
/// A trait so the daemon engine can run against an injected fake in
/// tests; [`I3Client`] is the production implementation.
#[async_trait]
pub trait WmClient: Send + Sync {
    /// Full window/workspace/output hierarchy.
    async fn get_tree(&self) -> Result<Node, WmError>;

    async fn get_workspaces(&self) -> Result<Vec<WorkspaceInfo>, WmError>;

    async fn get_outputs(&self) -> Result<Vec<OutputInfo>, WmError>;

    /// Execute one or more semicolon-joined commands. The reply carries
    /// one outcome per sub-command, in order; the client never reorders.
    async fn run_command(&self, command: &str) -> Result<Vec<CommandOutcome>, WmError>;
}

/// Production client over the WM's Unix socket.
///
/// One connection, serialized requests: the socket is a strict
/// request/reply channel, so a mutex around the stream is all the
/// synchronization needed.
pub struct I3Client {
    stream: Mutex<UnixStream>,
    timeout: Duration,
}

impl I3Client {
    /// Connect to the WM socket from the environment.
    pub async fn connect(timeout: Duration) -> Result<Self, WmError> {
        let path = socket_path()?;
        let stream = UnixStream::connect(&path).await?;
        debug!("connected to window manager at {:?}", path);
        Ok(Self {
            stream: Mutex::new(stream),
            timeout,
        })
    }

    async fn request(&self, msg_type: u32, payload: &[u8]) -> Result<Vec<u8>, WmError> {
        let fut = async {
            let mut stream = self.stream.lock().await;
            write_message(&mut *stream, msg_type, payload).await?;
            let (reply_type, data) = read_message(&mut *stream).await?;
            if reply_type != msg_type {
                return Err(WmError::Protocol(format!(
                    "reply type {reply_type} does not match request type {msg_type}"
                )));
            }
            Ok(data)
        };

        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| WmError::Timeout(self.timeout))?
    }
}

#[async_trait]
impl WmClient for I3Client {
    async fn get_tree(&self) -> Result<Node, WmError> {
        decode(&self.request(msg::GET_TREE, b"").await?)
    }

    async fn get_workspaces(&self) -> Result<Vec<WorkspaceInfo>, WmError> {
        decode(&self.request(msg::GET_WORKSPACES, b"").await?)
    }

    async fn get_outputs(&self) -> Result<Vec<OutputInfo>, WmError> {
        decode(&self.request(msg::GET_OUTPUTS, b"").await?)
    }

    async fn run_command(&self, command: &str) -> Result<Vec<CommandOutcome>, WmError> {
        decode(&self.request(msg::RUN_COMMAND, command.as_bytes()).await?)
    }
}

/// Event categories available for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Workspace,
    Output,
    Window,
    Shutdown,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Workspace => "workspace",
            EventKind::Output => "output",
            EventKind::Window => "window",
            EventKind::Shutdown => "shutdown",
        }
    }
}

/// What happened to a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowChange {
    New,
    Close,
    Focus,
    Title,
    FullscreenMode,
    Move,
    Floating,
    Urgent,
    Mark,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowEvent {
    pub change: WindowChange,
    pub container: Node,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceEvent {
    pub change: String,
    #[serde(default)]
    pub current: Option<Node>,
    #[serde(default)]
    pub old: Option<Node>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputEvent {
    pub change: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownEvent {
    pub change: String,
}

/// A typed WM event.
#[derive(Debug, Clone)]
pub enum Event {
    Window(WindowEvent),
    Workspace(WorkspaceEvent),
    Output(OutputEvent),
    Shutdown(ShutdownEvent),
}

impl Event {
    /// Parse an event payload. `Ok(None)` for kinds we do not track.
    fn parse(code: u32, payload: &[u8]) -> Result<Option<Event>, WmError> {
        let event = match code {
            event_code::WINDOW => Event::Window(decode(payload)?),
            event_code::WORKSPACE => Event::Workspace(decode(payload)?),
            event_code::OUTPUT => Event::Output(decode(payload)?),
            event_code::SHUTDOWN => Event::Shutdown(decode(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Continuous event stream on a dedicated connection.
pub struct EventStream {
    stream: UnixStream,
}

impl EventStream {
    /// Next event, or `None` once the transport drops. Malformed events
    /// are logged and skipped so one bad payload cannot stall the
    /// stream.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            let (frame_type, payload) = match read_message(&mut self.stream).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("event stream ended: {}", e);
                    return None;
                }
            };

            if frame_type & EVENT_MASK == 0 {
                continue;
            }

            match Event::parse(frame_type & !EVENT_MASK, &payload) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => continue,
                Err(e) => {
                    warn!("skipping malformed event: {}", e);
                    continue;
                }
            }
        }
    }
}

/// Open a subscription connection for the given event kinds.
pub async fn subscribe(kinds: &[EventKind], timeout: Duration) -> Result<EventStream, WmError> {
    let path = socket_path()?;
    let mut stream = UnixStream::connect(&path).await?;

    let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
    let payload = serde_json::to_vec(&names).map_err(|e| WmError::Protocol(e.to_string()))?;

    let ack = tokio::time::timeout(timeout, async {
        write_message(&mut stream, msg::SUBSCRIBE, &payload).await?;
        loop {
            let (frame_type, data) = read_message(&mut stream).await?;
            // Events may already interleave before the ack arrives.
            if frame_type & EVENT_MASK == 0 {
                return Ok::<Vec<u8>, WmError>(data);
            }
        }
    })
    .await
    .map_err(|_| WmError::Timeout(timeout))??;

    #[derive(Deserialize)]
    struct SubscribeReply {
        success: bool,
    }
    let reply: SubscribeReply = decode(&ack)?;
    if !reply.success {
        return Err(WmError::SubscribeRejected);
    }

    debug!("subscribed to {:?}", names);
    Ok(EventStream { stream })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_message(&mut a, msg::GET_TREE, br#"{"id":1}"#)
            .await
            .unwrap();

        let (msg_type, payload) = read_message(&mut b).await.unwrap();
        assert_eq!(msg_type, msg::GET_TREE);
        assert_eq!(payload, br#"{"id":1}"#);
    }

    #[tokio::test]
    async fn empty_payload_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_message(&mut a, msg::GET_WORKSPACES, b"").await.unwrap();
        let (msg_type, payload) = read_message(&mut b).await.unwrap();
        assert_eq!(msg_type, msg::GET_WORKSPACES);
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn bad_magic_is_a_protocol_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut a, b"not-i3-at-all-")
            .await
            .unwrap();
        assert!(matches!(
            read_message(&mut b).await,
            Err(WmError::Protocol(_))
        ));
    }

    #[test]
    fn window_event_parses() {
        let payload = br#"{
            "change": "new",
            "container": {
                "id": 42, "type": "con", "window": 7, "pid": 1234,
                "window_properties": {"class": "Code"}
            }
        }"#;
        let event = Event::parse(event_code::WINDOW, payload).unwrap().unwrap();
        match event {
            Event::Window(w) => {
                assert_eq!(w.change, WindowChange::New);
                assert_eq!(w.container.id, 42);
                assert_eq!(w.container.class(), Some("Code"));
            }
            other => panic!("expected window event, got {:?}", other),
        }
    }

    #[test]
    fn unknown_window_change_is_tolerated() {
        let payload = br#"{"change": "hologram", "container": {"id": 1}}"#;
        let event = Event::parse(event_code::WINDOW, payload).unwrap().unwrap();
        match event {
            Event::Window(w) => assert_eq!(w.change, WindowChange::Unknown),
            other => panic!("expected window event, got {:?}", other),
        }
    }

    #[test]
    fn untracked_event_kinds_are_skipped() {
        // Binding events (code 4) are not subscribed; parse returns None.
        assert!(Event::parse(4, b"{}").unwrap().is_none());
    }
}
