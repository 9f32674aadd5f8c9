//! WebSocket connection to the detector.

use super::protocol::FrameMessage;
use futures::{SinkExt, StreamExt};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Identifies one connection attempt within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress; frames are dropped.
    Connecting,
    /// Frames can be sent.
    Open,
    /// Closed by either side or failed. Terminal.
    Closed,
}

/// What happened on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEventKind {
    /// Handshake completed.
    Opened,
    /// A text payload arrived.
    Message(String),
    /// The peer closed the connection.
    Closed,
    /// The connection could not be established or broke.
    Failed(String),
}

/// A connection event tagged with the channel it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// Channel that produced the event.
    pub channel: ChannelId,
    /// What happened.
    pub kind: ChannelEventKind,
}

/// Result of offering a frame to the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the socket task.
    Sent,
    /// The connection is not open; frame dropped.
    NotOpen,
    /// The previous frame is still being written; frame dropped.
    Busy,
}

/// Handle to one connection attempt.
///
/// The socket itself lives in a task spawned on the current runtime.
/// Events are reported through the session's event queue, tagged with
/// this channel's id so that events from a replaced channel can be
/// told apart. Dropping or closing the handle aborts the task.
pub struct DetectionChannel {
    id: ChannelId,
    state: ConnectionState,
    outbound: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

impl DetectionChannel {
    /// Starts connecting to `url`. Must be called from within a tokio runtime.
    pub fn open(id: ChannelId, url: &str, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        // One slot: a frame either goes out now or is dropped.
        let (outbound, frames) = mpsc::channel(1);
        tracing::info!(channel = %id, url, "Connecting to detector");
        let task = tokio::spawn(run_socket(id, url.to_string(), frames, events));
        Self {
            id,
            state: ConnectionState::Connecting,
            outbound,
            task,
        }
    }

    /// Id this channel tags its events with.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Last state observed from the socket task.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True once the handshake has completed and until the channel closes.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Updates the connection state from an event reported by the socket task.
    pub fn observe(&mut self, kind: &ChannelEventKind) {
        match kind {
            ChannelEventKind::Opened if self.state == ConnectionState::Connecting => {
                self.state = ConnectionState::Open;
            }
            ChannelEventKind::Closed | ChannelEventKind::Failed(_) => {
                self.state = ConnectionState::Closed;
            }
            _ => {}
        }
    }

    /// Offers one encoded frame. Never blocks and never queues.
    pub fn send(&mut self, image: &str) -> SendOutcome {
        if self.state != ConnectionState::Open {
            return SendOutcome::NotOpen;
        }
        let text = FrameMessage { image }.to_json();
        match self.outbound.try_send(text) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Busy,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.state = ConnectionState::Closed;
                SendOutcome::NotOpen
            }
        }
    }

    /// Terminates the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            tracing::info!(channel = %self.id, "Closing detector connection");
            self.state = ConnectionState::Closed;
        }
        self.task.abort();
    }
}

impl Drop for DetectionChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl fmt::Debug for DetectionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionChannel")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

async fn run_socket(
    id: ChannelId,
    url: String,
    mut frames: mpsc::Receiver<String>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let report = |kind: ChannelEventKind| {
        // The receiver only goes away when the session itself is gone.
        let _ = events.send(ChannelEvent { channel: id, kind });
    };

    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            tracing::error!(channel = %id, error = %e, "Detector connection failed");
            report(ChannelEventKind::Failed(e.to_string()));
            return;
        }
    };
    tracing::info!(channel = %id, "Detector connected");
    report(ChannelEventKind::Opened);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::error!(channel = %id, error = %e, "Failed to send frame");
                        report(ChannelEventKind::Failed(e.to_string()));
                        return;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => report(ChannelEventKind::Message(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    report(ChannelEventKind::Message(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(channel = %id, ?frame, "Detector closed the connection");
                    report(ChannelEventKind::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(channel = %id, error = %e, "Detector connection error");
                    report(ChannelEventKind::Failed(e.to_string()));
                    return;
                }
                None => {
                    tracing::info!(channel = %id, "Detector stream ended");
                    report(ChannelEventKind::Closed);
                    return;
                }
            },
        }
    }
}
