//! Camera thread.
//!
//! Opening a device can block on a permission prompt and reading a
//! frame waits for the sensor, so the camera lives on its own OS thread.
//! The session sends [`CameraCommand`]s and receives [`CameraEvent`]s;
//! commands are handled strictly in order.

use super::{Camera, CameraError, CaptureConfig, Frame};
use std::fmt;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;

/// Tag linking an open or close reply to the command that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Work for the camera thread.
#[derive(Debug)]
pub enum CameraCommand {
    /// Open the device, closing any stream that is already open.
    Open {
        /// Echoed in the reply.
        id: RequestId,
        /// Requested capture settings.
        config: CaptureConfig,
    },
    /// Grab one frame.
    Capture,
    /// Stop the stream. Answered even when nothing is open.
    Close {
        /// Echoed in the reply.
        id: RequestId,
    },
    /// Release the device and end the thread.
    Shutdown,
}

/// Replies from the camera thread.
#[derive(Debug)]
pub enum CameraEvent {
    /// The stream requested by this open is live.
    Opened(RequestId),
    /// The open failed with the platform's reason.
    OpenFailed(RequestId, String),
    /// A frame answering a capture command.
    FrameCaptured(Frame),
    /// A capture command produced no frame.
    CaptureFailed(String),
    /// The stream is closed as of this close command.
    Closed(RequestId),
}

/// Owner-side handle to the camera thread.
///
/// Dropping it shuts the thread down and waits for the device to be
/// released.
#[derive(Debug)]
pub struct CameraActor {
    commands: std_mpsc::Sender<CameraCommand>,
    events: mpsc::UnboundedReceiver<CameraEvent>,
    thread: Option<JoinHandle<()>>,
    last_request: u64,
}

/// Starts the camera thread. `make_camera` runs on that thread, so the
/// camera itself never has to cross threads.
pub fn spawn_camera_actor<C, F>(make_camera: F) -> CameraActor
where
    C: Camera,
    F: FnOnce() -> C + Send + 'static,
{
    let (commands, command_rx) = std_mpsc::channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let thread =
        std::thread::spawn(move || run_camera_thread(make_camera(), command_rx, event_tx));

    CameraActor {
        commands,
        events,
        thread: Some(thread),
        last_request: 0,
    }
}

impl CameraActor {
    /// Asks the thread to open the camera. The outcome arrives as
    /// [`CameraEvent::Opened`] or [`CameraEvent::OpenFailed`] with the
    /// returned id.
    pub fn open(&mut self, config: &CaptureConfig) -> Result<RequestId, CameraError> {
        let id = self.next_request();
        self.send(CameraCommand::Open {
            id,
            config: config.clone(),
        })?;
        Ok(id)
    }

    /// Asks the thread for one frame.
    pub fn capture(&self) -> Result<(), CameraError> {
        self.send(CameraCommand::Capture)
    }

    /// Asks the thread to close the camera.
    pub fn close(&mut self) -> Result<RequestId, CameraError> {
        let id = self.next_request();
        self.send(CameraCommand::Close { id })?;
        Ok(id)
    }

    /// Next reply from the thread, or `None` once it has exited.
    pub async fn recv(&mut self) -> Option<CameraEvent> {
        self.events.recv().await
    }

    /// Closes the camera and waits until the thread confirms it.
    /// Replies that arrive in the meantime are discarded.
    pub async fn release(&mut self) {
        let Ok(id) = self.close() else {
            return;
        };
        while let Some(event) = self.events.recv().await {
            if matches!(event, CameraEvent::Closed(closed) if closed == id) {
                break;
            }
        }
    }

    fn next_request(&mut self) -> RequestId {
        self.last_request += 1;
        RequestId(self.last_request)
    }

    fn send(&self, command: CameraCommand) -> Result<(), CameraError> {
        self.commands
            .send(command)
            .map_err(|_| CameraError::ThreadStopped)
    }
}

impl Drop for CameraActor {
    fn drop(&mut self) {
        let _ = self.commands.send(CameraCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Camera thread panicked");
            }
        }
    }
}

fn run_camera_thread<C: Camera>(
    mut camera: C,
    commands: std_mpsc::Receiver<CameraCommand>,
    events: mpsc::UnboundedSender<CameraEvent>,
) {
    tracing::debug!("Camera thread started");
    while let Ok(command) = commands.recv() {
        let event = match command {
            CameraCommand::Open { id, config } => {
                if camera.is_open() {
                    camera.close();
                }
                match camera.open(&config) {
                    Ok(()) => CameraEvent::Opened(id),
                    Err(e) => CameraEvent::OpenFailed(id, e.to_string()),
                }
            }
            CameraCommand::Capture => match camera.capture() {
                Ok(frame) => CameraEvent::FrameCaptured(frame),
                Err(e) => CameraEvent::CaptureFailed(e.to_string()),
            },
            CameraCommand::Close { id } => {
                camera.close();
                CameraEvent::Closed(id)
            }
            CameraCommand::Shutdown => break,
        };
        if events.send(event).is_err() {
            break;
        }
    }
    camera.close();
    tracing::debug!("Camera thread stopped");
}
