//! Event loop that owns the session's resources.
//!
//! [`Session`] executes the effects produced by the state machine
//! against the real camera, detector channel and sampling timer. User
//! commands, camera replies, channel events and sampling ticks are
//! handled one at a time from a single `select!`. Only the camera runs
//! elsewhere, on the thread behind [`CameraActor`].

use super::machine::{Effect, Event, SessionMachine};
use super::state::{SessionSnapshot, SessionState};
use crate::capture::{
    spawn_camera_actor, Camera, CameraActor, CameraEvent, CaptureConfig, Frame, RequestId,
};
use crate::channel::{
    ChannelEvent, ChannelEventKind, ChannelId, ConnectionState, DetectionChannel, SendOutcome,
};
use crate::config::FileConfig;
use crate::encoding::{FrameEncoder, SamplingTimer};
use crate::measurement::DisplayUnit;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Commands accepted from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start detecting, restarting if already active.
    Start,
    /// Stop detecting and release the camera and connection.
    Stop,
    /// Stop if detecting, otherwise start.
    ToggleDetection,
    /// Switch between meters and centimeters.
    ToggleUnit,
    /// Release everything and end the event loop.
    Teardown,
}

/// Settings a session needs at construction.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Camera request.
    pub capture: CaptureConfig,
    /// Detector WebSocket endpoint.
    pub detector_url: String,
    /// Time between frame samples.
    pub sample_interval: Duration,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Initial display unit.
    pub unit: DisplayUnit,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&FileConfig::default())
    }
}

impl SessionSettings {
    /// Takes the session-relevant parts of a loaded config file.
    pub fn from_config(config: &FileConfig) -> Self {
        Self {
            capture: config.capture.clone(),
            detector_url: config.detector.url.clone(),
            sample_interval: config.detector.sample_interval(),
            jpeg_quality: config.detector.jpeg_quality,
            unit: config.display.unit,
        }
    }
}

/// Cloneable handle used by the presentation layer.
///
/// Commands are queued to the session's event loop; state is observed
/// through a `watch` channel that always holds the latest snapshot.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Queues a command. Returns false if the session has ended.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Queues [`Command::Start`].
    pub fn start(&self) -> bool {
        self.send(Command::Start)
    }

    /// Queues [`Command::Stop`].
    pub fn stop(&self) -> bool {
        self.send(Command::Stop)
    }

    /// Queues [`Command::ToggleDetection`].
    pub fn toggle_detection(&self) -> bool {
        self.send(Command::ToggleDetection)
    }

    /// Queues [`Command::ToggleUnit`].
    pub fn toggle_unit(&self) -> bool {
        self.send(Command::ToggleUnit)
    }

    /// Queues [`Command::Teardown`]; the session releases everything and ends.
    pub fn teardown(&self) -> bool {
        self.send(Command::Teardown)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver notified on every snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    ///
    /// Returns `None` if the session was dropped first.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        self.snapshot
            .wait_for(predicate)
            .await
            .ok()
            .map(|snapshot| snapshot.clone())
    }
}

/// The single detection session and the resources it owns.
pub struct Session {
    machine: SessionMachine,
    camera: CameraActor,
    capture: CaptureConfig,
    detector_url: String,
    encoder: FrameEncoder,
    sampler: SamplingTimer,
    channel: Option<DetectionChannel>,
    last_channel_id: u64,
    /// Open request whose reply resolves the current acquisition.
    pending_open: Option<RequestId>,
    camera_ready: bool,
    capture_pending: bool,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    events_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Session {
    /// Creates an idle session around `camera` and the handle used to
    /// drive it. The camera moves to the session's camera thread.
    pub fn new<C>(camera: C, settings: SessionSettings) -> (Self, SessionHandle)
    where
        C: Camera + Send + 'static,
    {
        Self::with_camera_factory(move || camera, settings)
    }

    /// Like [`Session::new`], but builds the camera on the camera thread.
    /// Use this for devices whose handle cannot move between threads.
    pub fn with_camera_factory<C, F>(
        make_camera: F,
        settings: SessionSettings,
    ) -> (Self, SessionHandle)
    where
        C: Camera,
        F: FnOnce() -> C + Send + 'static,
    {
        let machine = SessionMachine::new(settings.unit);
        let (snapshot, snapshot_rx) = watch::channel(machine.snapshot());
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Self {
            machine,
            camera: spawn_camera_actor(make_camera),
            capture: settings.capture,
            detector_url: settings.detector_url,
            encoder: FrameEncoder::new(settings.jpeg_quality),
            sampler: SamplingTimer::new(settings.sample_interval),
            channel: None,
            last_channel_id: 0,
            pending_open: None,
            camera_ready: false,
            capture_pending: false,
            events_tx,
            events_rx,
            commands,
            snapshot,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        };
        (session, handle)
    }

    /// Runs until a teardown command arrives or every handle is dropped.
    /// The camera is confirmed closed before this returns.
    pub async fn run(&mut self) {
        while self.turn().await {}
        self.teardown();
        self.camera.release().await;
        self.publish();
    }

    /// Handles one command or event and publishes the result. Returns
    /// false when the session should end.
    async fn turn(&mut self) -> bool {
        tokio::select! {
            command = self.commands.recv() => match command {
                Some(Command::Teardown) | None => return false,
                Some(command) => self.handle_command(command),
            },
            Some(event) = self.camera.recv() => self.handle_camera_event(event),
            Some(event) = self.events_rx.recv() => self.handle_channel_event(event),
            _ = self.sampler.tick() => self.sample_frame(),
        }
        self.publish();
        true
    }

    /// Applies one presentation command.
    pub fn handle_command(&mut self, command: Command) {
        tracing::debug!(?command, "Session command");
        match command {
            Command::Start => self.dispatch(Event::Start),
            Command::Stop => self.dispatch(Event::Stop),
            Command::ToggleDetection => {
                if self.machine.state().is_active() {
                    self.dispatch(Event::Stop)
                } else {
                    self.dispatch(Event::Start)
                }
            }
            Command::ToggleUnit => {
                let unit = self.machine.toggle_unit();
                tracing::info!(%unit, "Display unit changed");
            }
            Command::Teardown => self.teardown(),
        }
    }

    /// Stops the session and releases every resource, whatever the state.
    /// The camera close is queued; [`Session::run`] waits for it.
    pub fn teardown(&mut self) {
        self.dispatch(Event::Stop);
        self.sampler.cancel();
        self.close_channel();
        self.pending_open = None;
        self.release_camera();
    }

    fn dispatch(&mut self, event: Event) {
        let mut pending: VecDeque<Effect> = self.machine.dispatch(event).into();
        while let Some(effect) = pending.pop_front() {
            if let Some(follow_up) = self.apply(effect) {
                pending.extend(self.machine.dispatch(follow_up));
            }
        }
    }

    fn apply(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::AcquireCamera => match self.camera.open(&self.capture) {
                Ok(id) => {
                    tracing::debug!(request = %id, "Camera requested");
                    self.pending_open = Some(id);
                    None
                }
                Err(e) => Some(Event::CameraFailed(e.to_string())),
            },
            Effect::ReleaseCamera => {
                self.release_camera();
                None
            }
            Effect::OpenChannel => {
                self.close_channel();
                self.last_channel_id += 1;
                let id = ChannelId(self.last_channel_id);
                self.channel = Some(DetectionChannel::open(
                    id,
                    &self.detector_url,
                    self.events_tx.clone(),
                ));
                None
            }
            Effect::CloseChannel => {
                self.close_channel();
                None
            }
            Effect::StartSampling => {
                self.sampler.start();
                None
            }
            Effect::StopSampling => {
                self.sampler.cancel();
                None
            }
        }
    }

    fn release_camera(&mut self) {
        self.camera_ready = false;
        if let Err(e) = self.camera.close() {
            tracing::warn!(error = %e, "Camera close not delivered");
        }
    }

    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    fn handle_camera_event(&mut self, event: CameraEvent) {
        match event {
            CameraEvent::Opened(id) if self.pending_open == Some(id) => {
                self.pending_open = None;
                self.camera_ready = true;
                self.dispatch(Event::CameraAcquired);
            }
            CameraEvent::OpenFailed(id, reason) if self.pending_open == Some(id) => {
                self.pending_open = None;
                self.dispatch(Event::CameraFailed(reason));
            }
            CameraEvent::Opened(id) | CameraEvent::OpenFailed(id, _) => {
                tracing::trace!(request = %id, "Ignoring reply to a superseded camera request");
            }
            CameraEvent::Closed(id) => {
                tracing::trace!(request = %id, "Camera closed");
            }
            CameraEvent::FrameCaptured(frame) => {
                self.capture_pending = false;
                self.send_frame(&frame);
            }
            CameraEvent::CaptureFailed(reason) => {
                self.capture_pending = false;
                tracing::debug!(reason = %reason, "No frame available this tick");
                self.machine.note_frame(false);
            }
        }
    }

    fn handle_channel_event(&mut self, event: ChannelEvent) {
        let Some(channel) = self
            .channel
            .as_mut()
            .filter(|channel| channel.id() == event.channel)
        else {
            tracing::trace!(channel = %event.channel, "Ignoring event from a replaced channel");
            return;
        };
        channel.observe(&event.kind);

        let next = match event.kind {
            ChannelEventKind::Opened => Event::ChannelOpened,
            ChannelEventKind::Message(text) => Event::ChannelMessage(text),
            ChannelEventKind::Closed => Event::ChannelLost("closed by detector".to_string()),
            ChannelEventKind::Failed(reason) => Event::ChannelLost(reason),
        };
        self.dispatch(next);
    }

    fn channel_is_open(&self) -> bool {
        self.channel.as_ref().is_some_and(DetectionChannel::is_open)
    }

    /// One sampling tick: ask the camera thread for a frame if it can be sent.
    fn sample_frame(&mut self) {
        if !self.channel_is_open() || !self.camera_ready {
            self.machine.note_frame(false);
            return;
        }
        if self.capture_pending {
            tracing::trace!("Previous capture still pending");
            self.machine.note_frame(false);
            return;
        }
        match self.camera.capture() {
            Ok(()) => self.capture_pending = true,
            Err(e) => {
                tracing::warn!(error = %e, "Capture request not delivered");
                self.machine.note_frame(false);
            }
        }
    }

    /// Encodes and offers a captured frame to the channel.
    fn send_frame(&mut self, frame: &Frame) {
        let Some(channel) = self.channel.as_mut().filter(|channel| channel.is_open()) else {
            self.machine.note_frame(false);
            return;
        };

        let payload = match self.encoder.encode(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, sequence = frame.sequence(), "Failed to encode frame");
                self.machine.note_frame(false);
                return;
            }
        };

        let outcome = channel.send(&payload);
        if outcome != SendOutcome::Sent {
            tracing::trace!(?outcome, sequence = frame.sequence(), "Frame dropped");
        }
        self.machine.note_frame(outcome == SendOutcome::Sent);
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Snapshot of the current state, whether or not it was published yet.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.machine.snapshot()
    }

    /// State of the current channel, if one is held.
    pub fn channel_state(&self) -> Option<ConnectionState> {
        self.channel.as_ref().map(DetectionChannel::state)
    }

    /// True while the sampling timer is running.
    pub fn is_sampling(&self) -> bool {
        self.sampler.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MockCamera;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(5);

    fn settings() -> SessionSettings {
        SessionSettings {
            capture: CaptureConfig::with_dimensions(32, 24),
            // Nothing listens on the discard port; connects fail fast.
            detector_url: "ws://127.0.0.1:9/ws".to_string(),
            sample_interval: Duration::from_millis(20),
            ..SessionSettings::default()
        }
    }

    /// Feeds camera replies to the session until acquisition resolves.
    async fn acquire(session: &mut Session) {
        while session.state() == SessionState::Starting {
            let event = timeout(WAIT, session.camera.recv())
                .await
                .unwrap()
                .unwrap();
            session.handle_camera_event(event);
        }
    }

    async fn next_camera_event(session: &mut Session) {
        let event = timeout(WAIT, session.camera.recv())
            .await
            .unwrap()
            .unwrap();
        session.handle_camera_event(event);
    }

    #[tokio::test]
    async fn test_start_waits_for_camera() {
        let camera = MockCamera::new();
        let (mut session, handle) = Session::new(camera.clone(), settings());
        session.handle_command(Command::ToggleDetection);
        session.publish();

        assert_eq!(handle.snapshot().state, SessionState::Starting);
        assert_eq!(session.channel_state(), None);
        assert!(!session.is_sampling());

        acquire(&mut session).await;
        assert_eq!(session.state(), SessionState::Streaming);
        assert!(camera.is_open());
        assert_eq!(session.channel_state(), Some(ConnectionState::Connecting));
        assert!(session.is_sampling());

        session.handle_command(Command::ToggleDetection);
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.channel_state(), None);
        assert!(!session.is_sampling());

        session.camera.release().await;
        assert!(!camera.is_open());
    }

    #[tokio::test]
    async fn test_denied_camera_leaves_nothing_running() {
        let camera = MockCamera::denied("Permission denied");
        let (mut session, _handle) = Session::new(camera.clone(), settings());
        session.handle_command(Command::Start);
        acquire(&mut session).await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Error);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("camera access denied: Permission denied")
        );
        assert!(!camera.is_open());
        assert_eq!(session.channel_state(), None);
        assert!(!session.is_sampling());
    }

    #[tokio::test]
    async fn test_restart_replaces_channel() {
        let camera = MockCamera::new();
        let (mut session, _handle) = Session::new(camera.clone(), settings());
        session.handle_command(Command::Start);
        acquire(&mut session).await;
        assert_eq!(session.last_channel_id, 1);

        session.handle_command(Command::Start);
        assert_eq!(session.state(), SessionState::Starting);
        assert_eq!(session.channel_state(), None);
        acquire(&mut session).await;

        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(camera.open_count(), 2);
        assert_eq!(session.last_channel_id, 2);

        // Events from the first channel no longer matter.
        session.handle_channel_event(ChannelEvent {
            channel: ChannelId(1),
            kind: ChannelEventKind::Closed,
        });
        assert_eq!(session.state(), SessionState::Streaming);
        session.teardown();
    }

    #[tokio::test]
    async fn test_superseded_open_is_ignored() {
        let camera = MockCamera::new();
        let (mut session, _handle) = Session::new(camera.clone(), settings());
        session.handle_command(Command::Start);
        session.handle_command(Command::Start);

        // First reply answers the abandoned request.
        next_camera_event(&mut session).await;
        assert_eq!(session.state(), SessionState::Starting);
        assert_eq!(session.channel_state(), None);

        acquire(&mut session).await;
        assert_eq!(session.state(), SessionState::Streaming);
        assert_eq!(session.last_channel_id, 1);
        session.teardown();
    }

    #[tokio::test]
    async fn test_tick_without_open_channel_is_skipped() {
        let (mut session, _handle) = Session::new(MockCamera::new(), settings());
        session.handle_command(Command::Start);
        acquire(&mut session).await;
        session.sample_frame();

        let stats = session.snapshot().stats;
        assert_eq!(stats.frames_sent, 0);
        assert_eq!(stats.frames_skipped, 1);
        assert!(!session.capture_pending);
        session.teardown();
    }

    #[tokio::test]
    async fn test_open_channel_receives_frame() {
        // Accepts TCP but never answers the handshake, so the channel
        // stays connecting until told otherwise.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let (mut session, _handle) = Session::new(
            MockCamera::new(),
            SessionSettings {
                detector_url: url,
                ..settings()
            },
        );

        session.handle_command(Command::Start);
        acquire(&mut session).await;
        session.handle_channel_event(ChannelEvent {
            channel: ChannelId(1),
            kind: ChannelEventKind::Opened,
        });
        assert_eq!(session.channel_state(), Some(ConnectionState::Open));

        session.sample_frame();
        assert!(session.capture_pending);
        // A tick while the camera is busy is skipped, not queued.
        session.sample_frame();
        assert_eq!(session.snapshot().stats.frames_skipped, 1);

        next_camera_event(&mut session).await;
        assert!(!session.capture_pending);
        assert_eq!(session.snapshot().stats.frames_sent, 1);
        session.teardown();
        drop(listener);
    }

    #[tokio::test]
    async fn test_stop_during_slow_acquisition_releases_camera() {
        let camera = MockCamera::new().with_open_delay(Duration::from_millis(500));
        let (mut session, handle) = Session::new(camera.clone(), settings());
        handle.start();

        let mut watcher = handle.clone();
        let observer = camera.clone();
        let (_, open_count_at_stop) = tokio::join!(session.run(), async move {
            timeout(WAIT, watcher.wait_for(|s| s.state == SessionState::Starting))
                .await
                .expect("Starting never published")
                .unwrap();
            watcher.stop();
            timeout(WAIT, watcher.wait_for(|s| s.state == SessionState::Stopped))
                .await
                .expect("stop not handled during acquisition")
                .unwrap();
            let open_count_at_stop = observer.open_count();

            // Let the slow open finish while stopped.
            while observer.open_count() == 0 {
                sleep(Duration::from_millis(10)).await;
            }
            sleep(Duration::from_millis(50)).await;
            watcher.teardown();
            open_count_at_stop
        });

        assert_eq!(open_count_at_stop, 0);
        assert_eq!(camera.open_count(), 1);
        assert!(!camera.is_open());
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.channel_state(), None);
        assert!(!session.is_sampling());
        assert_eq!(handle.snapshot().state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_teardown_is_safe_in_any_state() {
        let camera = MockCamera::new();
        let (mut session, _handle) = Session::new(camera.clone(), settings());
        session.teardown();
        assert_eq!(session.state(), SessionState::Idle);

        session.handle_command(Command::Start);
        acquire(&mut session).await;
        session.teardown();
        session.teardown();
        assert_eq!(session.state(), SessionState::Stopped);

        session.camera.release().await;
        assert!(!camera.is_open());
    }
}
