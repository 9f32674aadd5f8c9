//! Deterministic session state machine.
//!
//! [`SessionMachine::dispatch`] takes one event and returns the resource
//! effects the caller must perform. It never touches the camera, the
//! socket or the clock's timers itself, which keeps every transition
//! testable without hardware or a network.

use super::state::{AnnotatedFrame, SessionSnapshot, SessionState, SessionStats};
use crate::channel::{parse_inbound, Inbound};
use crate::measurement::{DisplayUnit, HistoryBuffer};

/// Error shown when the detector connection fails or drops.
pub const CONNECTION_LOST: &str = "Connection lost. Please try again.";

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// User asked to start detecting.
    Start,
    /// User asked to stop, or the owner is tearing down.
    Stop,
    /// The camera stream was acquired.
    CameraAcquired,
    /// Camera acquisition failed with the given reason.
    CameraFailed(String),
    /// The detector connection finished its handshake.
    ChannelOpened,
    /// Raw text received from the detector.
    ChannelMessage(String),
    /// The detector connection closed or failed unexpectedly.
    ChannelLost(String),
}

/// Resource actions requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Request the camera; answer with `CameraAcquired` or `CameraFailed`.
    AcquireCamera,
    /// Close the camera if it is open.
    ReleaseCamera,
    /// Replace any channel with a new connection attempt.
    OpenChannel,
    /// Close the current channel, if any.
    CloseChannel,
    /// Start the sampling timer.
    StartSampling,
    /// Cancel the sampling timer.
    StopSampling,
}

/// Releases everything a session can hold. Each effect is a no-op when
/// the resource is already gone.
const RELEASE_ALL: [Effect; 3] = [
    Effect::StopSampling,
    Effect::CloseChannel,
    Effect::ReleaseCamera,
];

/// Session state plus the display data derived from detector replies.
#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    state: SessionState,
    last_error: Option<String>,
    distance_meters: f64,
    unit: DisplayUnit,
    history: HistoryBuffer,
    annotated: Option<AnnotatedFrame>,
    stats: SessionStats,
}

impl SessionMachine {
    /// An idle session showing readings in `unit`.
    pub fn new(unit: DisplayUnit) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }

    /// Applies one event and returns the effects to perform, in order.
    pub fn dispatch(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start => {
                let mut effects = Vec::new();
                if self.state.is_active() {
                    tracing::info!(state = %self.state, "Restarting active session");
                    effects.extend(RELEASE_ALL);
                }
                self.transition(SessionState::Starting);
                effects.push(Effect::AcquireCamera);
                effects
            }
            Event::Stop => match self.state {
                SessionState::Idle | SessionState::Stopped => Vec::new(),
                _ => {
                    self.transition(SessionState::Stopped);
                    RELEASE_ALL.to_vec()
                }
            },
            Event::CameraAcquired => {
                if self.state == SessionState::Starting {
                    self.transition(SessionState::Streaming);
                    vec![Effect::OpenChannel, Effect::StartSampling]
                } else {
                    // Acquisition resolved after the session moved on.
                    vec![Effect::ReleaseCamera]
                }
            }
            Event::CameraFailed(reason) => {
                if self.state == SessionState::Starting {
                    tracing::error!(reason = %reason, "Camera acquisition failed");
                    self.fail(reason)
                } else {
                    Vec::new()
                }
            }
            Event::ChannelOpened => {
                if self.state == SessionState::Streaming {
                    self.last_error = None;
                }
                Vec::new()
            }
            Event::ChannelMessage(text) => {
                if self.state == SessionState::Streaming {
                    self.handle_message(&text)
                } else {
                    tracing::debug!(state = %self.state, "Dropping detector message");
                    Vec::new()
                }
            }
            Event::ChannelLost(detail) => {
                if self.state == SessionState::Streaming {
                    tracing::warn!(detail = %detail, "Detector connection lost");
                    self.fail(CONNECTION_LOST.to_string())
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn handle_message(&mut self, text: &str) -> Vec<Effect> {
        match parse_inbound(text) {
            Err(e) => {
                self.stats.malformed_messages += 1;
                tracing::warn!(error = %e, "Ignoring malformed detector message");
                Vec::new()
            }
            Ok(Inbound::Error(message)) => {
                tracing::error!(message = %message, "Detector reported an error");
                self.fail(message)
            }
            Ok(Inbound::Status(status)) => {
                tracing::info!(status = %status, "Detector status");
                Vec::new()
            }
            Ok(Inbound::Reading {
                measurement,
                face_detected,
            }) => {
                self.last_error = None;
                if measurement.is_detection() {
                    self.distance_meters = measurement.distance_meters;
                    self.history.record(measurement.distance_meters);
                    self.stats.measurements += 1;
                    tracing::debug!(distance = measurement.distance_meters, "Distance reading");
                } else {
                    self.stats.empty_readings += 1;
                    tracing::trace!(?face_detected, "No face in frame");
                }
                if let Some(image) = measurement.annotated_image {
                    self.annotated = Some(AnnotatedFrame {
                        distance_meters: measurement.distance_meters,
                        image,
                    });
                }
                Vec::new()
            }
        }
    }

    fn fail(&mut self, message: String) -> Vec<Effect> {
        self.last_error = Some(message);
        self.stats.errors += 1;
        self.transition(SessionState::Error);
        RELEASE_ALL.to_vec()
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "Session state changed");
            self.state = next;
        }
    }

    /// Switches between meters and centimeters; returns the new unit.
    pub fn toggle_unit(&mut self) -> DisplayUnit {
        self.unit = self.unit.toggle();
        self.unit
    }

    /// Counts the outcome of one sampling tick.
    pub fn note_frame(&mut self, sent: bool) {
        if sent {
            self.stats.frames_sent += 1;
        } else {
            self.stats.frames_skipped += 1;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True only while streaming.
    pub fn is_detecting(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// Message shown to the user, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Last non-negative distance.
    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    /// Current display unit.
    pub fn unit(&self) -> DisplayUnit {
        self.unit
    }

    /// Recent readings.
    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Running counters.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Copies the state out for presentation.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            is_detecting: self.is_detecting(),
            distance_meters: self.distance_meters,
            unit: self.unit,
            history: self.history.to_vec(),
            last_error: self.last_error.clone(),
            annotated: self.annotated.clone(),
            stats: self.stats.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn streaming() -> SessionMachine {
        let mut machine = SessionMachine::default();
        assert_eq!(machine.dispatch(Event::Start), vec![Effect::AcquireCamera]);
        assert_eq!(
            machine.dispatch(Event::CameraAcquired),
            vec![Effect::OpenChannel, Effect::StartSampling]
        );
        machine.dispatch(Event::ChannelOpened);
        machine
    }

    fn message(machine: &mut SessionMachine, text: &str) -> Vec<Effect> {
        machine.dispatch(Event::ChannelMessage(text.to_string()))
    }

    #[test]
    fn test_starts_idle() {
        let machine = SessionMachine::default();
        assert_eq!(machine.state(), SessionState::Idle);
        assert!(!machine.is_detecting());
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_first_reading_recorded_and_displayed() {
        let mut machine = streaming();
        assert!(message(&mut machine, r#"{"distance": 1.5}"#).is_empty());

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.history.len(), 1);
        assert_eq!(snapshot.history[0].distance_meters, 1.5);
        assert_eq!(snapshot.display_distance(), "1.50 m");
        assert!(snapshot.is_detecting);
    }

    #[test]
    fn test_twelve_readings_keep_last_ten() {
        let mut machine = streaming();
        for i in 1..=12 {
            message(&mut machine, &format!(r#"{{"distance": {}}}"#, i as f64 / 10.0));
        }

        let distances: Vec<f64> = machine.history().iter().map(|e| e.distance_meters).collect();
        let expected: Vec<f64> = (3..=12).map(|i| i as f64 / 10.0).collect();
        assert_eq!(distances, expected);
        assert_eq!(machine.stats().measurements, 12);
    }

    #[test]
    fn test_negative_distance_ignored() {
        let mut machine = streaming();
        message(&mut machine, r#"{"distance": 0.8}"#);
        message(&mut machine, r#"{"distance": -1, "image": "abcd", "faceDetected": false}"#);

        assert_eq!(machine.distance_meters(), 0.8);
        assert_eq!(machine.history().len(), 1);
        assert_eq!(machine.stats().empty_readings, 1);
        assert_eq!(machine.state(), SessionState::Streaming);
        // The annotated "no face" frame is still surfaced.
        assert_eq!(
            machine.snapshot().annotated.map(|a| a.image),
            Some("abcd".to_string())
        );
    }

    #[test]
    fn test_detector_error_stops_streaming() {
        let mut machine = streaming();
        let effects = message(&mut machine, r#"{"error": "camera busy"}"#);

        assert_eq!(effects, RELEASE_ALL.to_vec());
        assert_eq!(machine.state(), SessionState::Error);
        assert!(!machine.is_detecting());
        assert_eq!(machine.last_error(), Some("camera busy"));
    }

    #[test]
    fn test_connection_lost_while_streaming() {
        let mut machine = streaming();
        let effects = machine.dispatch(Event::ChannelLost("reset by peer".into()));

        assert_eq!(effects, RELEASE_ALL.to_vec());
        assert_eq!(machine.last_error(), Some(CONNECTION_LOST));
        assert!(!machine.is_detecting());
    }

    #[test]
    fn test_connection_lost_after_stop_is_ignored() {
        let mut machine = streaming();
        machine.dispatch(Event::Stop);
        assert!(machine.dispatch(Event::ChannelLost("closed".into())).is_empty());
        assert_eq!(machine.state(), SessionState::Stopped);
        assert_eq!(machine.last_error(), None);
    }

    #[test]
    fn test_malformed_message_changes_nothing() {
        let mut machine = streaming();
        message(&mut machine, r#"{"distance": 2.0}"#);
        let before = machine.snapshot();

        assert!(message(&mut machine, "definitely not json").is_empty());

        let after = machine.snapshot();
        assert_eq!(after.state, before.state);
        assert_eq!(after.history, before.history);
        assert_eq!(after.last_error, before.last_error);
        assert_eq!(after.stats.malformed_messages, 1);
    }

    #[test]
    fn test_camera_denied_surfaces_reason() {
        let mut machine = SessionMachine::default();
        machine.dispatch(Event::Start);
        let effects = machine.dispatch(Event::CameraFailed("Permission denied".into()));

        assert_eq!(effects, RELEASE_ALL.to_vec());
        assert_eq!(machine.state(), SessionState::Error);
        assert_eq!(machine.last_error(), Some("Permission denied"));
    }

    #[test]
    fn test_retry_from_error() {
        let mut machine = streaming();
        machine.dispatch(Event::ChannelLost("gone".into()));

        assert_eq!(machine.dispatch(Event::Start), vec![Effect::AcquireCamera]);
        assert_eq!(machine.state(), SessionState::Starting);
        machine.dispatch(Event::CameraAcquired);
        // Error stays visible until the new connection opens.
        assert_eq!(machine.last_error(), Some(CONNECTION_LOST));
        machine.dispatch(Event::ChannelOpened);
        assert_eq!(machine.last_error(), None);
    }

    #[test]
    fn test_reading_clears_error() {
        let mut machine = streaming();
        machine.dispatch(Event::ChannelLost("gone".into()));
        machine.dispatch(Event::Start);
        machine.dispatch(Event::CameraAcquired);
        message(&mut machine, r#"{"distance": 0.4}"#);
        assert_eq!(machine.last_error(), None);
    }

    #[test]
    fn test_start_while_streaming_releases_first() {
        let mut machine = streaming();
        let effects = machine.dispatch(Event::Start);
        assert_eq!(
            effects,
            vec![
                Effect::StopSampling,
                Effect::CloseChannel,
                Effect::ReleaseCamera,
                Effect::AcquireCamera
            ]
        );
    }

    #[test]
    fn test_stop_releases_from_every_active_state() {
        let mut starting = SessionMachine::default();
        starting.dispatch(Event::Start);

        let mut errored = streaming();
        errored.dispatch(Event::ChannelLost("gone".into()));

        for mut machine in [starting, streaming(), errored] {
            assert_eq!(machine.dispatch(Event::Stop), RELEASE_ALL.to_vec());
            assert_eq!(machine.state(), SessionState::Stopped);
            assert!(machine.dispatch(Event::Stop).is_empty());
        }
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let mut machine = SessionMachine::default();
        assert!(machine.dispatch(Event::Stop).is_empty());
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_late_camera_grant_is_released() {
        let mut machine = SessionMachine::default();
        machine.dispatch(Event::Start);
        machine.dispatch(Event::Stop);
        assert_eq!(
            machine.dispatch(Event::CameraAcquired),
            vec![Effect::ReleaseCamera]
        );
        assert_eq!(machine.state(), SessionState::Stopped);
    }

    #[test]
    fn test_messages_outside_streaming_ignored() {
        let mut machine = SessionMachine::default();
        assert!(message(&mut machine, r#"{"distance": 1.0}"#).is_empty());
        assert!(machine.history().is_empty());
    }

    #[test]
    fn test_toggle_unit_changes_display_only() {
        let mut machine = streaming();
        message(&mut machine, r#"{"distance": 1.234}"#);

        assert_eq!(machine.toggle_unit(), DisplayUnit::Centimeters);
        assert_eq!(machine.snapshot().display_distance(), "123 cm");
        assert_eq!(machine.history().latest().unwrap().distance_meters, 1.234);

        assert_eq!(machine.toggle_unit(), DisplayUnit::Meters);
        assert_eq!(machine.snapshot().display_distance(), "1.23 m");
    }
}
