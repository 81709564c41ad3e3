use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use super::outcome::TestOutcome;
use super::state::{SessionPhase, STATUS_IDLE};
use crate::analysis::LevelSample;
use crate::capture::CaptureMetadata;
use crate::device::Device;
use crate::error::CaptureErrorKind;

/// Outbound notifications from the session controller.
///
/// Called synchronously from controller and analysis tasks; implementations
/// must return quickly and must not call back into the controller.
pub trait SessionObserver: Send + Sync {
    fn on_phase(&self, _phase: SessionPhase) {}

    fn on_status(&self, _status: &str) {}

    fn on_error(&self, _kind: &CaptureErrorKind, _message: &str) {}

    fn on_devices(&self, _devices: &[Device]) {}

    fn on_metadata(&self, _metadata: &CaptureMetadata) {}

    /// Once per analysis tick
    fn on_level(&self, _sample: &LevelSample) {}

    fn on_completed(&self, _outcome: &TestOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: CaptureErrorKind,
    pub message: String,
}

/// Everything a status view needs to render
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub phase: SessionPhase,
    pub status: String,
    pub error: Option<ErrorReport>,
    pub devices: Vec<Device>,
    pub metadata: Option<CaptureMetadata>,
    pub level: Option<LevelSample>,
    pub outcome: Option<TestOutcome>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            status: STATUS_IDLE.to_string(),
            error: None,
            devices: Vec::new(),
            metadata: None,
            level: None,
            outcome: None,
        }
    }
}

/// Observer that keeps the latest notification of each kind
#[derive(Debug, Default)]
pub struct StatusBoard {
    snapshot: RwLock<StatusSnapshot>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.read().clone()
    }
}

impl SessionObserver for StatusBoard {
    fn on_phase(&self, phase: SessionPhase) {
        info!("Session phase: {}", phase);
        let mut snapshot = self.snapshot.write();
        snapshot.phase = phase;
        match phase {
            // A new attempt hides the previous error
            SessionPhase::Requesting => snapshot.error = None,
            SessionPhase::Active => {}
            SessionPhase::Stopping | SessionPhase::Completed => snapshot.level = None,
            SessionPhase::Idle => {
                snapshot.level = None;
                if snapshot.error.is_none() {
                    snapshot.metadata = None;
                    snapshot.outcome = None;
                }
            }
            SessionPhase::Failed => snapshot.level = None,
        }
    }

    fn on_status(&self, status: &str) {
        info!("Status: {}", status);
        self.snapshot.write().status = status.to_string();
    }

    fn on_error(&self, kind: &CaptureErrorKind, message: &str) {
        warn!("Error ({}): {}", kind.code(), message);
        self.snapshot.write().error = Some(ErrorReport {
            kind: kind.clone(),
            message: message.to_string(),
        });
    }

    fn on_devices(&self, devices: &[Device]) {
        self.snapshot.write().devices = devices.to_vec();
    }

    fn on_metadata(&self, metadata: &CaptureMetadata) {
        info!(
            "Microphone: {} ({} Hz, {} bit, {} ch, latency {})",
            metadata.device_name,
            metadata.sample_rate,
            metadata.sample_size,
            metadata.channel_count,
            metadata.latency_display()
        );
        self.snapshot.write().metadata = Some(metadata.clone());
    }

    fn on_level(&self, sample: &LevelSample) {
        self.snapshot.write().level = Some(sample.clone());
    }

    fn on_completed(&self, outcome: &TestOutcome) {
        info!(
            "Test completed: {} ms, recording: {}",
            outcome.duration_ms, outcome.has_recording
        );
        self.snapshot.write().outcome = Some(outcome.clone());
    }
}
