use tracing::{debug, info, warn};

use super::constraints::CaptureConstraints;
use super::metadata::CaptureMetadata;
use crate::device::Device;
use crate::error::CaptureErrorKind;
use crate::platform::{MediaPlatform, StreamHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSessionState {
    Idle,
    Open,
    /// Terminal; a new test needs a new session
    Closed,
}

/// Owns exactly one live capture stream and the metadata derived from it.
///
/// Dropping the session closes the stream.
pub struct CaptureSession {
    state: CaptureSessionState,
    stream: Option<StreamHandle>,
    metadata: Option<CaptureMetadata>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: CaptureSessionState::Idle,
            stream: None,
            metadata: None,
        }
    }

    pub fn state(&self) -> CaptureSessionState {
        self.state
    }

    /// Acquire the stream and derive metadata from its negotiated settings.
    ///
    /// `selected_device` is merged into `constraints` as an exact match;
    /// `devices` is the last catalog snapshot used to resolve the label.
    pub async fn open(
        &mut self,
        platform: &dyn MediaPlatform,
        constraints: CaptureConstraints,
        selected_device: Option<&str>,
        devices: &[Device],
    ) -> Result<(StreamHandle, CaptureMetadata), CaptureErrorKind> {
        if self.state != CaptureSessionState::Idle {
            return Err(CaptureErrorKind::Unknown(
                "capture session can only be opened once".into(),
            ));
        }

        let constraints = constraints.with_device(selected_device);
        debug!("Requesting capture stream with {:?}", constraints);

        let stream = match platform.acquire_stream(&constraints).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Capture acquisition failed on {}: {}", platform.name(), err);
                self.state = CaptureSessionState::Closed;
                return Err(CaptureErrorKind::from(err));
            }
        };

        let metadata = CaptureMetadata::derive(&stream.settings(), &constraints, devices);

        info!(
            "Capture stream {} open: {} ({} Hz, {} bit, {} ch)",
            stream.id(),
            metadata.device_name,
            metadata.sample_rate,
            metadata.sample_size,
            metadata.channel_count
        );

        self.stream = Some(stream.clone());
        self.metadata = Some(metadata.clone());
        self.state = CaptureSessionState::Open;

        Ok((stream, metadata))
    }

    pub fn stream(&self) -> Option<&StreamHandle> {
        self.stream.as_ref()
    }

    pub fn metadata(&self) -> Option<&CaptureMetadata> {
        self.metadata.as_ref()
    }

    /// Stop every track. Idempotent.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop_tracks();
            info!("Capture stream {} closed", stream.id());
        }
        self.state = CaptureSessionState::Closed;
    }
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
