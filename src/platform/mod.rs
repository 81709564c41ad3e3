//! Host media platform adapter
//!
//! Everything the core needs from the outside world goes through these
//! traits: device enumeration, stream acquisition, frequency snapshots and
//! encoded chunk delivery. Implementations:
//! - `SyntheticPlatform`: software tone generator (CLI default, tests)
//! - `CpalPlatform`: real microphones through cpal (feature `host-audio`)

pub mod pcm;
pub mod synthetic;

#[cfg(feature = "host-audio")]
pub mod cpal_host;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::capture::CaptureConstraints;
use crate::error::PlatformError;

pub use pcm::PcmHub;
pub use synthetic::{SyntheticConfig, SyntheticPlatform};

#[cfg(feature = "host-audio")]
pub use cpal_host::CpalPlatform;

/// Shared handle to one live capture stream.
pub type StreamHandle = Arc<dyn MediaStream>;

/// Kind of a device reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

/// Raw enumeration entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDeviceInfo {
    pub kind: DeviceKind,
    pub device_id: String,
    /// Empty until the platform has granted capture at least once
    pub label: String,
    pub group_id: String,
    pub is_default: bool,
}

/// Settings actually negotiated for a live track.
///
/// Every field is optional: platforms report what they know.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSettings {
    pub device_id: Option<String>,
    pub group_id: Option<String>,
    pub sample_rate: Option<u32>,
    pub sample_size: Option<u16>,
    pub channel_count: Option<u16>,
    pub echo_cancellation: Option<bool>,
    pub noise_suppression: Option<bool>,
    pub auto_gain_control: Option<bool>,
    /// Input latency in seconds
    pub latency: Option<f64>,
}

/// Analyser node configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyserOptions {
    /// FFT window length; `fft_size / 2` frequency bins are produced
    pub fft_size: usize,
    /// Temporal smoothing constant in `[0, 1)`
    pub smoothing: f32,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.3,
        }
    }
}

/// Encoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Negotiated mime type, or `None` for the platform default
    pub mime_type: Option<String>,
    pub audio_bits_per_second: u32,
}

#[async_trait::async_trait]
pub trait MediaPlatform: Send + Sync {
    /// List every device the platform knows about
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, PlatformError>;

    /// Acquire a live capture stream
    ///
    /// Suspends until the platform grants or denies access.
    async fn acquire_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<StreamHandle, PlatformError>;

    /// Whether an encoder for `mime_type` can be created
    fn supports_mime_type(&self, mime_type: &str) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// One live capture stream
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    /// Negotiated settings of the audio track
    fn settings(&self) -> TrackSettings;

    /// Stop every track. Idempotent.
    fn stop_tracks(&self);

    fn is_live(&self) -> bool;

    /// Flips to `true` when the platform ends the track on its own
    /// (device unplugged, revoked permission). Never fired by `stop_tracks`.
    fn ended(&self) -> watch::Receiver<bool>;

    fn create_analyser(&self, options: AnalyserOptions)
        -> Result<Box<dyn AnalyserTap>, PlatformError>;

    fn create_encoder(&self, options: &EncoderOptions)
        -> Result<Box<dyn MediaEncoder>, PlatformError>;
}

impl std::fmt::Debug for dyn MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream").field("id", &self.id()).finish()
    }
}

/// Frequency-domain tap on a stream
pub trait AnalyserTap: Send {
    fn frequency_bin_count(&self) -> usize;

    /// Copy the current byte magnitudes (0-255) into `out`
    fn byte_frequency_data(&mut self, out: &mut [u8]);

    /// Disconnect from the stream. Safe to call more than once.
    fn disconnect(&mut self);
}

/// Chunked encoder attached to a stream
pub trait MediaEncoder: Send {
    /// Mime type the encoder actually produces
    fn mime_type(&self) -> &str;

    /// Begin encoding, delivering a chunk roughly every `timeslice`
    ///
    /// The receiver closes only after the final chunk has been flushed.
    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<Vec<u8>>, PlatformError>;

    /// Ask the encoder to flush its final chunk and close the channel
    fn stop(&mut self);

    /// Fix up container headers of the assembled recording
    fn seal(&self, _assembled: &mut Vec<u8>) {}
}
