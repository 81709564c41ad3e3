use serde::{Deserialize, Serialize};

use super::constraints::CaptureConstraints;
use crate::device::Device;
use crate::platform::TrackSettings;

/// Label used when the negotiated device is not in the catalog snapshot
pub const DEFAULT_DEVICE_NAME: &str = "Default Microphone";

const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_SAMPLE_SIZE: u16 = 16;
const DEFAULT_CHANNEL_COUNT: u16 = 1;

/// Device information derived once from the negotiated stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub device_name: String,
    pub device_id: String,
    pub sample_rate: u32,
    pub sample_size: u16,
    pub channel_count: u16,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// `None` when the platform does not report latency
    pub estimated_latency_ms: Option<f64>,
    pub group_id: String,
}

impl CaptureMetadata {
    /// Build metadata from what the platform actually negotiated.
    ///
    /// Zero or missing values fall back to defaults so sizes are always
    /// at least one.
    pub fn derive(
        settings: &TrackSettings,
        requested: &CaptureConstraints,
        devices: &[Device],
    ) -> Self {
        let matched = settings
            .device_id
            .as_deref()
            .and_then(|id| devices.iter().find(|device| device.id == id));

        let device_name = matched
            .and_then(|device| device.label.clone())
            .unwrap_or_else(|| DEFAULT_DEVICE_NAME.to_string());

        let device_id = settings
            .device_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| "default".to_string());

        let group_id = matched
            .and_then(|device| device.group_id.clone())
            .or_else(|| settings.group_id.clone().filter(|group| !group.is_empty()))
            .unwrap_or_else(|| "Unknown".to_string());

        let sample_rate = settings
            .sample_rate
            .filter(|rate| *rate > 0)
            .or(requested.sample_rate.filter(|rate| *rate > 0))
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        Self {
            device_name,
            device_id,
            sample_rate,
            sample_size: settings
                .sample_size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_SAMPLE_SIZE),
            channel_count: settings
                .channel_count
                .filter(|count| *count > 0)
                .unwrap_or(DEFAULT_CHANNEL_COUNT),
            echo_cancellation: settings.echo_cancellation.unwrap_or(false),
            noise_suppression: settings.noise_suppression.unwrap_or(false),
            auto_gain_control: settings.auto_gain_control.unwrap_or(false),
            estimated_latency_ms: settings
                .latency
                .filter(|latency| latency.is_finite() && *latency >= 0.0)
                .map(|latency| (latency * 1000.0 * 100.0).round() / 100.0),
            group_id,
        }
    }

    /// Latency formatted for display ("Unknown" when unreported)
    pub fn latency_display(&self) -> String {
        match self.estimated_latency_ms {
            Some(ms) => format!("{:.2} ms", ms),
            None => "Unknown".to_string(),
        }
    }
}
