use serde::{Deserialize, Serialize};

/// Requested capture settings. Advisory: the platform may ignore any field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Exact device id to capture from (`None` = platform default)
    pub device_id: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Sample rate hint in Hz
    pub sample_rate: Option<u32>,
    /// Bits per sample hint
    pub sample_size: Option<u16>,
    pub channel_count: Option<u16>,
}

impl CaptureConstraints {
    /// Bare "any microphone" request used to unlock device labels.
    pub fn unconstrained() -> Self {
        Self {
            device_id: None,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
            sample_rate: None,
            sample_size: None,
            channel_count: None,
        }
    }

    /// Merge a device selection into the constraints.
    ///
    /// A specific id becomes an exact-match requirement; `None` keeps
    /// whatever the constraints already ask for.
    pub fn with_device(mut self, device_id: Option<&str>) -> Self {
        if let Some(id) = device_id.filter(|id| !id.is_empty()) {
            self.device_id = Some(id.to_string());
        }
        self
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: Some(48000),
            sample_size: Some(16),
            channel_count: Some(1),
        }
    }
}
