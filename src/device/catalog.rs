use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::CaptureConstraints;
use crate::error::PlatformError;
use crate::platform::{DeviceKind, MediaDeviceInfo, MediaPlatform};

/// An available capture device, as of the last enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    /// Human label; absent when the platform withholds it
    pub label: Option<String>,
    pub is_default: bool,
    pub group_id: Option<String>,
}

impl Device {
    fn from_info(info: MediaDeviceInfo) -> Self {
        Self {
            label: Some(info.label).filter(|label| !label.is_empty()),
            group_id: Some(info.group_id).filter(|group| !group.is_empty()),
            is_default: info.is_default || info.device_id == "default",
            id: info.device_id,
        }
    }

    /// Label to show in a device picker
    pub fn display_label(&self, index: usize) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("Microphone {}", index + 1))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("enumeration failed: {0}")]
    EnumerationFailed(String),
}

impl CatalogError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Unable to load microphone devices. Please check your browser permissions."
            }
            Self::EnumerationFailed(_) => "Unable to load microphone devices.",
        }
    }
}

/// Tracks the last device snapshot and the user's selection
#[derive(Debug, Default, Clone)]
pub struct DeviceCatalog {
    devices: Vec<Device>,
    selected: Option<String>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate audio input devices
    ///
    /// Opens a short-lived capture grant first so the platform reveals
    /// labels, and closes it before enumerating.
    pub async fn list_input_devices(
        &mut self,
        platform: &dyn MediaPlatform,
    ) -> Result<Vec<Device>, CatalogError> {
        let grant = platform
            .acquire_stream(&CaptureConstraints::unconstrained())
            .await
            .map_err(|err| {
                warn!("Device label grant failed on {}: {}", platform.name(), err);
                match err {
                    PlatformError::NotAllowed | PlatformError::Security => {
                        CatalogError::PermissionDenied
                    }
                    other => CatalogError::EnumerationFailed(other.to_string()),
                }
            })?;
        grant.stop_tracks();
        debug!("Label grant stream {} released", grant.id());

        let infos = platform
            .enumerate_devices()
            .await
            .map_err(|err| CatalogError::EnumerationFailed(err.to_string()))?;

        self.devices = infos
            .into_iter()
            .filter(|info| info.kind == DeviceKind::AudioInput)
            .map(Device::from_info)
            .collect();

        info!(
            "Found {} input device(s) on {}",
            self.devices.len(),
            platform.name()
        );

        Ok(self.devices.clone())
    }

    /// Choose a device; `None` means the platform default. No I/O.
    pub fn select(&mut self, device_id: Option<String>) {
        self.selected = device_id.filter(|id| !id.is_empty());
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Last enumeration snapshot
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn find(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|device| device.id == device_id)
    }
}
