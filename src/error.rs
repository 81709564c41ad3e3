use serde::{Serialize, Serializer};
use thiserror::Error;

/// Raw failure reported by the host media platform.
///
/// Variant names follow the platform's own error names; [`CaptureErrorKind`]
/// is what gets surfaced to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not allowed")]
    NotAllowed,

    #[error("not found")]
    NotFound,

    #[error("not readable")]
    NotReadable,

    #[error("overconstrained: {constraint}")]
    Overconstrained { constraint: String },

    #[error("aborted")]
    Aborted,

    #[error("security error")]
    Security,

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

/// Taxonomized capture failure. Each kind maps to a fixed user message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    #[error("permission denied")]
    PermissionDenied,

    #[error("device not found")]
    DeviceNotFound,

    #[error("device busy")]
    DeviceBusy,

    #[error("constraints unsatisfiable")]
    ConstraintsUnsatisfiable,

    #[error("security blocked")]
    SecurityBlocked,

    #[error("aborted by platform")]
    AbortedByPlatform,

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureErrorKind {
    /// Stable identifier used in JSON payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::DeviceNotFound => "device_not_found",
            Self::DeviceBusy => "device_busy",
            Self::ConstraintsUnsatisfiable => "constraints_unsatisfiable",
            Self::SecurityBlocked => "security_blocked",
            Self::AbortedByPlatform => "aborted_by_platform",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Human message shown to the user for this kind.
    pub fn user_message(&self) -> String {
        let detail = match self {
            Self::PermissionDenied => {
                "Permission denied. Please allow microphone access and try again.".to_string()
            }
            Self::DeviceNotFound => {
                "No microphone found. Please connect a microphone and refresh the page."
                    .to_string()
            }
            Self::DeviceBusy => "Microphone is already in use by another application.".to_string(),
            Self::ConstraintsUnsatisfiable => {
                "Selected microphone device is not available.".to_string()
            }
            Self::AbortedByPlatform => "Request was aborted.".to_string(),
            Self::SecurityBlocked => "Security error. Please use HTTPS or localhost.".to_string(),
            Self::Unknown(message) => format!("Error: {}", message),
        };
        format!("Unable to access microphone. {}", detail)
    }
}

impl From<PlatformError> for CaptureErrorKind {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NotAllowed => Self::PermissionDenied,
            PlatformError::NotFound => Self::DeviceNotFound,
            // An exact device id the platform cannot satisfy means the device is gone
            PlatformError::Overconstrained { constraint } if constraint == "deviceId" => {
                Self::DeviceNotFound
            }
            PlatformError::Overconstrained { .. } => Self::ConstraintsUnsatisfiable,
            PlatformError::NotReadable => Self::DeviceBusy,
            PlatformError::Security => Self::SecurityBlocked,
            PlatformError::Aborted => Self::AbortedByPlatform,
            PlatformError::NotSupported(message) | PlatformError::Other(message) => {
                Self::Unknown(message)
            }
        }
    }
}

impl Serialize for CaptureErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}
