//! Capture stream acquisition and device metadata

mod constraints;
mod metadata;
mod session;

pub use constraints::CaptureConstraints;
pub use metadata::{CaptureMetadata, DEFAULT_DEVICE_NAME};
pub use session::{CaptureSession, CaptureSessionState};
