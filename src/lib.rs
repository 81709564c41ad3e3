pub mod analysis;
pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod platform;
pub mod recording;
pub mod session;

pub use analysis::{AnalysisLoop, FrequencyAnalyser, LevelAnalyzer, LevelSample};
pub use capture::{CaptureConstraints, CaptureMetadata, CaptureSession, CaptureSessionState};
pub use config::Config;
pub use device::{CatalogError, Device, DeviceCatalog};
pub use error::{CaptureErrorKind, PlatformError};
pub use http::{create_router, AppState};
pub use platform::{MediaPlatform, MediaStream, StreamHandle, SyntheticConfig, SyntheticPlatform};
pub use recording::{ObjectUrls, RecordingArtifact, RecordingOptions, RecordingPipeline};
pub use session::{
    ControllerOptions, SessionController, SessionError, SessionObserver, SessionPhase, StartError,
    StatusBoard, TestOutcome,
};
