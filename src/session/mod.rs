//! Microphone test session management
//!
//! `SessionController` coordinates one test at a time:
//! - opening the capture session for the selected device
//! - driving level analysis and chunked recording off the live stream
//! - assembling the recording and publishing it as a transient object URL
//! - notifying a `SessionObserver` of every state change

mod controller;
mod observer;
mod outcome;
mod state;

pub use controller::{
    ControllerOptions, SessionController, SessionError, StartError, DEFAULT_BUCKET_COUNT,
};
pub use observer::{ErrorReport, NoopObserver, SessionObserver, StatusBoard, StatusSnapshot};
pub use outcome::{CompletedRecording, TestOutcome, TestStatus};
pub use state::{
    SessionPhase, NO_MICROPHONES, STATUS_ACTIVE, STATUS_COMPLETED, STATUS_ENDED_UNEXPECTEDLY,
    STATUS_IDLE, STATUS_REQUESTING,
};
