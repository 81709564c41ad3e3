use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureMetadata;
use crate::recording::{ObjectUrl, RecordingArtifact};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Passed,
}

/// Where the finished recording can be fetched from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedRecording {
    /// Transient `blob:` URL, valid until the next reset
    pub url: String,
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: usize,
    pub duration_ms: u64,
}

impl CompletedRecording {
    pub fn new(url: &ObjectUrl, artifact: &RecordingArtifact) -> Self {
        Self {
            url: url.url().to_string(),
            id: url.id().to_string(),
            filename: artifact.suggested_filename(),
            mime_type: artifact.mime_type().to_string(),
            size_bytes: artifact.size_bytes(),
            duration_ms: artifact.duration_ms(),
        }
    }
}

/// Result of one completed test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_date: DateTime<Utc>,
    /// From `start()` to `stop()`
    pub duration_ms: u64,
    pub microphone_label: String,
    pub metadata: CaptureMetadata,
    pub status: TestStatus,
    pub has_recording: bool,
    pub recording: Option<CompletedRecording>,
    /// The platform ended the track before the user stopped the test
    pub ended_unexpectedly: bool,
}
