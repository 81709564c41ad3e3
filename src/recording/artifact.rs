use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::mime::file_extension;

/// The assembled recording of one test. Immutable once built.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    data: Arc<Vec<u8>>,
    mime_type: String,
    duration_ms: u64,
    chunk_count: usize,
    created_at: DateTime<Utc>,
}

impl RecordingArtifact {
    pub fn new(
        data: Vec<u8>,
        mime_type: impl Into<String>,
        duration_ms: u64,
        chunk_count: usize,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data: Arc::new(data),
            mime_type: mime_type.into(),
            duration_ms,
            chunk_count,
            created_at,
        }
    }

    /// False when no non-empty chunk was delivered
    pub fn has_recording(&self) -> bool {
        self.chunk_count > 0 && !self.data.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn data(&self) -> Arc<Vec<u8>> {
        self.data.clone()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn file_extension(&self) -> &'static str {
        file_extension(&self.mime_type)
    }

    /// `microphone-test-<unix millis>.<ext>`
    pub fn suggested_filename(&self) -> String {
        format!(
            "microphone-test-{}.{}",
            self.created_at.timestamp_millis(),
            self.file_extension()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn empty_artifact_has_no_recording() {
        let artifact = RecordingArtifact::new(Vec::new(), "audio/webm", 0, 0, Utc::now());
        assert!(!artifact.has_recording());
        assert_eq!(artifact.size_bytes(), 0);
    }

    #[test]
    fn filename_uses_creation_millis_and_mime() {
        let created = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let artifact = RecordingArtifact::new(vec![1, 2, 3], "audio/mp4", 1500, 1, created);

        assert!(artifact.has_recording());
        assert_eq!(artifact.suggested_filename(), "microphone-test-1700000000123.m4a");
    }
}
