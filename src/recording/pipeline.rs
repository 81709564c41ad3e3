use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::artifact::RecordingArtifact;
use super::mime::{select_mime_type, DEFAULT_MIME_PREFERENCES, FALLBACK_MIME_TYPE};
use crate::error::PlatformError;
use crate::platform::{EncoderOptions, MediaEncoder, MediaPlatform, MediaStream};

/// Recording configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingOptions {
    /// How often the encoder delivers a chunk
    pub timeslice: Duration,
    pub audio_bits_per_second: u32,
    /// Tried in order; the first the platform supports wins
    pub mime_preferences: Vec<String>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self {
            timeslice: Duration::from_millis(1000),
            audio_bits_per_second: 128_000,
            mime_preferences: DEFAULT_MIME_PREFERENCES
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Collects encoded chunks for one capture session.
///
/// Starting never fails: when no encoder can be created the pipeline runs
/// degraded and yields an empty artifact.
pub struct RecordingPipeline {
    encoder: Option<Box<dyn MediaEncoder>>,
    collector: Option<JoinHandle<Vec<Vec<u8>>>>,
    mime_type: String,
    started_at: Instant,
}

impl RecordingPipeline {
    pub fn start(
        platform: &dyn MediaPlatform,
        stream: &dyn MediaStream,
        options: &RecordingOptions,
    ) -> Self {
        let started_at = Instant::now();
        let requested = select_mime_type(platform, &options.mime_preferences);
        if requested.is_none() {
            debug!("No preferred mime type supported; using the platform default");
        }

        let encoder_options = EncoderOptions {
            mime_type: requested.clone(),
            audio_bits_per_second: options.audio_bits_per_second,
        };

        match open_encoder(stream, &encoder_options, options.timeslice) {
            Ok((encoder, chunk_rx)) => {
                let mime_type = match encoder.mime_type() {
                    "" => FALLBACK_MIME_TYPE.to_string(),
                    reported => reported.to_string(),
                };
                info!(
                    "Recording started: {} ({:?} timeslice)",
                    mime_type, options.timeslice
                );

                Self {
                    encoder: Some(encoder),
                    collector: Some(tokio::spawn(collect_chunks(chunk_rx))),
                    mime_type,
                    started_at,
                }
            }
            Err(e) => {
                warn!("Recording unavailable, continuing without it: {}", e);
                Self {
                    encoder: None,
                    collector: None,
                    mime_type: requested.unwrap_or_else(|| FALLBACK_MIME_TYPE.to_string()),
                    started_at,
                }
            }
        }
    }

    pub fn is_recording(&self) -> bool {
        self.encoder.is_some()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Stop the encoder and wait for its final chunk, then assemble.
    pub async fn stop(mut self) -> RecordingArtifact {
        let duration_ms = self.started_at.elapsed().as_millis() as u64;

        if let Some(encoder) = self.encoder.as_mut() {
            encoder.stop();
        }

        let chunks = match self.collector.take() {
            Some(collector) => match collector.await {
                Ok(chunks) => chunks,
                Err(e) => {
                    error!("Chunk collector failed: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let chunk_count = chunks.len();
        let mut data = chunks.concat();
        if let Some(encoder) = self.encoder.as_ref() {
            encoder.seal(&mut data);
        }

        info!(
            "Recording stopped: {} chunks, {} bytes, {} ms",
            chunk_count,
            data.len(),
            duration_ms
        );

        RecordingArtifact::new(data, self.mime_type.clone(), duration_ms, chunk_count, Utc::now())
    }
}

impl Drop for RecordingPipeline {
    fn drop(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.stop();
        }
        if let Some(collector) = self.collector.take() {
            collector.abort();
        }
    }
}

fn open_encoder(
    stream: &dyn MediaStream,
    options: &EncoderOptions,
    timeslice: Duration,
) -> Result<(Box<dyn MediaEncoder>, mpsc::Receiver<Vec<u8>>), PlatformError> {
    let mut encoder = stream.create_encoder(options)?;
    let chunk_rx = encoder.start(timeslice)?;
    Ok((encoder, chunk_rx))
}

async fn collect_chunks(mut chunk_rx: mpsc::Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    while let Some(chunk) = chunk_rx.recv().await {
        // Empty deliveries are not part of the recording
        if chunk.is_empty() {
            continue;
        }
        debug!("Recording chunk {}: {} bytes", chunks.len(), chunk.len());
        chunks.push(chunk);
    }
    chunks
}
