use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::PlatformError;
use crate::platform::{MediaEncoder, PcmHub};

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Encoded chunks buffered between the encoder task and the collector
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Chunked 16-bit PCM WAV encoder fed from a [`PcmHub`].
///
/// The first chunk carries the RIFF header (with zero sizes), every later
/// chunk is raw PCM. [`MediaEncoder::seal`] fixes the sizes once the chunks
/// have been joined.
pub struct WavChunkEncoder {
    hub: Arc<PcmHub>,
    stop_tx: Option<oneshot::Sender<()>>,
    started: bool,
}

impl WavChunkEncoder {
    pub fn new(hub: Arc<PcmHub>) -> Self {
        Self {
            hub,
            stop_tx: None,
            started: false,
        }
    }
}

impl MediaEncoder for WavChunkEncoder {
    fn mime_type(&self) -> &str {
        WAV_MIME_TYPE
    }

    fn start(&mut self, timeslice: Duration) -> Result<mpsc::Receiver<Vec<u8>>, PlatformError> {
        if self.started {
            return Err(PlatformError::Other("encoder already started".into()));
        }

        let header = wav_header(self.hub.sample_rate(), self.hub.channels())?;

        // Subscribe before returning so no block pushed after start is missed
        let mut pcm_rx = self.hub.subscribe();
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        self.stop_tx = Some(stop_tx);
        self.started = true;

        tokio::spawn(async move {
            let mut header = Some(header);
            let mut pending = Vec::new();

            let mut slicer =
                tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
            slicer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    block = pcm_rx.recv() => match block {
                        Some(block) => append_pcm(&mut pending, &block),
                        // Stream closed underneath us
                        None => break,
                    },
                    _ = slicer.tick() => {
                        if !flush(&chunk_tx, &mut header, &mut pending).await {
                            return;
                        }
                    }
                    // Explicit stop, or the encoder was dropped
                    _ = &mut stop_rx => break,
                }
            }

            // Whatever was already delivered belongs to the recording
            while let Ok(block) = pcm_rx.try_recv() {
                append_pcm(&mut pending, &block);
            }
            flush(&chunk_tx, &mut header, &mut pending).await;
            debug!("WAV encoder flushed final chunk");
        });

        Ok(chunk_rx)
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    fn seal(&self, assembled: &mut Vec<u8>) {
        if !assembled.is_empty() && !patch_wav_sizes(assembled) {
            warn!("Assembled recording is not a RIFF/WAVE blob; sizes left as-is");
        }
    }
}

/// Send the pending PCM (prefixed with the header on the first chunk).
///
/// Returns false once the receiving side has gone away.
async fn flush(
    chunk_tx: &mpsc::Sender<Vec<u8>>,
    header: &mut Option<Vec<u8>>,
    pending: &mut Vec<u8>,
) -> bool {
    if pending.is_empty() {
        return true;
    }

    let chunk = match header.take() {
        Some(mut chunk) => {
            chunk.append(pending);
            chunk
        }
        None => std::mem::take(pending),
    };

    debug!("WAV chunk: {} bytes", chunk.len());
    chunk_tx.send(chunk).await.is_ok()
}

fn append_pcm(pending: &mut Vec<u8>, block: &[f32]) {
    pending.reserve(block.len() * 2);
    for sample in block {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        pending.extend_from_slice(&value.to_le_bytes());
    }
}

/// Header for an empty 16-bit PCM WAV stream
pub fn wav_header(sample_rate: u32, channels: u16) -> Result<Vec<u8>, PlatformError> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut header = Vec::new();
    let writer = hound::WavWriter::new(Cursor::new(&mut header), spec)
        .map_err(|e| PlatformError::Other(format!("WAV header: {}", e)))?;
    writer
        .finalize()
        .map_err(|e| PlatformError::Other(format!("WAV header: {}", e)))?;

    Ok(header)
}

/// Rewrite the RIFF and `data` chunk sizes to match `bytes.len()`.
///
/// Returns false when the blob is not a RIFF/WAVE file with a data chunk.
pub fn patch_wav_sizes(bytes: &mut [u8]) -> bool {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return false;
    }

    let riff_size = (bytes.len() - 8) as u32;
    bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());

    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;

        if id == b"data" {
            let data_size = (bytes.len() - offset - 8) as u32;
            bytes[offset + 4..offset + 8].copy_from_slice(&data_size.to_le_bytes());
            return true;
        }

        // Chunks are word aligned
        offset += 8 + size + (size & 1);
    }

    false
}
