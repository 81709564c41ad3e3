//! Software media host: a sine tone generator with a configurable device list

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use super::pcm::{PcmAnalyserTap, PcmHub};
use super::{
    AnalyserOptions, AnalyserTap, DeviceKind, EncoderOptions, MediaDeviceInfo, MediaEncoder,
    MediaPlatform, MediaStream, StreamHandle, TrackSettings,
};
use crate::capture::CaptureConstraints;
use crate::error::PlatformError;
use crate::recording::{WavChunkEncoder, WAV_MIME_TYPE};

/// Generator period
const BLOCK_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticDevice {
    pub id: String,
    pub label: String,
    pub group_id: String,
    pub is_default: bool,
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            label: "Synthetic Microphone".to_string(),
            group_id: "synthetic".to_string(),
            is_default: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Tone frequency in Hz
    pub tone_hz: f32,
    /// Peak amplitude in `[0, 1]`
    pub amplitude: f32,
    /// Rate used when the constraints do not ask for one
    pub sample_rate: u32,
    /// Reported input latency in seconds
    pub latency_secs: Option<f64>,
    pub devices: Vec<SyntheticDevice>,
    /// Encodable types; empty disables recording
    pub mime_types: Vec<String>,
    /// Refuse every capture request
    pub deny_permission: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            tone_hz: 440.0,
            amplitude: 0.25,
            sample_rate: 48000,
            latency_secs: Some(0.01),
            devices: vec![
                SyntheticDevice::default(),
                SyntheticDevice {
                    id: "synthetic-usb".to_string(),
                    label: "Synthetic USB Microphone".to_string(),
                    group_id: "synthetic-usb".to_string(),
                    is_default: false,
                },
            ],
            mime_types: vec![WAV_MIME_TYPE.to_string()],
            deny_permission: false,
        }
    }
}

pub struct SyntheticPlatform {
    config: SyntheticConfig,
    /// Labels are only revealed after the first grant
    granted: AtomicBool,
    streams: Mutex<Vec<Weak<SyntheticStream>>>,
}

impl SyntheticPlatform {
    pub fn new(config: SyntheticConfig) -> Self {
        info!(
            "Synthetic platform: {} Hz tone, {} devices",
            config.tone_hz,
            config.devices.len()
        );
        Self {
            config,
            granted: AtomicBool::new(false),
            streams: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Streams that are still capturing
    pub fn live_streams(&self) -> usize {
        let mut streams = self.streams.lock();
        streams.retain(|s| s.strong_count() > 0);
        streams
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|s| s.is_live())
            .count()
    }

    /// End every live stream as if its device had been unplugged
    pub fn disconnect_all(&self) {
        let streams: Vec<_> = self.streams.lock().iter().filter_map(Weak::upgrade).collect();
        for stream in streams {
            stream.end_unexpectedly();
        }
    }

    fn resolve_device(&self, requested: Option<&str>) -> Result<&SyntheticDevice, PlatformError> {
        match requested {
            Some(id) => self
                .config
                .devices
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| PlatformError::Overconstrained {
                    constraint: "deviceId".to_string(),
                }),
            None => self
                .config
                .devices
                .iter()
                .find(|d| d.is_default)
                .or_else(|| self.config.devices.first())
                .ok_or(PlatformError::NotFound),
        }
    }
}

impl Default for SyntheticPlatform {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait::async_trait]
impl MediaPlatform for SyntheticPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, PlatformError> {
        let granted = self.granted.load(Ordering::SeqCst);
        let mut devices: Vec<MediaDeviceInfo> = self
            .config
            .devices
            .iter()
            .map(|d| MediaDeviceInfo {
                kind: DeviceKind::AudioInput,
                device_id: d.id.clone(),
                label: if granted { d.label.clone() } else { String::new() },
                group_id: d.group_id.clone(),
                is_default: d.is_default,
            })
            .collect();

        devices.push(MediaDeviceInfo {
            kind: DeviceKind::AudioOutput,
            device_id: "synthetic-speakers".to_string(),
            label: if granted { "Synthetic Speakers".to_string() } else { String::new() },
            group_id: "synthetic".to_string(),
            is_default: true,
        });

        Ok(devices)
    }

    async fn acquire_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<StreamHandle, PlatformError> {
        if self.config.deny_permission {
            return Err(PlatformError::NotAllowed);
        }

        let device = self.resolve_device(constraints.device_id.as_deref())?;
        let sample_rate = constraints
            .sample_rate
            .filter(|rate| (8000..=192_000).contains(rate))
            .unwrap_or(self.config.sample_rate);
        let channels = constraints.channel_count.unwrap_or(1).clamp(1, 2);

        let settings = TrackSettings {
            device_id: Some(device.id.clone()),
            group_id: Some(device.group_id.clone()),
            sample_rate: Some(sample_rate),
            sample_size: Some(16),
            channel_count: Some(channels),
            echo_cancellation: Some(constraints.echo_cancellation),
            noise_suppression: Some(constraints.noise_suppression),
            auto_gain_control: Some(constraints.auto_gain_control),
            latency: self.config.latency_secs,
        };

        let stream = SyntheticStream::spawn(settings, &self.config);
        self.granted.store(true, Ordering::SeqCst);
        self.streams.lock().push(Arc::downgrade(&stream));

        Ok(stream)
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        self.config.mime_types.iter().any(|m| m == mime_type)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

pub struct SyntheticStream {
    id: String,
    settings: TrackSettings,
    hub: Arc<PcmHub>,
    mime_types: Vec<String>,
    live: AtomicBool,
    ended_tx: watch::Sender<bool>,
    generator: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticStream {
    fn spawn(settings: TrackSettings, config: &SyntheticConfig) -> Arc<Self> {
        let sample_rate = settings.sample_rate.unwrap_or(config.sample_rate);
        let channels = settings.channel_count.unwrap_or(1);
        let hub = PcmHub::new(sample_rate, channels);
        let (ended_tx, _) = watch::channel(false);

        let generator = tokio::spawn(generate_tone(
            hub.clone(),
            config.tone_hz,
            config.amplitude.clamp(0.0, 1.0),
        ));

        let stream = Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            settings,
            hub,
            mime_types: config.mime_types.clone(),
            live: AtomicBool::new(true),
            ended_tx,
            generator: Mutex::new(Some(generator)),
        });

        debug!("Synthetic stream {} started ({} Hz, {} ch)", stream.id, sample_rate, channels);
        stream
    }

    fn halt(&self) -> bool {
        if !self.live.swap(false, Ordering::SeqCst) {
            return false;
        }
        if let Some(generator) = self.generator.lock().take() {
            generator.abort();
        }
        self.hub.close();
        true
    }

    /// Platform-side end of the track
    pub fn end_unexpectedly(&self) {
        if self.halt() {
            info!("Synthetic stream {} ended by the platform", self.id);
            self.ended_tx.send_replace(true);
        }
    }
}

impl MediaStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn stop_tracks(&self) {
        if self.halt() {
            debug!("Synthetic stream {} stopped", self.id);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended_tx.subscribe()
    }

    fn create_analyser(
        &self,
        options: AnalyserOptions,
    ) -> Result<Box<dyn AnalyserTap>, PlatformError> {
        if !self.is_live() {
            return Err(PlatformError::Other("stream has ended".to_string()));
        }
        Ok(Box::new(PcmAnalyserTap::new(self.hub.clone(), options)?))
    }

    fn create_encoder(
        &self,
        options: &EncoderOptions,
    ) -> Result<Box<dyn MediaEncoder>, PlatformError> {
        if !self.is_live() {
            return Err(PlatformError::Other("stream has ended".to_string()));
        }

        let wav_supported = self.mime_types.iter().any(|m| m == WAV_MIME_TYPE);
        let accepted = match options.mime_type.as_deref() {
            None => wav_supported,
            Some(mime) => mime == WAV_MIME_TYPE && wav_supported,
        };
        if !accepted {
            return Err(PlatformError::NotSupported(format!(
                "no encoder for {}",
                options.mime_type.as_deref().unwrap_or("default type")
            )));
        }

        Ok(Box::new(WavChunkEncoder::new(self.hub.clone())))
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.halt();
    }
}

async fn generate_tone(hub: Arc<PcmHub>, tone_hz: f32, amplitude: f32) {
    let sample_rate = hub.sample_rate().max(1);
    let channels = hub.channels() as usize;
    let frames_per_block = (sample_rate as u64 * BLOCK_INTERVAL.as_millis() as u64 / 1000) as usize;
    let step = 2.0 * PI * tone_hz / sample_rate as f32;

    let mut phase = 0.0f32;
    let mut block = vec![0.0f32; frames_per_block * channels];
    let mut ticker = tokio::time::interval(BLOCK_INTERVAL);

    loop {
        ticker.tick().await;
        for frame in block.chunks_mut(channels) {
            let sample = amplitude * phase.sin();
            frame.iter_mut().for_each(|s| *s = sample);
            phase = (phase + step) % (2.0 * PI);
        }
        hub.push(&block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn labels_hidden_until_granted() {
        let platform = SyntheticPlatform::default();

        let before = platform.enumerate_devices().await.unwrap();
        assert!(before.iter().all(|d| d.label.is_empty()));

        let stream = platform
            .acquire_stream(&CaptureConstraints::unconstrained())
            .await
            .unwrap();
        stream.stop_tracks();

        let after = platform.enumerate_devices().await.unwrap();
        assert_eq!(after[0].label, "Synthetic Microphone");
    }

    #[tokio::test]
    async fn unknown_exact_device_is_overconstrained() {
        let platform = SyntheticPlatform::default();
        let constraints = CaptureConstraints::default().with_device(Some("X"));

        match platform.acquire_stream(&constraints).await {
            Err(PlatformError::Overconstrained { constraint }) => {
                assert_eq!(constraint, "deviceId")
            }
            other => panic!("unexpected: {:?}", other.map(|s| s.id().to_string())),
        }
    }

    #[tokio::test]
    async fn stop_does_not_fire_ended_but_disconnect_does() {
        let platform = SyntheticPlatform::default();

        let stopped = platform
            .acquire_stream(&CaptureConstraints::default())
            .await
            .unwrap();
        let stopped_ended = stopped.ended();
        stopped.stop_tracks();
        stopped.stop_tracks();
        assert!(!stopped.is_live());
        assert!(!*stopped_ended.borrow());

        let unplugged = platform
            .acquire_stream(&CaptureConstraints::default())
            .await
            .unwrap();
        let mut ended = unplugged.ended();
        assert_eq!(platform.live_streams(), 1);

        platform.disconnect_all();
        ended.changed().await.unwrap();
        assert!(*ended.borrow());
        assert_eq!(platform.live_streams(), 0);
    }

    #[tokio::test]
    async fn encoder_requires_wav() {
        let platform = SyntheticPlatform::default();
        assert!(platform.supports_mime_type("audio/wav"));
        assert!(!platform.supports_mime_type("audio/webm;codecs=opus"));

        let stream = platform
            .acquire_stream(&CaptureConstraints::default())
            .await
            .unwrap();
        let webm = EncoderOptions {
            mime_type: Some("audio/webm;codecs=opus".to_string()),
            audio_bits_per_second: 128_000,
        };
        assert!(stream.create_encoder(&webm).is_err());

        let default = EncoderOptions {
            mime_type: None,
            audio_bits_per_second: 128_000,
        };
        assert!(stream.create_encoder(&default).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn tone_reaches_analyser() {
        let platform = SyntheticPlatform::default();
        let stream = platform
            .acquire_stream(&CaptureConstraints::default())
            .await
            .unwrap();
        let mut tap = stream.create_analyser(AnalyserOptions::default()).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut bins = vec![0u8; tap.frequency_bin_count()];
        tap.byte_frequency_data(&mut bins);
        // 440 Hz at 48 kHz with 2048 points lands near bin 18.8
        assert!(bins[18] > 200 || bins[19] > 200);
    }
}
