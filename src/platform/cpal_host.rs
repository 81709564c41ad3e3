//! Real microphones through cpal
//!
//! `cpal::Stream` is not `Send`, so every acquired stream lives on its own
//! capture thread which builds, plays and finally drops it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::pcm::{PcmAnalyserTap, PcmHub};
use super::{
    AnalyserOptions, AnalyserTap, DeviceKind, EncoderOptions, MediaDeviceInfo, MediaEncoder,
    MediaPlatform, MediaStream, StreamHandle, TrackSettings,
};
use crate::capture::CaptureConstraints;
use crate::error::PlatformError;
use crate::recording::{WavChunkEncoder, WAV_MIME_TYPE};

#[derive(Debug, Default)]
pub struct CpalPlatform;

impl CpalPlatform {
    pub fn new() -> Self {
        Self
    }
}

fn find_input_device(host: &cpal::Host, id: Option<&str>) -> Result<cpal::Device, PlatformError> {
    match id {
        Some(id) => host
            .input_devices()
            .map_err(|e| PlatformError::Other(format!("Failed to enumerate devices: {}", e)))?
            .find(|d| d.name().map(|n| n == id).unwrap_or(false))
            .ok_or_else(|| PlatformError::Overconstrained {
                constraint: "deviceId".to_string(),
            }),
        None => host.default_input_device().ok_or(PlatformError::NotFound),
    }
}

fn list_devices() -> Result<Vec<MediaDeviceInfo>, PlatformError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| PlatformError::Other(format!("Failed to enumerate devices: {}", e)))?;

    Ok(devices
        .filter_map(|d| d.name().ok())
        .map(|name| MediaDeviceInfo {
            kind: DeviceKind::AudioInput,
            is_default: default_name.as_deref() == Some(name.as_str()),
            label: name.clone(),
            device_id: name,
            group_id: String::new(),
        })
        .collect())
}

#[async_trait::async_trait]
impl MediaPlatform for CpalPlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, PlatformError> {
        tokio::task::spawn_blocking(list_devices)
            .await
            .map_err(|e| PlatformError::Other(format!("device enumeration task failed: {}", e)))?
    }

    async fn acquire_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<StreamHandle, PlatformError> {
        let requested = constraints.device_id.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let (ended_tx, _) = watch::channel(false);
        let ended_tx = Arc::new(ended_tx);

        let thread_ended = ended_tx.clone();
        let thread = thread::Builder::new()
            .name("mic-check-capture".to_string())
            .spawn(move || capture_thread(requested, ready_tx, stop_rx, thread_ended))
            .map_err(|e| PlatformError::Other(format!("Failed to spawn capture thread: {}", e)))?;

        let (settings, hub) = ready_rx
            .await
            .map_err(|_| PlatformError::Other("capture thread exited".to_string()))??;

        let stream = CpalStream {
            id: Uuid::new_v4().to_string(),
            settings,
            hub,
            live: AtomicBool::new(true),
            stop_tx: Mutex::new(Some(stop_tx)),
            ended_tx,
            thread: Mutex::new(Some(thread)),
        };
        Ok(Arc::new(stream))
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        mime_type == WAV_MIME_TYPE
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

type Ready = Result<(TrackSettings, Arc<PcmHub>), PlatformError>;

fn capture_thread(
    requested: Option<String>,
    ready_tx: oneshot::Sender<Ready>,
    stop_rx: std_mpsc::Receiver<()>,
    ended_tx: Arc<watch::Sender<bool>>,
) {
    let (stream, settings, hub) = match build_stream(requested.as_deref(), ended_tx) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(PlatformError::NotReadable));
        warn!("Failed to start capture stream: {}", e);
        return;
    }

    if ready_tx.send(Ok((settings, hub.clone()))).is_err() {
        // Caller went away before the stream was handed over
        hub.close();
        return;
    }

    // Park until stop_tracks (or the handle is dropped)
    let _ = stop_rx.recv();
    drop(stream);
    hub.close();
    debug!("Capture thread exiting");
}

fn build_stream(
    requested: Option<&str>,
    ended_tx: Arc<watch::Sender<bool>>,
) -> Result<(cpal::Stream, TrackSettings, Arc<PcmHub>), PlatformError> {
    let host = cpal::default_host();
    let device = find_input_device(&host, requested)?;
    let name = device.name().unwrap_or_else(|_| "Unknown device".to_string());

    let device_config = device
        .default_input_config()
        .map_err(|e| PlatformError::Other(format!("No usable input config: {}", e)))?;
    let sample_format = device_config.sample_format();
    let config: cpal::StreamConfig = device_config.into();

    info!(
        "Capture device: {} ({} Hz, {} ch, {:?})",
        name, config.sample_rate.0, config.channels, sample_format
    );

    let hub = PcmHub::new(config.sample_rate.0, config.channels);
    let err_fn = {
        let hub = hub.clone();
        move |err: cpal::StreamError| {
            error!("Audio stream error: {}", err);
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                hub.close();
                ended_tx.send_replace(true);
            }
        }
    };

    let stream = match sample_format {
        SampleFormat::F32 => {
            let hub = hub.clone();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| hub.push(data),
                err_fn,
                None,
            )
        }
        SampleFormat::I16 => {
            let hub = hub.clone();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|s| s.to_float_sample()).collect();
                    hub.push(&samples);
                },
                err_fn,
                None,
            )
        }
        SampleFormat::U16 => {
            let hub = hub.clone();
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<f32> = data.iter().map(|s| s.to_float_sample()).collect();
                    hub.push(&samples);
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(PlatformError::Overconstrained {
                constraint: format!("sampleFormat {:?}", other),
            })
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => PlatformError::NotReadable,
        other => PlatformError::Other(other.to_string()),
    })?;

    let settings = TrackSettings {
        device_id: Some(name),
        group_id: None,
        sample_rate: Some(config.sample_rate.0),
        sample_size: Some((sample_format.sample_size() * 8) as u16),
        channel_count: Some(config.channels),
        echo_cancellation: Some(false),
        noise_suppression: Some(false),
        auto_gain_control: Some(false),
        latency: None,
    };

    Ok((stream, settings, hub))
}

struct CpalStream {
    id: String,
    settings: TrackSettings,
    hub: Arc<PcmHub>,
    live: AtomicBool,
    stop_tx: Mutex<Option<std_mpsc::Sender<()>>>,
    ended_tx: Arc<watch::Sender<bool>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MediaStream for CpalStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn stop_tracks(&self) {
        if !self.live.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
        }
        info!("Capture stream {} stopped", self.id);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst) && !*self.ended_tx.borrow()
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended_tx.subscribe()
    }

    fn create_analyser(
        &self,
        options: AnalyserOptions,
    ) -> Result<Box<dyn AnalyserTap>, PlatformError> {
        Ok(Box::new(PcmAnalyserTap::new(self.hub.clone(), options)?))
    }

    fn create_encoder(
        &self,
        options: &EncoderOptions,
    ) -> Result<Box<dyn MediaEncoder>, PlatformError> {
        match options.mime_type.as_deref() {
            None | Some(WAV_MIME_TYPE) => Ok(Box::new(WavChunkEncoder::new(self.hub.clone()))),
            Some(other) => Err(PlatformError::NotSupported(format!("no encoder for {}", other))),
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}
