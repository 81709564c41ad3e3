// Shared fakes for integration tests
//
// FakePlatform counts every stream it opens and closes, can be scripted to
// fail acquisition, and hands out analyser taps and encoders whose output
// the test controls. RecordingObserver keeps every notification.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mic_check::analysis::LevelSample;
use mic_check::capture::{CaptureConstraints, CaptureMetadata};
use mic_check::device::Device;
use mic_check::error::{CaptureErrorKind, PlatformError};
use mic_check::platform::{
    AnalyserOptions, AnalyserTap, DeviceKind, EncoderOptions, MediaDeviceInfo, MediaEncoder,
    MediaPlatform, MediaStream, StreamHandle, TrackSettings,
};
use mic_check::session::{SessionObserver, SessionPhase, TestOutcome};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub analysers: AtomicUsize,
    pub disconnects: AtomicUsize,
}

/// What encoders created by the fake deliver
#[derive(Clone, Default)]
pub struct ChunkScript {
    /// Sent as soon as the encoder starts
    pub on_start: Vec<Vec<u8>>,
    /// Sent when the encoder is stopped, before the channel closes
    pub on_stop: Vec<Vec<u8>>,
    /// How long the final flush takes after stop
    pub flush_delay: Option<Duration>,
}

pub struct FakePlatform {
    pub counters: Arc<Counters>,
    devices: Mutex<Vec<MediaDeviceInfo>>,
    failures: Mutex<VecDeque<PlatformError>>,
    settings: Mutex<TrackSettings>,
    snapshot: Arc<Mutex<Vec<u8>>>,
    chunks: Mutex<ChunkScript>,
    mime_types: Mutex<Vec<String>>,
    analyser_supported: AtomicBool,
    encoder_supported: AtomicBool,
    acquire_delay: Mutex<Option<Duration>>,
    streams: Mutex<Vec<Arc<FakeStream>>>,
}

pub fn input(id: &str, label: &str) -> MediaDeviceInfo {
    MediaDeviceInfo {
        kind: DeviceKind::AudioInput,
        device_id: id.to_string(),
        label: label.to_string(),
        group_id: format!("group-{}", id),
        is_default: id == "default",
    }
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counters: Arc::new(Counters::default()),
            devices: Mutex::new(vec![
                input("default", "Built-in Microphone"),
                input("usb-1", "USB Headset"),
                MediaDeviceInfo {
                    kind: DeviceKind::AudioOutput,
                    device_id: "speakers".to_string(),
                    label: "Speakers".to_string(),
                    group_id: "group-out".to_string(),
                    is_default: true,
                },
            ]),
            failures: Mutex::new(VecDeque::new()),
            settings: Mutex::new(TrackSettings {
                device_id: Some("default".to_string()),
                group_id: Some("group-default".to_string()),
                sample_rate: Some(48000),
                sample_size: Some(16),
                channel_count: Some(1),
                echo_cancellation: Some(true),
                noise_suppression: Some(true),
                auto_gain_control: Some(true),
                latency: Some(0.01),
            }),
            snapshot: Arc::new(Mutex::new(vec![0; 1024])),
            chunks: Mutex::new(ChunkScript::default()),
            mime_types: Mutex::new(vec!["audio/webm;codecs=opus".to_string()]),
            analyser_supported: AtomicBool::new(true),
            encoder_supported: AtomicBool::new(true),
            acquire_delay: Mutex::new(None),
            streams: Mutex::new(Vec::new()),
        })
    }

    pub fn set_devices(&self, devices: Vec<MediaDeviceInfo>) {
        *self.devices.lock() = devices;
    }

    /// Fail the next acquisition with `err`
    pub fn fail_next(&self, err: PlatformError) {
        self.failures.lock().push_back(err);
    }

    pub fn set_settings(&self, settings: TrackSettings) {
        *self.settings.lock() = settings;
    }

    /// Bytes every analyser tap reports
    pub fn set_snapshot(&self, snapshot: Vec<u8>) {
        *self.snapshot.lock() = snapshot;
    }

    pub fn set_chunks(&self, script: ChunkScript) {
        *self.chunks.lock() = script;
    }

    pub fn set_mime_types(&self, mime_types: &[&str]) {
        *self.mime_types.lock() = mime_types.iter().map(|m| m.to_string()).collect();
    }

    pub fn disable_analyser(&self) {
        self.analyser_supported.store(false, Ordering::SeqCst);
    }

    pub fn disable_encoder(&self) {
        self.encoder_supported.store(false, Ordering::SeqCst);
    }

    pub fn set_acquire_delay(&self, delay: Duration) {
        *self.acquire_delay.lock() = Some(delay);
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// End every open stream from the platform side
    pub fn unplug_all(&self) {
        for stream in self.streams.lock().iter() {
            stream.unplug();
        }
    }
}

#[async_trait::async_trait]
impl MediaPlatform for FakePlatform {
    async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>, PlatformError> {
        Ok(self.devices.lock().clone())
    }

    async fn acquire_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<StreamHandle, PlatformError> {
        let delay = *self.acquire_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.failures.lock().pop_front();
        if let Some(err) = scripted {
            return Err(err);
        }

        let mut settings = self.settings.lock().clone();
        if let Some(id) = &constraints.device_id {
            let known = self
                .devices
                .lock()
                .iter()
                .any(|d| d.kind == DeviceKind::AudioInput && &d.device_id == id);
            if !known {
                return Err(PlatformError::Overconstrained {
                    constraint: "deviceId".to_string(),
                });
            }
            settings.device_id = Some(id.clone());
        }

        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        let (ended_tx, _) = watch::channel(false);
        let stream = Arc::new(FakeStream {
            id: format!("fake-{}", self.opens()),
            settings,
            counters: self.counters.clone(),
            stopped: AtomicBool::new(false),
            ended_tx,
            snapshot: self.snapshot.clone(),
            chunks: self.chunks.lock().clone(),
            analyser_supported: self.analyser_supported.load(Ordering::SeqCst),
            encoder_supported: self.encoder_supported.load(Ordering::SeqCst),
        });
        self.streams.lock().push(stream.clone());
        Ok(stream)
    }

    fn supports_mime_type(&self, mime_type: &str) -> bool {
        self.mime_types.lock().iter().any(|m| m == mime_type)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FakeStream {
    id: String,
    settings: TrackSettings,
    counters: Arc<Counters>,
    stopped: AtomicBool,
    ended_tx: watch::Sender<bool>,
    snapshot: Arc<Mutex<Vec<u8>>>,
    chunks: ChunkScript,
    analyser_supported: bool,
    encoder_supported: bool,
}

impl FakeStream {
    fn unplug(&self) {
        if !self.stopped.load(Ordering::SeqCst) {
            self.ended_tx.send_replace(true);
        }
    }
}

impl MediaStream for FakeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn settings(&self) -> TrackSettings {
        self.settings.clone()
    }

    fn stop_tracks(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_live(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && !*self.ended_tx.borrow()
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended_tx.subscribe()
    }

    fn create_analyser(
        &self,
        _options: AnalyserOptions,
    ) -> Result<Box<dyn AnalyserTap>, PlatformError> {
        if !self.analyser_supported {
            return Err(PlatformError::NotSupported("analyser".to_string()));
        }
        self.counters.analysers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTap {
            snapshot: self.snapshot.clone(),
            counters: self.counters.clone(),
            connected: true,
        }))
    }

    fn create_encoder(
        &self,
        options: &EncoderOptions,
    ) -> Result<Box<dyn MediaEncoder>, PlatformError> {
        if !self.encoder_supported {
            return Err(PlatformError::NotSupported("encoder".to_string()));
        }
        Ok(Box::new(FakeEncoder {
            mime_type: options
                .mime_type
                .clone()
                .unwrap_or_else(|| "audio/ogg".to_string()),
            script: self.chunks.clone(),
            tx: None,
        }))
    }
}

struct FakeTap {
    snapshot: Arc<Mutex<Vec<u8>>>,
    counters: Arc<Counters>,
    connected: bool,
}

impl AnalyserTap for FakeTap {
    fn frequency_bin_count(&self) -> usize {
        self.snapshot.lock().len()
    }

    fn byte_frequency_data(&mut self, out: &mut [u8]) {
        let snapshot = self.snapshot.lock();
        for (slot, value) in out.iter_mut().zip(snapshot.iter()) {
            *slot = if self.connected { *value } else { 0 };
        }
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeEncoder {
    mime_type: String,
    script: ChunkScript,
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl MediaEncoder for FakeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn start(&mut self, _timeslice: Duration) -> Result<mpsc::Receiver<Vec<u8>>, PlatformError> {
        let (tx, rx) = mpsc::channel(64);
        for chunk in &self.script.on_start {
            let _ = tx.try_send(chunk.clone());
        }
        self.tx = Some(tx);
        Ok(rx)
    }

    fn stop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let final_chunks = self.script.on_stop.clone();
        match self.script.flush_delay {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    for chunk in final_chunks {
                        let _ = tx.send(chunk).await;
                    }
                });
            }
            None => {
                for chunk in final_chunks {
                    let _ = tx.try_send(chunk);
                }
            }
        }
    }
}

/// Everything a SessionObserver can be told
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Phase(SessionPhase),
    Status(String),
    Error(CaptureErrorKind, String),
    Devices(usize),
    Metadata(String),
    Level(u8),
    Completed(TestOutcome),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn phases(&self) -> Vec<SessionPhase> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Phase(phase) => Some(phase),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<(CaptureErrorKind, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Error(kind, message) => Some((kind, message)),
                _ => None,
            })
            .collect()
    }

    pub fn levels(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Level(volume) => Some(volume),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl SessionObserver for RecordingObserver {
    fn on_phase(&self, phase: SessionPhase) {
        self.push(Event::Phase(phase));
    }

    fn on_status(&self, status: &str) {
        self.push(Event::Status(status.to_string()));
    }

    fn on_error(&self, kind: &CaptureErrorKind, message: &str) {
        self.push(Event::Error(kind.clone(), message.to_string()));
    }

    fn on_devices(&self, devices: &[Device]) {
        self.push(Event::Devices(devices.len()));
    }

    fn on_metadata(&self, metadata: &CaptureMetadata) {
        self.push(Event::Metadata(metadata.device_name.clone()));
    }

    fn on_level(&self, sample: &LevelSample) {
        self.push(Event::Level(sample.volume_percent));
    }

    fn on_completed(&self, outcome: &TestOutcome) {
        self.push(Event::Completed(outcome.clone()));
    }
}
