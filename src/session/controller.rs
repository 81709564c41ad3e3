use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::observer::SessionObserver;
use super::outcome::{CompletedRecording, TestOutcome, TestStatus};
use super::state::{
    SessionPhase, NO_MICROPHONES, STATUS_ACTIVE, STATUS_COMPLETED, STATUS_ENDED_UNEXPECTEDLY,
    STATUS_IDLE, STATUS_REQUESTING,
};
use crate::analysis::{
    AnalysisLoop, LevelAnalyzer, LevelCallback, LevelSample, DEFAULT_TICK_INTERVAL,
};
use crate::capture::{CaptureConstraints, CaptureMetadata, CaptureSession};
use crate::device::{CatalogError, Device, DeviceCatalog};
use crate::error::CaptureErrorKind;
use crate::platform::{AnalyserOptions, MediaPlatform};
use crate::recording::{ObjectUrl, ObjectUrls, RecordingOptions, RecordingPipeline};

/// Display buckets per level sample
pub const DEFAULT_BUCKET_COUNT: usize = 32;

/// Everything a test run is configured with
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub constraints: CaptureConstraints,
    pub analyser: AnalyserOptions,
    pub bucket_count: usize,
    pub tick_interval: Duration,
    pub recording: RecordingOptions,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            constraints: CaptureConstraints::default(),
            analyser: AnalyserOptions::default(),
            bucket_count: DEFAULT_BUCKET_COUNT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            recording: RecordingOptions::default(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("a test is already {0}")]
    Busy(SessionPhase),

    #[error(transparent)]
    Capture(#[from] CaptureErrorKind),
}

impl StartError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Busy(_) => "A microphone test is already in progress.".to_string(),
            Self::Capture(kind) => kind.user_message(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: SessionPhase,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Requested,
    TrackEnded,
}

/// Aborts the wrapped task when dropped
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resources of the test currently running
struct ActiveTest {
    /// Distinguishes this run from later ones
    id: u64,
    capture: CaptureSession,
    analysis: Option<AnalysisLoop>,
    recording: RecordingPipeline,
    metadata: CaptureMetadata,
    started_at: Instant,
    _track_watcher: TaskGuard,
}

struct ControllerState {
    phase: SessionPhase,
    active: Option<ActiveTest>,
    metadata: Option<CaptureMetadata>,
    last_outcome: Option<TestOutcome>,
    /// Playable URL of the last recording; revoked on reset
    object_url: Option<ObjectUrl>,
}

struct Inner {
    platform: Arc<dyn MediaPlatform>,
    observer: Arc<dyn SessionObserver>,
    object_urls: ObjectUrls,
    options: ControllerOptions,
    catalog: AsyncMutex<DeviceCatalog>,
    state: Mutex<ControllerState>,
    next_test_id: AtomicU64,
}

/// Top-level state machine of the microphone test.
///
/// Cheap to clone; every clone drives the same session. Dropping the last
/// clone releases the stream, analysis task, encoder and object URLs.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        observer: Arc<dyn SessionObserver>,
        options: ControllerOptions,
    ) -> Self {
        Self::with_object_urls(platform, observer, options, ObjectUrls::new())
    }

    pub fn with_object_urls(
        platform: Arc<dyn MediaPlatform>,
        observer: Arc<dyn SessionObserver>,
        options: ControllerOptions,
        object_urls: ObjectUrls,
    ) -> Self {
        info!("Session controller on {} platform", platform.name());
        Self {
            inner: Arc::new(Inner {
                platform,
                observer,
                object_urls,
                options,
                catalog: AsyncMutex::new(DeviceCatalog::new()),
                state: Mutex::new(ControllerState {
                    phase: SessionPhase::Idle,
                    active: None,
                    metadata: None,
                    last_outcome: None,
                    object_url: None,
                }),
                next_test_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.state.lock().phase
    }

    pub fn object_urls(&self) -> &ObjectUrls {
        &self.inner.object_urls
    }

    /// Metadata of the current or last test
    pub fn metadata(&self) -> Option<CaptureMetadata> {
        self.inner.state.lock().metadata.clone()
    }

    pub fn last_outcome(&self) -> Option<TestOutcome> {
        self.inner.state.lock().last_outcome.clone()
    }

    /// Latest volume percentage, or 0 when no test is active
    pub fn current_level(&self) -> u8 {
        let state = self.inner.state.lock();
        state
            .active
            .as_ref()
            .and_then(|active| active.analysis.as_ref())
            .map(|analysis| analysis.latest_volume())
            .unwrap_or(0)
    }

    /// Re-enumerate input devices.
    ///
    /// While a test holds the microphone the last snapshot is returned
    /// instead of probing again.
    pub async fn load_devices(&self) -> Result<Vec<Device>, CatalogError> {
        let mut catalog = self.inner.catalog.lock().await;

        if self.phase().is_busy() {
            return Ok(catalog.devices().to_vec());
        }

        match catalog.list_input_devices(self.inner.platform.as_ref()).await {
            Ok(devices) => {
                drop(catalog);
                self.inner.observer.on_devices(&devices);
                if devices.is_empty() {
                    self.inner
                        .observer
                        .on_error(&CaptureErrorKind::DeviceNotFound, NO_MICROPHONES);
                } else {
                    self.inner.observer.on_status(STATUS_IDLE);
                }
                Ok(devices)
            }
            Err(e) => {
                drop(catalog);
                let kind = match &e {
                    CatalogError::PermissionDenied => CaptureErrorKind::PermissionDenied,
                    CatalogError::EnumerationFailed(message) => {
                        CaptureErrorKind::Unknown(message.clone())
                    }
                };
                self.inner.observer.on_error(&kind, e.user_message());
                Err(e)
            }
        }
    }

    /// Last device snapshot
    pub async fn devices(&self) -> Vec<Device> {
        self.inner.catalog.lock().await.devices().to_vec()
    }

    /// Choose the device for the next test; `None` means the platform default
    pub async fn select_device(&self, device_id: Option<String>) {
        let mut catalog = self.inner.catalog.lock().await;
        catalog.select(device_id);
        info!(
            "Selected device: {}",
            catalog.selected().unwrap_or("platform default")
        );
    }

    pub async fn selected_device(&self) -> Option<String> {
        self.inner
            .catalog
            .lock()
            .await
            .selected()
            .map(str::to_string)
    }

    /// Open the microphone and begin analysis and recording.
    ///
    /// Rejected with `Busy` unless the controller is idle. On a capture
    /// failure the controller passes through `Failed` back to `Idle`.
    pub async fn start(&self) -> Result<CaptureMetadata, StartError> {
        {
            let mut state = self.inner.state.lock();
            if state.phase != SessionPhase::Idle {
                warn!("Start rejected: test is {}", state.phase);
                return Err(StartError::Busy(state.phase));
            }
            state.phase = SessionPhase::Requesting;
        }
        self.inner.observer.on_phase(SessionPhase::Requesting);
        self.inner.observer.on_status(STATUS_REQUESTING);

        // Runs detached so a dropped caller cannot strand the controller in Requesting
        let inner = self.inner.clone();
        match tokio::spawn(async move { inner.open_test().await }).await {
            Ok(result) => result,
            Err(e) => {
                error!("Start task failed: {}", e);
                let kind = CaptureErrorKind::Unknown(e.to_string());
                self.inner.fail(&kind);
                Err(StartError::Capture(kind))
            }
        }
    }

    /// Stop the active test and wait for its recording.
    ///
    /// A no-op returning `None` outside `Active`.
    pub async fn stop(&self) -> Option<TestOutcome> {
        Inner::finish(&self.inner, StopReason::Requested, None).await
    }

    /// Discard the last result and return to `Idle`
    pub fn reset(&self) -> Result<(), SessionError> {
        let released = {
            let mut state = self.inner.state.lock();
            match state.phase {
                SessionPhase::Idle => return Ok(()),
                SessionPhase::Completed | SessionPhase::Failed => {
                    state.phase = SessionPhase::Idle;
                    state.metadata = None;
                    state.last_outcome = None;
                    state.object_url.take()
                }
                phase => {
                    return Err(SessionError::InvalidTransition {
                        action: "reset",
                        phase,
                    })
                }
            }
        };
        // Revokes the object URL
        drop(released);

        info!("Session reset");
        self.inner.observer.on_phase(SessionPhase::Idle);
        self.inner.observer.on_status(STATUS_IDLE);
        Ok(())
    }

    /// Stop any active test and release every resource
    pub async fn shutdown(&self) {
        if self.phase() == SessionPhase::Active {
            self.stop().await;
        }
        if let Err(e) = self.reset() {
            warn!("Shutdown left session {}", e);
        }
    }
}

impl Inner {
    async fn open_test(self: Arc<Self>) -> Result<CaptureMetadata, StartError> {
        let started_at = Instant::now();
        let (selected, devices) = {
            let catalog = self.catalog.lock().await;
            (
                catalog.selected().map(str::to_string),
                catalog.devices().to_vec(),
            )
        };

        let mut capture = CaptureSession::new();
        let (stream, metadata) = match capture
            .open(
                self.platform.as_ref(),
                self.options.constraints.clone(),
                selected.as_deref(),
                &devices,
            )
            .await
        {
            Ok(opened) => opened,
            Err(kind) => {
                self.fail(&kind);
                return Err(StartError::Capture(kind));
            }
        };

        // Analysis and recording degrade silently
        let analysis = match LevelAnalyzer::attach(
            stream.as_ref(),
            self.options.bucket_count,
            self.options.analyser,
        ) {
            Ok(analyzer) => {
                let observer = self.observer.clone();
                let on_sample: LevelCallback =
                    Arc::new(move |sample: &LevelSample| observer.on_level(sample));
                Some(AnalysisLoop::spawn(
                    analyzer,
                    self.options.tick_interval,
                    on_sample,
                ))
            }
            Err(e) => {
                warn!("Spectrum analysis unavailable, continuing without it: {}", e);
                None
            }
        };

        let recording = RecordingPipeline::start(
            self.platform.as_ref(),
            stream.as_ref(),
            &self.options.recording,
        );

        let id = self.next_test_id.fetch_add(1, Ordering::SeqCst);
        let watcher = tokio::spawn(watch_track_end(Arc::downgrade(&self), stream.ended(), id));

        {
            let mut state = self.state.lock();
            state.active = Some(ActiveTest {
                id,
                capture,
                analysis,
                recording,
                metadata: metadata.clone(),
                started_at,
                _track_watcher: TaskGuard(watcher),
            });
            state.metadata = Some(metadata.clone());
            state.phase = SessionPhase::Active;
        }

        info!("Microphone test {} active on {}", id, metadata.device_name);
        self.observer.on_metadata(&metadata);
        self.observer.on_phase(SessionPhase::Active);
        self.observer.on_status(STATUS_ACTIVE);

        Ok(metadata)
    }

    /// Report a failed start and return to `Idle`
    fn fail(&self, kind: &CaptureErrorKind) {
        self.state.lock().phase = SessionPhase::Failed;
        warn!("Microphone test failed: {}", kind);
        self.observer.on_phase(SessionPhase::Failed);
        self.observer.on_error(kind, &kind.user_message());

        self.state.lock().phase = SessionPhase::Idle;
        self.observer.on_phase(SessionPhase::Idle);
    }

    async fn finish(
        inner: &Arc<Self>,
        reason: StopReason,
        test_id: Option<u64>,
    ) -> Option<TestOutcome> {
        // Runs detached so a dropped caller cannot strand the controller in Stopping
        let inner = inner.clone();
        match tokio::spawn(async move { inner.stop_test(reason, test_id).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Stop task failed: {}", e);
                None
            }
        }
    }

    async fn stop_test(&self, reason: StopReason, test_id: Option<u64>) -> Option<TestOutcome> {
        let active = {
            let mut state = self.state.lock();
            if state.phase != SessionPhase::Active {
                return None;
            }
            if let (Some(expected), Some(active)) = (test_id, state.active.as_ref()) {
                if active.id != expected {
                    return None;
                }
            }
            state.phase = SessionPhase::Stopping;
            state.active.take()
        }?;
        // No tick is delivered once cancel returns
        if let Some(analysis) = active.analysis.as_ref() {
            analysis.cancel();
        }
        self.observer.on_phase(SessionPhase::Stopping);

        let ActiveTest {
            id,
            mut capture,
            analysis,
            recording,
            metadata,
            started_at,
            _track_watcher,
        } = active;
        let duration_ms = started_at.elapsed().as_millis() as u64;

        if let Some(analysis) = analysis {
            analysis.stop().await;
        }

        // Release the microphone before waiting on the encoder's final flush
        capture.close();
        let artifact = Arc::new(recording.stop().await);

        let object_url = artifact
            .has_recording()
            .then(|| self.object_urls.create(artifact.clone()));
        let recording = object_url
            .as_ref()
            .map(|url| CompletedRecording::new(url, &artifact));

        let ended_unexpectedly = reason == StopReason::TrackEnded;
        let outcome = TestOutcome {
            test_date: Utc::now(),
            duration_ms,
            microphone_label: metadata.device_name.clone(),
            metadata,
            status: TestStatus::Passed,
            has_recording: recording.is_some(),
            recording,
            ended_unexpectedly,
        };

        let previous_url = {
            let mut state = self.state.lock();
            state.phase = SessionPhase::Completed;
            state.last_outcome = Some(outcome.clone());
            std::mem::replace(&mut state.object_url, object_url)
        };
        drop(previous_url);

        info!(
            "Microphone test {} completed after {} ms ({})",
            id,
            duration_ms,
            if ended_unexpectedly { "track ended" } else { "stopped" }
        );
        self.observer.on_phase(SessionPhase::Completed);
        self.observer.on_status(if ended_unexpectedly {
            STATUS_ENDED_UNEXPECTEDLY
        } else {
            STATUS_COMPLETED
        });
        self.observer.on_completed(&outcome);

        Some(outcome)
    }
}

/// Turn a platform-side end of the track into a stop of test `test_id`
async fn watch_track_end(inner: Weak<Inner>, mut ended: watch::Receiver<bool>, test_id: u64) {
    loop {
        let has_ended = *ended.borrow_and_update();
        if has_ended {
            break;
        }
        if ended.changed().await.is_err() {
            // Stream dropped without ending
            return;
        }
    }

    let Some(inner) = inner.upgrade() else {
        return;
    };
    warn!("Capture track ended by the platform");
    Inner::finish(&inner, StopReason::TrackEnded, Some(test_id)).await;
}
