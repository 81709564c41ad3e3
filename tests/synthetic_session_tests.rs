// End-to-end tests on the synthetic tone platform
//
// Real analysis (rustfft) and real WAV chunk encoding (hound) run against the
// generated tone, so these cover the whole path from capture to a playable
// recording.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use mic_check::device::CatalogError;
use mic_check::error::CaptureErrorKind;
use mic_check::platform::{MediaPlatform, SyntheticConfig, SyntheticPlatform};
use mic_check::session::{
    ControllerOptions, SessionController, SessionPhase, StartError, StatusBoard,
    STATUS_ENDED_UNEXPECTEDLY,
};

/// 32 buckets over 1024 bins sample every 32nd bin; at 48 kHz with a
/// 2048-point FFT bin 32 sits at 750 Hz
const BUCKET_ONE_TONE_HZ: f32 = 750.0;

fn synthetic(
    config: SyntheticConfig,
) -> (Arc<SyntheticPlatform>, Arc<StatusBoard>, SessionController) {
    let platform = Arc::new(SyntheticPlatform::new(config));
    let board = Arc::new(StatusBoard::new());
    let controller = SessionController::new(
        platform.clone(),
        board.clone(),
        ControllerOptions::default(),
    );
    (platform, board, controller)
}

#[tokio::test(start_paused = true)]
async fn test_tone_is_analysed_and_recorded_as_wav() -> Result<()> {
    // Setup
    let (platform, board, controller) = synthetic(SyntheticConfig {
        tone_hz: BUCKET_ONE_TONE_HZ,
        ..SyntheticConfig::default()
    });

    let devices = controller.load_devices().await?;
    assert_eq!(devices.len(), 2, "speakers must be filtered out");
    assert_eq!(devices[0].label.as_deref(), Some("Synthetic Microphone"));
    assert_eq!(platform.live_streams(), 0, "label grant must be released");

    // Execute: run the test for a second and a half
    let metadata = controller.start().await?;
    assert_eq!(metadata.device_name, "Synthetic Microphone");
    assert_eq!(metadata.sample_rate, 48000);
    assert_eq!(metadata.estimated_latency_ms, Some(10.0));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let level = board.snapshot().level.expect("level samples while active");
    assert_eq!(level.spectrum_buckets.len(), 32);
    assert!(
        level.spectrum_buckets[1] > 200,
        "tone bucket too quiet: {:?}",
        level.spectrum_buckets
    );

    let outcome = controller.stop().await.expect("outcome");

    // Verify: a sealed, readable WAV of about 1.5 s
    assert!(outcome.has_recording);
    assert_eq!(platform.live_streams(), 0);
    let recording = outcome.recording.expect("recording");
    assert_eq!(recording.mime_type, "audio/wav");
    assert!(recording.filename.ends_with(".wav"));

    let artifact = controller
        .object_urls()
        .resolve(&recording.url)
        .expect("recording must resolve");
    assert!(artifact.chunk_count() >= 2, "one timeslice plus the final flush");

    let reader = hound::WavReader::new(Cursor::new(artifact.bytes().to_vec()))?;
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    let samples = reader.len();
    assert!(
        (68_000..=74_000).contains(&samples),
        "expected about 72000 samples, got {}",
        samples
    );

    let snapshot = board.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Completed);
    assert!(snapshot.level.is_none());
    assert_eq!(snapshot.outcome.as_ref(), controller.last_outcome().as_ref());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_ends_test_and_keeps_partial_recording() -> Result<()> {
    let (platform, board, controller) = synthetic(SyntheticConfig::default());

    controller.start().await?;
    tokio::time::sleep(Duration::from_millis(400)).await;

    platform.disconnect_all();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let outcome = controller.last_outcome().expect("implicit stop must complete");
    assert!(outcome.ended_unexpectedly);
    assert!(outcome.has_recording, "audio before the disconnect is kept");
    assert_eq!(board.snapshot().status, STATUS_ENDED_UNEXPECTEDLY);
    assert_eq!(platform.live_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn test_denied_permission() -> Result<()> {
    let (platform, board, controller) = synthetic(SyntheticConfig {
        deny_permission: true,
        ..SyntheticConfig::default()
    });

    let err = controller.load_devices().await.unwrap_err();
    assert_eq!(err, CatalogError::PermissionDenied);

    let err = controller.start().await.unwrap_err();
    assert_eq!(err, StartError::Capture(CaptureErrorKind::PermissionDenied));

    let snapshot = board.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Idle);
    let error = snapshot.error.expect("error stays visible after returning to idle");
    assert_eq!(error.kind, CaptureErrorKind::PermissionDenied);
    assert_eq!(
        error.message,
        concat!(
            "Unable to access microphone. Permission denied. ",
            "Please allow microphone access and try again."
        )
    );
    assert_eq!(platform.live_streams(), 0);
    Ok(())
}

#[tokio::test]
async fn test_labels_hidden_until_first_grant() -> Result<()> {
    let platform = SyntheticPlatform::default();

    let before = platform.enumerate_devices().await?;
    assert!(before.iter().all(|d| d.label.is_empty()));

    let (_, _, controller) = synthetic(SyntheticConfig::default());
    let devices = controller.load_devices().await?;
    assert!(devices.iter().all(|d| d.label.is_some()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_no_encodable_type_still_runs_the_test() -> Result<()> {
    let (platform, board, controller) = synthetic(SyntheticConfig {
        mime_types: Vec::new(),
        ..SyntheticConfig::default()
    });

    controller.start().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(board.snapshot().level.is_some(), "analysis still runs");

    let outcome = controller.stop().await.expect("outcome");
    assert!(!outcome.has_recording);
    assert!(board.snapshot().error.is_none());
    assert_eq!(platform.live_streams(), 0);
    Ok(())
}
