use super::state::AppState;
use crate::analysis::LevelSample;
use crate::capture::CaptureMetadata;
use crate::device::{CatalogError, Device};
use crate::error::CaptureErrorKind;
use crate::session::{ErrorReport, SessionPhase, StartError, TestOutcome};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SelectDeviceRequest {
    /// `null` selects the platform default
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub id: String,
    pub label: Option<String>,
    /// Label, or "Microphone N" when the platform withholds it
    pub display_label: String,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceView>,
    pub selected: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: SessionPhase,
    pub status: String,
    pub error: Option<ErrorReport>,
    pub metadata: Option<CaptureMetadata>,
    pub volume_percent: u8,
    pub level: Option<LevelSample>,
    pub outcome: Option<TestOutcome>,
}

#[derive(Debug, Serialize)]
pub struct LevelResponse {
    pub volume_percent: u8,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<CaptureErrorKind>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }

    fn with_kind(kind: &CaptureErrorKind) -> Self {
        Self {
            error: kind.user_message(),
            kind: Some(kind.clone()),
        }
    }
}

fn error_response(status: StatusCode, body: ErrorResponse) -> Response {
    (status, Json(body)).into_response()
}

/// HTTP status for a failed capture attempt
pub fn capture_status(kind: &CaptureErrorKind) -> StatusCode {
    match kind {
        CaptureErrorKind::PermissionDenied | CaptureErrorKind::SecurityBlocked => {
            StatusCode::FORBIDDEN
        }
        CaptureErrorKind::DeviceNotFound => StatusCode::NOT_FOUND,
        CaptureErrorKind::DeviceBusy => StatusCode::CONFLICT,
        CaptureErrorKind::ConstraintsUnsatisfiable => StatusCode::UNPROCESSABLE_ENTITY,
        CaptureErrorKind::AbortedByPlatform | CaptureErrorKind::Unknown(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn device_views(devices: &[Device]) -> Vec<DeviceView> {
    devices
        .iter()
        .enumerate()
        .map(|(index, device)| DeviceView {
            id: device.id.clone(),
            label: device.label.clone(),
            display_label: device.display_label(index),
            is_default: device.is_default,
        })
        .collect()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /devices
/// Reload the device list
pub async fn list_devices(State(state): State<AppState>) -> Response {
    match state.controller.load_devices().await {
        Ok(devices) => {
            let selected = state.controller.selected_device().await;
            Json(DevicesResponse {
                devices: device_views(&devices),
                selected,
            })
            .into_response()
        }
        Err(e) => {
            warn!("Failed to load devices: {}", e);
            let status = match e {
                CatalogError::PermissionDenied => StatusCode::FORBIDDEN,
                CatalogError::EnumerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, ErrorResponse::new(e.user_message()))
        }
    }
}

/// POST /devices/select
/// Choose the device for the next test
pub async fn select_device(
    State(state): State<AppState>,
    Json(req): Json<SelectDeviceRequest>,
) -> Response {
    state.controller.select_device(req.device_id).await;
    let devices = state.controller.devices().await;
    let selected = state.controller.selected_device().await;

    Json(DevicesResponse {
        devices: device_views(&devices),
        selected,
    })
    .into_response()
}

/// POST /test/start
/// Open the microphone and begin the test
pub async fn start_test(State(state): State<AppState>) -> Response {
    match state.controller.start().await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(StartError::Busy(phase)) => error_response(
            StatusCode::CONFLICT,
            ErrorResponse::new(format!("A test is already {}", phase)),
        ),
        Err(StartError::Capture(kind)) => {
            error_response(capture_status(&kind), ErrorResponse::with_kind(&kind))
        }
    }
}

/// POST /test/stop
/// Stop the active test and return its outcome
pub async fn stop_test(State(state): State<AppState>) -> Response {
    match state.controller.stop().await {
        Some(outcome) => {
            info!("Test stopped via HTTP");
            Json(outcome).into_response()
        }
        None => error_response(
            StatusCode::CONFLICT,
            ErrorResponse::new(format!("No active test ({})", state.controller.phase())),
        ),
    }
}

/// POST /test/reset
/// Release the last recording and return to idle
pub async fn reset_test(State(state): State<AppState>) -> Response {
    match state.controller.reset() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::CONFLICT, ErrorResponse::new(e.to_string())),
    }
}

/// GET /test/status
pub async fn get_status(State(state): State<AppState>) -> Response {
    let snapshot = state.status.snapshot();

    Json(StatusResponse {
        phase: state.controller.phase(),
        status: snapshot.status,
        error: snapshot.error,
        metadata: snapshot.metadata,
        volume_percent: state.controller.current_level(),
        level: snapshot.level,
        outcome: state.controller.last_outcome(),
    })
    .into_response()
}

/// GET /test/level
pub async fn get_level(State(state): State<AppState>) -> Response {
    Json(LevelResponse {
        volume_percent: state.controller.current_level(),
    })
    .into_response()
}

/// GET /recordings/:id
/// Download a finished recording while its object URL is live
pub async fn get_recording(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.controller.object_urls().resolve_id(&id) {
        Some(artifact) => (
            [
                (header::CONTENT_TYPE, artifact.mime_type().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", artifact.suggested_filename()),
                ),
            ],
            artifact.bytes().to_vec(),
        )
            .into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            ErrorResponse::new(format!("Recording {} not found", id)),
        ),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
