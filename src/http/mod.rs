//! HTTP API for driving the microphone test from a UI
//!
//! - GET /devices - Reload and list input devices
//! - POST /devices/select - Choose the device for the next test
//! - POST /test/start - Open the microphone
//! - POST /test/stop - Stop and collect the recording
//! - POST /test/reset - Discard the result, back to idle
//! - GET /test/status - Phase, status text, error, metadata, level, outcome
//! - GET /test/level - Current volume
//! - GET /recordings/:id - Download a finished recording
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{DeviceView, DevicesResponse, ErrorResponse, LevelResponse, StatusResponse};
pub use routes::create_router;
pub use state::AppState;
