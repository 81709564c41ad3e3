use std::sync::Arc;

use crate::session::{SessionController, StatusBoard};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single microphone test this server drives
    pub controller: SessionController,

    /// Latest notifications from the controller
    pub status: Arc<StatusBoard>,
}

impl AppState {
    pub fn new(controller: SessionController, status: Arc<StatusBoard>) -> Self {
        Self { controller, status }
    }
}
