use std::fmt;

use serde::{Deserialize, Serialize};

pub const STATUS_IDLE: &str = "Click \"Start Microphone Test\" to begin";
pub const STATUS_REQUESTING: &str = "Requesting microphone access...";
pub const STATUS_ACTIVE: &str = "Microphone is active - speak into your microphone";
pub const STATUS_COMPLETED: &str = "Test completed successfully!";
pub const STATUS_ENDED_UNEXPECTEDLY: &str = "Microphone disconnected - test ended unexpectedly";
pub const NO_MICROPHONES: &str =
    "No microphones found. Please connect a microphone and refresh the page.";

/// Lifecycle of one microphone test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Requesting,
    Active,
    Stopping,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a test currently holds (or is acquiring) capture resources
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Requesting | Self::Active | Self::Stopping)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
