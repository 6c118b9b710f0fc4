//! Error types for the climate engine

use thiserror::Error;

/// Errors that can occur in the climate engine
#[derive(Error, Debug)]
pub enum ClimateError {
    /// A device or sensor references a room that is not configured
    #[error("Unknown room: {0}")]
    UnknownRoom(String),

    /// A command targets a device that is not configured
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Scene name could not be parsed
    #[error("Invalid scene: {0}")]
    InvalidScene(String),

    /// Setting value rejected
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    /// Invalid time format in a schedule window
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
