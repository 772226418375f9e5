//! Error types for voxchain

use std::io;
use thiserror::Error;

/// Main error type for voxchain
#[derive(Error, Debug)]
pub enum VoxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Audio codec error: {0}")]
    Codec(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for voxchain operations
pub type Result<T> = std::result::Result<T, VoxError>;

impl From<String> for VoxError {
    fn from(s: String) -> Self {
        VoxError::Other(s)
    }
}

impl From<&str> for VoxError {
    fn from(s: &str) -> Self {
        VoxError::Other(s.to_string())
    }
}

impl From<hound::Error> for VoxError {
    fn from(e: hound::Error) -> Self {
        VoxError::Codec(format!("WAV error: {}", e))
    }
}
