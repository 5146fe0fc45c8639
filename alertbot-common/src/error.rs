// ================================================================
// File: alertbot-common/src/error.rs
// ================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Voice connection error: {0}")]
    Connection(String),

    #[error("Audio pipeline error: {0}")]
    Audio(String),

    #[error("Channel send error: {0}")]
    Channel(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Platform(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Platform(s.to_string())
    }
}
