//! Error types for the conversation session core.

/// Top-level error type for the session core.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Ambient audio device, stream, or track error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech capture engine error.
    #[error("capture error: {0}")]
    Capture(String),

    /// No speech capture engine is available in this environment.
    #[error("speech capture is not supported in this environment")]
    CaptureUnsupported,

    /// Speech synthesis error.
    #[error("playback error: {0}")]
    Playback(String),

    /// Remote dialogue service error (transport, status, or body).
    #[error("service error: {0}")]
    Service(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
