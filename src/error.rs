//! Error types for the voice assistant.

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// Speech recognition session error (start/stop/platform).
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Text-to-speech synthesis error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Page action failed (navigation, search field, mood handler, player).
    #[error("page action error: {0}")]
    Page(String),

    /// Custom command rejected or command list unavailable.
    #[error("command error: {0}")]
    Command(String),

    /// Persistence store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
