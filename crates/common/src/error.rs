//! Error types shared across Rewind crates.

/// Top-level error type for replay operations.
///
/// Nothing in this taxonomy is fatal to the host: callers degrade to an idle
/// or no-op state. Producer timestamp gaps are never reported here, the
/// capture window recovers from them on its own.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// An encoder, scaler or audio output could not be opened.
    #[error("Resource exhausted: {message}")]
    ResourceExhaustion { message: String },

    /// The operation needs a current replay but none is held.
    #[error("No replay available")]
    EmptySnapshot,

    /// Trim points would invert the playable window.
    #[error("Invalid trim range: front {trim_front_ns}ns, end {trim_end_ns}ns")]
    InvalidRange { trim_front_ns: i64, trim_end_ns: i64 },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Playback error: {message}")]
    Playback { message: String },

    #[error("Export error: {message}")]
    Export { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReplayError.
pub type ReplayResult<T> = Result<T, ReplayError>;

impl ReplayError {
    pub fn resource_exhaustion(msg: impl Into<String>) -> Self {
        Self::ResourceExhaustion {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback {
            message: msg.into(),
        }
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}
