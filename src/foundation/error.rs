/// Convenience result type used across reelkit.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Invalid user-provided configuration or frame data.
    #[error("validation error: {0}")]
    Validation(String),

    /// The encoder engine failed to initialize.
    #[error("load error: {0}")]
    Load(String),

    /// A frame could not be converted to (or from) the staging image format.
    #[error("codec error: {0}")]
    Codec(String),

    /// The encode invocation reported failure.
    ///
    /// `stderr` carries the engine's own diagnostics, trimmed, when it produced any.
    #[error("encode error: {message}{}", fmt_stderr(stderr))]
    Encode {
        /// Short description of what failed.
        message: String,
        /// Engine diagnostics (may be empty).
        stderr: String,
    },

    /// Staging write, output read or asset delete failed.
    #[error("io error: {0}")]
    Io(String),

    /// An operation was called in the wrong session state.
    #[error("state error: {0}")]
    State(String),

    /// The operation observed a cancelled [`CancelToken`](crate::CancelToken).
    #[error("cancelled")]
    Cancelled,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl ReelError {
    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReelError::Load`] value.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Build a [`ReelError::Codec`] value.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    /// Build a [`ReelError::Encode`] value.
    pub fn encode(msg: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
            stderr: stderr.into().trim().to_owned(),
        }
    }

    /// Build a [`ReelError::Io`] value.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Build a [`ReelError::State`] value.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
