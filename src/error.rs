use std::time::Duration;

/// Result alias for the capture phase.
pub type CaptureResult<T> = Result<T, CaptureError>;
/// Result alias for the encode phase.
pub type EncodeResult<T> = Result<T, EncodeError>;
/// Result alias for whole export runs.
pub type ExportResult<T> = Result<T, ExportError>;

/// Terminal outcomes of a capture run other than success.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// A frame could not be captured and the failure policy made it fatal.
    #[error("capture failed at frame {frame_index}: {source}")]
    CaptureFailed {
        /// Plan index of the frame that failed.
        frame_index: usize,
        #[source]
        source: anyhow::Error,
    },

    /// Cancellation was observed between frames; the partial buffer was discarded.
    #[error("capture cancelled")]
    Cancelled,
}

/// Failures of an encoder run. None of these produce an artifact.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("unsupported format: codec '{codec}' in container '{container}': {reason}")]
    UnsupportedFormat {
        codec: String,
        container: String,
        reason: String,
    },

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("encoding timed out while {stage} after {elapsed:?} (budget {budget:?})")]
    EncodingTimedOut {
        stage: VideoStage,
        budget: Duration,
        elapsed: Duration,
    },

    #[error("invalid encoder input: {0}")]
    InvalidInput(String),

    #[error("encoding cancelled")]
    Cancelled,
}

impl EncodeError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::EncodingFailed(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unsupported(
        codec: impl Into<String>,
        container: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedFormat {
            codec: codec.into(),
            container: container.into(),
            reason: reason.into(),
        }
    }
}

/// Video phase that ran out of time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoStage {
    /// Feeding frames to the sink at the target rate.
    Pacing,
    /// Waiting for the sink to flush and hand back the container.
    Finalizing,
}

impl std::fmt::Display for VideoStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pacing => "pacing frames",
            Self::Finalizing => "finalizing",
        })
    }
}

/// Error returned by [`crate::export()`] and configuration loading.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExportError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// `true` when the run ended because cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Capture(CaptureError::Cancelled) | Self::Encode(EncodeError::Cancelled)
        )
    }
}

#[cfg(test)]
#[path = "../tests/unit/error.rs"]
mod tests;
