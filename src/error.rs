//! Error types for the synchronization engine
//!
//! A below-threshold block or a loss of lock is never an error: both are
//! ordinary return values. Errors here are configuration mistakes and
//! failures of the upstream sample source.

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SyncError {
    /// Sample block length disagrees with the configured block length, or the
    /// search offset falls outside the block
    #[snafu(display("sample block length mismatch: expected {expected}, got {actual}"))]
    ConfigurationMismatch { expected: usize, actual: usize },

    /// A sub-step needed history that is not available at the block edge
    #[snafu(display("insufficient samples: need {needed}, have {available}"))]
    InsufficientSamples { needed: usize, available: usize },

    #[snafu(display("invalid configuration: {reason}"))]
    InvalidConfiguration { reason: String },

    #[snafu(display("sample source failed: {source}"))]
    Receive { source: SourceError },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    #[snafu(display("I/O error reading samples: {source}"))]
    Io { source: std::io::Error },

    #[snafu(display("WAV error: {source}"))]
    Wav { source: hound::Error },

    #[snafu(display("unsupported capture format: {reason}"))]
    Format { reason: String },

    #[snafu(display("sample stream ended"))]
    EndOfStream,
}

impl SyncError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SyncError::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// True when the error is the local, recoverable "not enough history" case
    pub fn is_insufficient_samples(&self) -> bool {
        matches!(self, SyncError::InsufficientSamples { .. })
    }
}

impl From<SourceError> for SyncError {
    fn from(source: SourceError) -> Self {
        SyncError::Receive { source }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
