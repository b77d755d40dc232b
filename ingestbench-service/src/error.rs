//! Errors returned by the multipart uploader.

use std::{fmt, io};

use thiserror::Error;

use crate::backend::BackendError;

/// Invalid input to an upload, detected before any backend call is made.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// The part size is zero, negative or not a number.
    #[error("part size must be a positive number of bytes, got {0}")]
    InvalidPartSize(String),

    /// The destination bucket is empty.
    #[error("destination bucket must not be empty")]
    EmptyBucket,

    /// The destination key is empty.
    #[error("destination key must not be empty")]
    EmptyKey,
}

/// The step of the multipart protocol an upload was in when it failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadPhase {
    /// Creating the upload session.
    Initiate,
    /// Assembling or uploading the given part.
    UploadPart {
        /// One-based number of the part.
        part_number: u32,
    },
    /// Committing the uploaded parts.
    Complete,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiate => f.write_str("initiate"),
            Self::UploadPart { part_number } => write!(f, "part {part_number}"),
            Self::Complete => f.write_str("complete"),
        }
    }
}

/// Errors returned by [`MultipartUploader::upload`](crate::multipart::MultipartUploader::upload).
///
/// Failures after the session was initiated are returned only after an abort was attempted. If
/// that abort failed too, its error is kept in `abort_error` but never replaces the original
/// cause.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload was rejected before talking to the backend.
    #[error("invalid upload configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The storage backend failed.
    #[error("storage backend failed during {phase}")]
    Backend {
        /// Where in the protocol the failure happened.
        phase: UploadPhase,
        /// The backend failure.
        #[source]
        cause: BackendError,
        /// Failure of the cleanup abort, if one was attempted and failed.
        abort_error: Option<BackendError>,
    },

    /// The chunk stream failed or did not yield before the deadline.
    #[error("chunk stream failed during {phase}")]
    Stream {
        /// Where in the protocol the failure happened.
        phase: UploadPhase,
        /// The stream failure.
        #[source]
        cause: io::Error,
        /// Failure of the cleanup abort, if it failed.
        abort_error: Option<BackendError>,
    },
}

impl UploadError {
    pub(crate) fn backend(phase: UploadPhase, cause: BackendError) -> Self {
        Self::Backend {
            phase,
            cause,
            abort_error: None,
        }
    }

    pub(crate) fn stream(phase: UploadPhase, cause: io::Error) -> Self {
        Self::Stream {
            phase,
            cause,
            abort_error: None,
        }
    }

    /// Returns the protocol phase the upload failed in.
    ///
    /// `None` for configuration errors, which happen before the protocol starts.
    pub fn phase(&self) -> Option<UploadPhase> {
        match self {
            Self::Configuration(_) => None,
            Self::Backend { phase, .. } | Self::Stream { phase, .. } => Some(*phase),
        }
    }

    /// Returns the suppressed failure of the cleanup abort, if any.
    pub fn abort_error(&self) -> Option<&BackendError> {
        match self {
            Self::Configuration(_) => None,
            Self::Backend { abort_error, .. } | Self::Stream { abort_error, .. } => {
                abort_error.as_ref()
            }
        }
    }

    pub(crate) fn set_abort_error(&mut self, error: BackendError) {
        match self {
            Self::Configuration(_) => {}
            Self::Backend { abort_error, .. } | Self::Stream { abort_error, .. } => {
                *abort_error = Some(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn phases_are_readable() {
        assert_eq!(UploadPhase::Initiate.to_string(), "initiate");
        assert_eq!(
            UploadPhase::UploadPart { part_number: 3 }.to_string(),
            "part 3"
        );
        assert_eq!(UploadPhase::Complete.to_string(), "complete");
    }

    #[test]
    fn abort_error_does_not_replace_cause() {
        let mut error = UploadError::backend(
            UploadPhase::UploadPart { part_number: 2 },
            BackendError::Rejected {
                context: "part rejected".into(),
            },
        );
        error.set_abort_error(BackendError::Rejected {
            context: "abort rejected".into(),
        });

        assert_eq!(error.to_string(), "storage backend failed during part 2");
        assert_eq!(
            error.source().unwrap().to_string(),
            "request rejected: part rejected"
        );
        assert_eq!(
            error.abort_error().unwrap().to_string(),
            "request rejected: abort rejected"
        );
    }
}
