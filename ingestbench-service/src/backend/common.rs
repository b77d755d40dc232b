use std::fmt::{self, Debug};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::error::ConfigurationError;

/// A type-erased [`Backend`] instance shared between the handler and its uploaders.
pub type SharedBackend = Arc<dyn Backend>;

/// The destination identity of an object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectTarget {
    /// Name of the bucket holding the object.
    pub bucket: String,
    /// Key of the object within the bucket.
    pub key: String,
}

impl ObjectTarget {
    /// Creates a target for `key` in `bucket`.
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Checks that both the bucket and the key are set.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.bucket.is_empty() {
            return Err(ConfigurationError::EmptyBucket);
        }
        if self.key.is_empty() {
            return Err(ConfigurationError::EmptyKey);
        }
        Ok(())
    }
}

impl fmt::Display for ObjectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Opaque token of an upload session, issued by [`Backend::initiate_upload`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UploadId(String);

impl UploadId {
    /// Wraps a token returned by the backend.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the token as sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque checksum the backend issues for a stored part or object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityTag(String);

impl EntityTag {
    /// Wraps a tag returned by the backend.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as sent to the backend.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A part committed to an upload session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadPart {
    /// One-based position of the part in the object.
    pub part_number: u32,
    /// Tag the backend returned for the part.
    pub entity_tag: EntityTag,
}

/// Response of a single-shot [`Backend::put_object`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutResponse {
    /// Tag of the stored object, if the backend returned one.
    pub entity_tag: Option<EntityTag>,
}

/// The storage calls made by the workloads.
///
/// A multipart upload is driven through `initiate_upload`, then `upload_part` once per part in
/// ascending order, then `complete_upload`. After any failure it ends with `abort_upload`.
#[async_trait::async_trait]
pub trait Backend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Stores a whole object in one request.
    async fn put_object(
        &self,
        target: &ObjectTarget,
        content_type: &str,
        payload: Bytes,
    ) -> BackendResult<PutResponse>;

    /// Opens a new multipart upload session for the target.
    async fn initiate_upload(&self, target: &ObjectTarget) -> BackendResult<UploadId>;

    /// Stores one part of an upload and returns its tag.
    async fn upload_part(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
        part_number: u32,
        payload: Bytes,
    ) -> BackendResult<EntityTag>;

    /// Assembles the object from the given parts and returns its location.
    ///
    /// The parts must be ordered by number, start at 1 and have no gaps.
    async fn complete_upload(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
        parts: &[UploadPart],
    ) -> BackendResult<String>;

    /// Discards an upload session and all parts stored for it.
    async fn abort_upload(&self, target: &ObjectTarget, upload_id: &UploadId)
    -> BackendResult<()>;
}

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A request to S3 failed, either in transport or with an error response.
    #[error("s3 error: {context}")]
    S3 {
        /// The failed operation and the rendered SDK error.
        context: String,
        /// The SDK error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The backend answered, but without a field the protocol requires.
    #[error("malformed backend response: {context}")]
    MalformedResponse {
        /// The operation and the missing field.
        context: String,
    },

    /// The backend refused the request, e.g. because it violates the upload protocol.
    #[error("request rejected: {context}")]
    Rejected {
        /// Why the request was refused.
        context: String,
    },

    /// The request was cancelled because the upload ran out of time.
    #[error("{operation} did not finish before the deadline")]
    DeadlineExceeded {
        /// The backend call that was cancelled.
        operation: &'static str,
    },
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_target() {
        assert!(ObjectTarget::new("bucket", "key").validate().is_ok());
        assert!(matches!(
            ObjectTarget::new("", "key").validate(),
            Err(ConfigurationError::EmptyBucket)
        ));
        assert!(matches!(
            ObjectTarget::new("bucket", "").validate(),
            Err(ConfigurationError::EmptyKey)
        ));
    }

    #[test]
    fn displays_target() {
        let target = ObjectTarget::new("results", "batch/run_1/obj.jsonl");
        assert_eq!(target.to_string(), "results/batch/run_1/obj.jsonl");
    }
}
