//! Storage backends the uploader talks to.

mod common;
mod in_memory;
mod s3;

pub use common::{
    Backend, BackendError, BackendResult, EntityTag, ObjectTarget, PutResponse,
    SharedBackend, UploadId, UploadPart,
};
pub use in_memory::{BackendCall, Faults, InMemoryBackend};
pub use s3::{S3Backend, S3BackendConfig};
