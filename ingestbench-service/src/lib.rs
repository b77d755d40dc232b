//! The measurement core of ingestbench.
//!
//! A [`LargeObject`](generator::LargeObject) produces a deterministic, non-compressible byte
//! stream of a requested size. The [`MultipartUploader`](multipart::MultipartUploader) re-cuts
//! that stream into fixed-size parts and drives the multipart protocol against a storage
//! [`Backend`](backend::Backend): initiate, upload every part in order, then complete. Any
//! failure after initiation makes it try an abort before the error is returned.
//!
//! [`MultipartStats`](stats::MultipartStats) predicts the part layout of an upload without
//! touching the network, which is used both to plan a run and to check its outcome.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod error;
pub mod generator;
pub mod multipart;
pub mod size;
pub mod stats;
mod stream;

pub use crate::error::{ConfigurationError, UploadError, UploadPhase};
pub use crate::stream::PayloadStream;
