//! Streaming multipart uploads.
//!
//! [`MultipartUploader::upload`] consumes a [`PayloadStream`] of arbitrarily sized chunks, cuts
//! it into parts of a fixed size with a [`PartAccumulator`] and drives a [`MultipartSession`]
//! through initiate, sequential part uploads and completion. Any failure after the session was
//! initiated is followed by a single abort before the error is returned.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::time::Instant;

use crate::PayloadStream;
use crate::backend::{
    Backend, BackendError, BackendResult, ObjectTarget, SharedBackend, UploadId, UploadPart,
};
use crate::error::{UploadError, UploadPhase};
use crate::size::PartSize;

/// Time an abort may take after a failed upload, independent of the upload deadline.
pub const DEFAULT_ABORT_GRACE: Duration = Duration::from_secs(5);

/// A part cut from the chunk stream, ready to be uploaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingPart {
    /// One-based number of the part.
    pub part_number: u32,
    /// Contents of the part.
    pub payload: Bytes,
}

/// Re-buffers chunks of any size into parts of a fixed size.
///
/// Part numbers are assigned in the order parts are taken out, starting at 1.
#[derive(Debug)]
pub struct PartAccumulator {
    part_size: usize,
    buffer: BytesMut,
    next_part_number: u32,
}

impl PartAccumulator {
    /// Creates an empty accumulator cutting parts of `part_size`.
    pub fn new(part_size: PartSize) -> Self {
        Self {
            part_size: part_size.as_usize(),
            buffer: BytesMut::new(),
            next_part_number: 1,
        }
    }

    /// Appends a chunk to the pending buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Takes the next full part out of the buffer, if enough bytes are pending.
    ///
    /// Call this until it returns `None` after every [`push`](Self::push).
    pub fn next_full_part(&mut self) -> Option<PendingPart> {
        if self.buffer.len() < self.part_size {
            return None;
        }

        let payload = self.buffer.split_to(self.part_size).freeze();
        Some(self.take_part(payload))
    }

    /// Flushes the remaining bytes as the final part. An empty buffer yields no part.
    pub fn finish(mut self) -> Option<PendingPart> {
        if self.buffer.is_empty() {
            return None;
        }

        let payload = std::mem::take(&mut self.buffer).freeze();
        Some(self.take_part(payload))
    }

    /// The number the next part will get.
    pub fn next_part_number(&self) -> u32 {
        self.next_part_number
    }

    /// The number of bytes pending that do not yet fill a part.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    fn take_part(&mut self, payload: Bytes) -> PendingPart {
        let part_number = self.next_part_number;
        self.next_part_number += 1;
        PendingPart {
            part_number,
            payload,
        }
    }
}

/// Awaits a backend call, failing it once `deadline` has passed.
async fn bounded<T>(
    deadline: Option<Instant>,
    operation: &'static str,
    call: impl Future<Output = BackendResult<T>>,
) -> BackendResult<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, call)
            .await
            .map_err(|_| BackendError::DeadlineExceeded { operation })?,
        None => call.await,
    }
}

/// Pulls the next chunk, failing with [`io::ErrorKind::TimedOut`] once `deadline` has passed.
async fn next_chunk(
    chunks: &mut PayloadStream,
    deadline: Option<Instant>,
) -> io::Result<Option<Bytes>> {
    let item = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, chunks.next())
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    "chunk stream did not yield before the deadline",
                )
            })?,
        None => chunks.next().await,
    };

    item.transpose()
}

/// An initiated multipart upload.
///
/// A session only exists after a successful initiate. [`complete`](Self::complete) and
/// [`abort`](Self::abort) consume it, so no part can be uploaded after either of them.
#[derive(Debug)]
pub struct MultipartSession<'a> {
    backend: &'a dyn Backend,
    target: &'a ObjectTarget,
    upload_id: UploadId,
    parts: Vec<UploadPart>,
    deadline: Option<Instant>,
}

impl<'a> MultipartSession<'a> {
    /// Opens a new upload session for `target`.
    ///
    /// All calls made through the session, except the abort, fail once `deadline` has passed.
    pub async fn initiate(
        backend: &'a dyn Backend,
        target: &'a ObjectTarget,
        deadline: Option<Instant>,
    ) -> BackendResult<Self> {
        let upload_id =
            bounded(deadline, "initiate_upload", backend.initiate_upload(target)).await?;
        tracing::debug!(%upload_id, "Initiated multipart upload");

        Ok(Self {
            backend,
            target,
            upload_id,
            parts: Vec::new(),
            deadline,
        })
    }

    /// The token of this session.
    pub fn upload_id(&self) -> &UploadId {
        &self.upload_id
    }

    /// The parts committed so far, in ascending order.
    pub fn parts(&self) -> &[UploadPart] {
        &self.parts
    }

    /// Uploads the next part and records its tag.
    ///
    /// Parts must be passed in the order a [`PartAccumulator`] produces them.
    pub async fn upload_part(&mut self, part: PendingPart) -> BackendResult<()> {
        debug_assert_eq!(part.part_number as usize, self.parts.len() + 1);

        let PendingPart {
            part_number,
            payload,
        } = part;
        let len = payload.len();

        let entity_tag = bounded(
            self.deadline,
            "upload_part",
            self.backend
                .upload_part(self.target, &self.upload_id, part_number, payload),
        )
        .await?;

        tracing::debug!(part_number, bytes = len, %entity_tag, "Uploaded part");
        self.parts.push(UploadPart {
            part_number,
            entity_tag,
        });

        Ok(())
    }

    /// Assembles the object from all uploaded parts and returns its location.
    ///
    /// On failure the session is handed back so that it can still be aborted.
    pub async fn complete(self) -> Result<String, (BackendError, Self)> {
        let result = bounded(
            self.deadline,
            "complete_upload",
            self.backend
                .complete_upload(self.target, &self.upload_id, &self.parts),
        )
        .await;

        match result {
            Ok(location) => {
                tracing::debug!(parts = self.parts.len(), %location, "Completed multipart upload");
                Ok(location)
            }
            Err(error) => Err((error, self)),
        }
    }

    /// Discards the session and all of its parts.
    ///
    /// The abort is not bound to the upload deadline but to its own `grace` period.
    pub async fn abort(self, grace: Duration) -> BackendResult<()> {
        tracing::debug!(upload_id = %self.upload_id, "Aborting multipart upload");

        let deadline = Instant::now() + grace;
        bounded(
            Some(deadline),
            "abort_upload",
            self.backend.abort_upload(self.target, &self.upload_id),
        )
        .await
    }
}

/// The result of a successful multipart upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Location of the finished object, as reported by the backend.
    pub location: String,
    /// Number of parts that were uploaded.
    pub part_count: usize,
    /// The part size the object was cut into.
    pub part_size: PartSize,
}

/// Uploads chunk streams as multipart objects, one part at a time.
///
/// Each call to [`upload`](Self::upload) runs its own session, so one uploader can serve
/// concurrent uploads.
#[derive(Clone, Debug)]
pub struct MultipartUploader {
    backend: SharedBackend,
    part_size: PartSize,
    deadline: Option<Duration>,
    abort_grace: Duration,
}

impl MultipartUploader {
    /// Creates an uploader cutting objects into parts of `part_size`, without a deadline.
    pub fn new(backend: SharedBackend, part_size: PartSize) -> Self {
        Self {
            backend,
            part_size,
            deadline: None,
            abort_grace: DEFAULT_ABORT_GRACE,
        }
    }

    /// Fails uploads that take longer than `deadline`, measured from the start of each upload.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets how long the cleanup abort after a failure may take.
    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    /// The size of the parts this uploader produces.
    pub fn part_size(&self) -> PartSize {
        self.part_size
    }

    /// Uploads all chunks of `chunks` into a new object at `target`.
    ///
    /// The stream is consumed lazily, so at most one part plus one chunk is held in memory. If the
    /// upload fails after the session was initiated, the session is aborted before the error is
    /// returned. A failed abort is logged and attached to the error as
    /// [`abort_error`](UploadError::abort_error).
    ///
    /// Dropping the returned future before it resolves leaves the session open on the backend.
    /// The same holds when the deadline expires during initiation: the backend may have created a
    /// session whose token never arrived, so no abort is attempted.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(%target, part_size = self.part_size.get())
    )]
    pub async fn upload(
        &self,
        target: &ObjectTarget,
        chunks: PayloadStream,
    ) -> Result<UploadOutcome, UploadError> {
        target.validate()?;

        let deadline = self.deadline.map(|deadline| Instant::now() + deadline);
        let mut session = MultipartSession::initiate(self.backend.as_ref(), target, deadline)
            .await
            .map_err(|cause| UploadError::backend(UploadPhase::Initiate, cause))?;

        if let Err(error) = self.upload_parts(&mut session, chunks).await {
            return Err(self.abort(session, error).await);
        }

        let part_count = session.parts().len();
        match session.complete().await {
            Ok(location) => Ok(UploadOutcome {
                location,
                part_count,
                part_size: self.part_size,
            }),
            Err((cause, session)) => {
                let error = UploadError::backend(UploadPhase::Complete, cause);
                Err(self.abort(session, error).await)
            }
        }
    }

    async fn upload_parts(
        &self,
        session: &mut MultipartSession<'_>,
        mut chunks: PayloadStream,
    ) -> Result<(), UploadError> {
        let mut accumulator = PartAccumulator::new(self.part_size);

        loop {
            let assembling = UploadPhase::UploadPart {
                part_number: accumulator.next_part_number(),
            };
            let chunk = next_chunk(&mut chunks, session.deadline)
                .await
                .map_err(|cause| UploadError::stream(assembling, cause))?;
            let Some(chunk) = chunk else { break };

            accumulator.push(&chunk);
            while let Some(part) = accumulator.next_full_part() {
                upload_part(session, part).await?;
            }
        }

        if let Some(part) = accumulator.finish() {
            upload_part(session, part).await?;
        }

        Ok(())
    }

    async fn abort(&self, session: MultipartSession<'_>, mut error: UploadError) -> UploadError {
        let upload_id = session.upload_id().clone();
        tracing::debug!(
            error = &error as &dyn std::error::Error,
            "Multipart upload failed"
        );

        if let Err(abort_error) = session.abort(self.abort_grace).await {
            tracing::warn!(
                error = &abort_error as &dyn std::error::Error,
                %upload_id,
                "Failed to abort multipart upload"
            );
            error.set_abort_error(abort_error);
        }

        error
    }
}

async fn upload_part(
    session: &mut MultipartSession<'_>,
    part: PendingPart,
) -> Result<(), UploadError> {
    let phase = UploadPhase::UploadPart {
        part_number: part.part_number,
    };
    session
        .upload_part(part)
        .await
        .map_err(|cause| UploadError::backend(phase, cause))
}
