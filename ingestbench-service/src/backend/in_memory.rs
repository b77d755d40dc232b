//! In-memory backend for dry runs and tests.
//!
//! [`InMemoryBackend`] enforces the multipart protocol the same way S3 does: unknown upload ids
//! are rejected, and so are completions with gaps, stale tags or no parts at all. It records every
//! call it receives and can be told to fail specific calls through [`Faults`]. The backend is
//! [`Clone`] so tests can keep a handle for inspection while an uploader owns another copy.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use uuid::Uuid;

use super::common::{
    Backend, BackendError, BackendResult, EntityTag, ObjectTarget, PutResponse, UploadId,
    UploadPart,
};

/// Highest part number S3 accepts.
const MAX_PART_NUMBER: u32 = 10_000;

/// Failures and latency injected into an [`InMemoryBackend`].
#[derive(Clone, Debug, Default)]
pub struct Faults {
    /// Fail every `initiate_upload`.
    pub fail_initiate: bool,
    /// Fail `upload_part` for this part number.
    pub fail_part: Option<u32>,
    /// Fail every `complete_upload`.
    pub fail_complete: bool,
    /// Fail every `abort_upload`.
    pub fail_abort: bool,
    /// Delay applied to every call before it takes effect.
    pub latency: Duration,
}

/// A call received by an [`InMemoryBackend`], in the order it took effect.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    /// A single-shot put.
    PutObject { target: ObjectTarget, len: usize },
    /// A new upload session.
    Initiate { target: ObjectTarget },
    /// A part upload, with the tag that was returned for it.
    UploadPart {
        upload_id: UploadId,
        part_number: u32,
        len: usize,
        entity_tag: Option<EntityTag>,
    },
    /// A completion request with the parts it listed.
    Complete {
        upload_id: UploadId,
        parts: Vec<UploadPart>,
    },
    /// An abort request.
    Abort { upload_id: UploadId },
}

#[derive(Debug)]
struct PendingUpload {
    target: ObjectTarget,
    parts: BTreeMap<u32, (EntityTag, Bytes)>,
}

#[derive(Debug, Default)]
struct Store {
    objects: HashMap<ObjectTarget, Bytes>,
    uploads: HashMap<UploadId, PendingUpload>,
    calls: Vec<BackendCall>,
}

/// A [`Backend`] keeping objects in a `HashMap`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    faults: Faults,
    store: Arc<Mutex<Store>>,
}

impl InMemoryBackend {
    /// Creates an empty backend without injected faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend that fails calls as described by `faults`.
    pub fn with_faults(faults: Faults) -> Self {
        Self {
            faults,
            store: Default::default(),
        }
    }

    /// Returns all calls received so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Returns the contents of a stored object, if present.
    pub fn object(&self, target: &ObjectTarget) -> Option<Bytes> {
        self.lock().objects.get(target).cloned()
    }

    /// Returns the number of upload sessions that were neither completed nor aborted.
    pub fn open_uploads(&self) -> usize {
        self.lock().uploads.len()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        if !self.faults.latency.is_zero() {
            tokio::time::sleep(self.faults.latency).await;
        }
    }
}

fn rejected(context: impl Into<String>) -> BackendError {
    BackendError::Rejected {
        context: context.into(),
    }
}

fn check_session<'a>(
    store: &'a mut Store,
    target: &ObjectTarget,
    upload_id: &UploadId,
) -> BackendResult<&'a mut PendingUpload> {
    match store.uploads.get_mut(upload_id) {
        Some(upload) if upload.target == *target => Ok(upload),
        Some(_) => Err(rejected(format!("upload {upload_id} belongs to another key"))),
        None => Err(rejected(format!("no such upload: {upload_id}"))),
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(
        &self,
        target: &ObjectTarget,
        _content_type: &str,
        payload: Bytes,
    ) -> BackendResult<PutResponse> {
        self.delay().await;

        let mut store = self.lock();
        store.calls.push(BackendCall::PutObject {
            target: target.clone(),
            len: payload.len(),
        });
        store.objects.insert(target.clone(), payload);

        Ok(PutResponse {
            entity_tag: Some(EntityTag::new(format!("\"{}\"", Uuid::new_v4().simple()))),
        })
    }

    async fn initiate_upload(&self, target: &ObjectTarget) -> BackendResult<UploadId> {
        self.delay().await;

        let mut store = self.lock();
        store.calls.push(BackendCall::Initiate {
            target: target.clone(),
        });
        if self.faults.fail_initiate {
            return Err(rejected("injected initiate failure"));
        }

        let upload_id = UploadId::new(Uuid::new_v4().simple().to_string());
        store.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                target: target.clone(),
                parts: BTreeMap::new(),
            },
        );

        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
        part_number: u32,
        payload: Bytes,
    ) -> BackendResult<EntityTag> {
        self.delay().await;

        let mut store = self.lock();
        let len = payload.len();

        let result = if self.faults.fail_part == Some(part_number) {
            Err(rejected(format!("injected failure for part {part_number}")))
        } else if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            Err(rejected(format!("invalid part number {part_number}")))
        } else {
            check_session(&mut store, target, upload_id).map(|upload| {
                let entity_tag = EntityTag::new(format!("\"{}\"", Uuid::new_v4().simple()));
                upload
                    .parts
                    .insert(part_number, (entity_tag.clone(), payload));
                entity_tag
            })
        };

        store.calls.push(BackendCall::UploadPart {
            upload_id: upload_id.clone(),
            part_number,
            len,
            entity_tag: result.as_ref().ok().cloned(),
        });

        result
    }

    async fn complete_upload(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
        parts: &[UploadPart],
    ) -> BackendResult<String> {
        self.delay().await;

        let mut store = self.lock();
        store.calls.push(BackendCall::Complete {
            upload_id: upload_id.clone(),
            parts: parts.to_vec(),
        });
        if self.faults.fail_complete {
            return Err(rejected("injected complete failure"));
        }

        let upload = check_session(&mut store, target, upload_id)?;
        if parts.is_empty() {
            return Err(rejected("an upload must list at least one part"));
        }

        let mut object = BytesMut::new();
        for (expected, part) in (1..).zip(parts) {
            if part.part_number != expected {
                return Err(rejected(format!(
                    "expected part {expected}, got part {}",
                    part.part_number
                )));
            }
            match upload.parts.get(&part.part_number) {
                Some((entity_tag, payload)) if *entity_tag == part.entity_tag => {
                    object.extend_from_slice(payload);
                }
                Some(_) => {
                    return Err(rejected(format!(
                        "entity tag mismatch for part {}",
                        part.part_number
                    )));
                }
                None => {
                    return Err(rejected(format!("part {} was never uploaded", part.part_number)));
                }
            }
        }

        store.uploads.remove(upload_id);
        store.objects.insert(target.clone(), object.freeze());

        Ok(format!("memory://{target}"))
    }

    async fn abort_upload(
        &self,
        target: &ObjectTarget,
        upload_id: &UploadId,
    ) -> BackendResult<()> {
        self.delay().await;

        let mut store = self.lock();
        store.calls.push(BackendCall::Abort {
            upload_id: upload_id.clone(),
        });
        if self.faults.fail_abort {
            return Err(rejected("injected abort failure"));
        }

        check_session(&mut store, target, upload_id)?;
        store.uploads.remove(upload_id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ObjectTarget {
        ObjectTarget::new("bucket", "key")
    }

    async fn upload_two_parts(backend: &InMemoryBackend) -> (UploadId, Vec<UploadPart>) {
        let upload_id = backend.initiate_upload(&target()).await.unwrap();
        let mut parts = Vec::new();
        for (part_number, payload) in [(1, "oh "), (2, "hai!")] {
            let entity_tag = backend
                .upload_part(&target(), &upload_id, part_number, payload.into())
                .await
                .unwrap();
            parts.push(UploadPart {
                part_number,
                entity_tag,
            });
        }
        (upload_id, parts)
    }

    #[tokio::test]
    async fn assembles_completed_upload() {
        let backend = InMemoryBackend::new();
        let (upload_id, parts) = upload_two_parts(&backend).await;

        let location = backend
            .complete_upload(&target(), &upload_id, &parts)
            .await
            .unwrap();

        assert_eq!(location, "memory://bucket/key");
        assert_eq!(backend.object(&target()).unwrap().as_ref(), b"oh hai!");
        assert_eq!(backend.open_uploads(), 0);
    }

    #[tokio::test]
    async fn rejects_gaps_in_parts() {
        let backend = InMemoryBackend::new();
        let (upload_id, parts) = upload_two_parts(&backend).await;

        let result = backend
            .complete_upload(&target(), &upload_id, &parts[1..])
            .await;

        assert!(matches!(result, Err(BackendError::Rejected { .. })));
        assert_eq!(backend.object(&target()), None);
    }

    #[tokio::test]
    async fn rejects_stale_entity_tags() {
        let backend = InMemoryBackend::new();
        let (upload_id, mut parts) = upload_two_parts(&backend).await;
        parts[0].entity_tag = EntityTag::new("\"stale\"");

        let result = backend.complete_upload(&target(), &upload_id, &parts).await;

        assert!(matches!(result, Err(BackendError::Rejected { .. })));
    }

    #[tokio::test]
    async fn rejects_empty_completion() {
        let backend = InMemoryBackend::new();
        let upload_id = backend.initiate_upload(&target()).await.unwrap();

        let result = backend.complete_upload(&target(), &upload_id, &[]).await;

        assert!(matches!(result, Err(BackendError::Rejected { .. })));
        assert_eq!(backend.open_uploads(), 1);
    }

    #[tokio::test]
    async fn abort_discards_session() {
        let backend = InMemoryBackend::new();
        let (upload_id, parts) = upload_two_parts(&backend).await;

        backend.abort_upload(&target(), &upload_id).await.unwrap();

        assert_eq!(backend.open_uploads(), 0);
        let result = backend.complete_upload(&target(), &upload_id, &parts).await;
        assert!(matches!(result, Err(BackendError::Rejected { .. })));
        assert!(backend.abort_upload(&target(), &upload_id).await.is_err());
    }

    #[tokio::test]
    async fn rejects_session_of_other_key() {
        let backend = InMemoryBackend::new();
        let upload_id = backend.initiate_upload(&target()).await.unwrap();

        let other = ObjectTarget::new("bucket", "other");
        let result = backend
            .upload_part(&other, &upload_id, 1, Bytes::from_static(b"x"))
            .await;

        assert!(matches!(result, Err(BackendError::Rejected { .. })));
    }

    #[tokio::test]
    async fn injects_part_failure() {
        let backend = InMemoryBackend::with_faults(Faults {
            fail_part: Some(2),
            ..Default::default()
        });
        let upload_id = backend.initiate_upload(&target()).await.unwrap();

        assert!(
            backend
                .upload_part(&target(), &upload_id, 1, Bytes::from_static(b"a"))
                .await
                .is_ok()
        );
        assert!(
            backend
                .upload_part(&target(), &upload_id, 2, Bytes::from_static(b"b"))
                .await
                .is_err()
        );

        let recorded_tags: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::UploadPart { entity_tag, .. } => Some(entity_tag.is_some()),
                _ => None,
            })
            .collect();
        assert_eq!(recorded_tags, [true, false]);
    }

    #[tokio::test]
    async fn stores_single_objects() {
        let backend = InMemoryBackend::new();

        let response = backend
            .put_object(&target(), "application/json", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        assert!(response.entity_tag.is_some());
        assert_eq!(backend.object(&target()).unwrap().as_ref(), b"{}");
        assert_eq!(
            backend.calls(),
            [BackendCall::PutObject {
                target: target(),
                len: 2
            }]
        );
    }
}
