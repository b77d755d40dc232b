//! Blackbox tests streaming generated objects through the uploader.
//!
//! These tests assert that the object assembled by the backend is byte-identical to the generated
//! payload, and that the planned part layout matches the observed one.

use std::sync::Arc;

use ingestbench_service::backend::{BackendCall, InMemoryBackend, ObjectTarget};
use ingestbench_service::generator::LargeObject;
use ingestbench_service::multipart::MultipartUploader;
use ingestbench_service::size::PartSize;
use ingestbench_service::stats::MultipartStats;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn generated_bytes(total: u64) -> Vec<u8> {
    LargeObject::new(total).flat_map(|chunk| chunk.to_vec()).collect()
}

fn target() -> ObjectTarget {
    ObjectTarget::new("results", "batch/run_roundtrip/object.jsonl")
}

#[tokio::test]
async fn test_uploads_fractional_megabytes() {
    ingestbench_test::tracing::init();
    let backend = InMemoryBackend::new();
    let part_size = PartSize::from_megabytes(0.75).unwrap();
    let object = LargeObject::from_megabytes(2.5);
    let stats = MultipartStats::new(object.total_bytes(), part_size);

    let outcome = MultipartUploader::new(Arc::new(backend.clone()), part_size)
        .upload(&target(), object.into_stream())
        .await
        .unwrap();

    assert_eq!(outcome.part_count as u64, stats.total_parts);
    assert_eq!(outcome.part_size, part_size);

    let stored = backend.object(&target()).unwrap();
    assert_eq!(stored.len() as u64, stats.total_bytes);
    assert_eq!(stored.as_ref(), generated_bytes(stats.total_bytes));

    let last_part = backend
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::UploadPart { len, .. } => Some(len as u64),
            _ => None,
        })
        .last();
    assert_eq!(last_part, Some(stats.last_part_bytes));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_roundtrip_matches_generator(total in 1u64..3_500_000, part in 1024u64..1_500_000) {
        let backend = InMemoryBackend::new();
        let part_size = PartSize::new(part).unwrap();
        let uploader = MultipartUploader::new(Arc::new(backend.clone()), part_size);

        let outcome = runtime()
            .block_on(uploader.upload(&target(), LargeObject::new(total).into_stream()))
            .unwrap();

        let stats = MultipartStats::new(total, part_size);
        prop_assert_eq!(outcome.part_count as u64, stats.total_parts);
        prop_assert_eq!(backend.open_uploads(), 0);

        let stored = backend.object(&target()).unwrap();
        let expected = generated_bytes(total);
        prop_assert_eq!(stored.as_ref(), expected.as_slice());
    }
}
