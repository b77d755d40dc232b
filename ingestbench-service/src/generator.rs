//! Generation of large, deterministic upload payloads.

use std::iter::FusedIterator;

use bytes::Bytes;
use futures_util::StreamExt;

use crate::PayloadStream;
use crate::size::megabytes_to_bytes;

/// Maximum size of a chunk yielded by [`LargeObject`].
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// A lazily generated object of a fixed total size, yielded in chunks of [`CHUNK_SIZE`].
///
/// Every byte is its absolute offset in the object modulo 256. The contents are cheap to produce,
/// identical across runs, and do not compress well. Every chunk has the full size except the last,
/// which may be shorter. An empty object yields no chunks at all.
///
/// The iterator cannot be rewound. Create a new instance to produce the same bytes again.
#[derive(Debug)]
pub struct LargeObject {
    total_bytes: u64,
    position: u64,
}

impl LargeObject {
    /// Creates an object of exactly `total_bytes` bytes.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            position: 0,
        }
    }

    /// Creates an object of `megabytes` MiB, truncated to whole bytes.
    pub fn from_megabytes(megabytes: f64) -> Self {
        Self::new(megabytes_to_bytes(megabytes))
    }

    /// The size of the whole object.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// The number of bytes not yet yielded.
    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes - self.position
    }

    /// Converts the remaining chunks into a stream that can be passed to an uploader.
    ///
    /// Chunks are still generated one at a time, when the stream is polled.
    pub fn into_stream(self) -> PayloadStream {
        futures_util::stream::iter(self.map(Ok::<_, std::io::Error>)).boxed()
    }
}

impl Iterator for LargeObject {
    type Item = Bytes;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.remaining_bytes().min(CHUNK_SIZE as u64);
        if len == 0 {
            return None;
        }

        let start = self.position;
        // Truncation to `u8` is the `mod 256`.
        let chunk: Vec<u8> = (start..start + len).map(|offset| offset as u8).collect();
        self.position += len;

        Some(chunk.into())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let chunks = self.remaining_bytes().div_ceil(CHUNK_SIZE as u64);
        let chunks = usize::try_from(chunks).unwrap_or(usize::MAX);
        (chunks, Some(chunks))
    }
}

impl ExactSizeIterator for LargeObject {}

impl FusedIterator for LargeObject {}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use proptest::prelude::*;

    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn empty_object_has_no_chunks() {
        assert_eq!(LargeObject::from_megabytes(0.0).count(), 0);
        assert_eq!(LargeObject::new(0).len(), 0);
    }

    #[test]
    fn small_object_is_one_short_chunk() {
        let chunks: Vec<_> = LargeObject::new(1000).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1000);
    }

    #[test]
    fn one_megabyte_is_one_full_chunk() {
        let chunks: Vec<_> = LargeObject::from_megabytes(1.0).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), CHUNK_SIZE);
    }

    #[test]
    fn fractional_megabytes_end_with_short_chunk() {
        let chunks: Vec<_> = LargeObject::from_megabytes(2.5).collect();
        let sizes: Vec<_> = chunks.iter().map(Bytes::len).collect();
        assert_eq!(sizes, [CHUNK_SIZE, CHUNK_SIZE, CHUNK_SIZE / 2]);
    }

    #[test]
    fn bytes_follow_their_offset() {
        let object: Vec<u8> = LargeObject::new(CHUNK_SIZE as u64 + 300)
            .flat_map(|chunk| chunk.to_vec())
            .collect();

        for (offset, byte) in object.iter().enumerate() {
            assert_eq!(*byte as usize, offset % 256);
        }
        assert_ne!(object[0], object[1]);
        assert_ne!(object[1], object[2]);
    }

    #[test]
    fn tracks_remaining_bytes() {
        let mut object = LargeObject::new(MIB + 10);
        assert_eq!(object.total_bytes(), MIB + 10);
        assert_eq!(object.len(), 2);

        object.next();
        assert_eq!(object.remaining_bytes(), 10);
        assert_eq!(object.len(), 1);

        object.next();
        assert_eq!(object.remaining_bytes(), 0);
        assert_eq!(object.next(), None);
    }

    #[tokio::test]
    async fn streams_the_same_chunks() {
        let streamed: Vec<Bytes> = LargeObject::new(3 * MIB + 7)
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        let iterated: Vec<Bytes> = LargeObject::new(3 * MIB + 7).collect();

        assert_eq!(streamed, iterated);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn chunks_add_up_to_total(megabytes in 0.0f64..6.0) {
            let expected = megabytes_to_bytes(megabytes);
            let chunks: Vec<_> = LargeObject::from_megabytes(megabytes).collect();

            let total: u64 = chunks.iter().map(|chunk| chunk.len() as u64).sum();
            prop_assert_eq!(total, expected);

            prop_assert!(chunks.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= CHUNK_SIZE));
            let short = chunks.iter().filter(|chunk| chunk.len() < CHUNK_SIZE).count();
            prop_assert!(short <= 1);
            if let Some((_, init)) = chunks.split_last() {
                prop_assert!(init.iter().all(|chunk| chunk.len() == CHUNK_SIZE));
            }
        }

        #[test]
        fn output_is_deterministic(total in 0u64..3 * MIB) {
            let first: Vec<_> = LargeObject::new(total).collect();
            let second: Vec<_> = LargeObject::new(total).collect();
            prop_assert_eq!(first, second);
        }
    }
}
