//! Up-front accounting of how an object will be split into parts.

use crate::size::PartSize;

/// The expected part layout of a multipart upload.
///
/// This is computed from sizes alone and never performs I/O. Compare
/// [`total_parts`](Self::total_parts) with the observed
/// [`part_count`](crate::multipart::UploadOutcome::part_count) to check an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultipartStats {
    /// Size of the whole object.
    pub total_bytes: u64,
    /// Size of every part but the last.
    pub part_size_bytes: u64,
    /// Number of parts the object is split into.
    pub total_parts: u64,
    /// Size of the final part, which is a full part if the object divides evenly.
    pub last_part_bytes: u64,
}

impl MultipartStats {
    /// Computes the part layout for an object of `total_bytes` cut into `part_size` parts.
    pub fn new(total_bytes: u64, part_size: PartSize) -> Self {
        let part_size_bytes = part_size.get();

        if total_bytes == 0 {
            return Self {
                total_bytes,
                part_size_bytes,
                total_parts: 0,
                last_part_bytes: 0,
            };
        }

        let last_part_bytes = match total_bytes % part_size_bytes {
            0 => part_size_bytes,
            remainder => remainder,
        };

        Self {
            total_bytes,
            part_size_bytes,
            total_parts: total_bytes.div_ceil(part_size_bytes),
            last_part_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn part_size(bytes: u64) -> PartSize {
        PartSize::new(bytes).unwrap()
    }

    #[test]
    fn exact_fit() {
        let stats = MultipartStats::new(1_048_576, part_size(524_288));
        assert_eq!(
            stats,
            MultipartStats {
                total_bytes: 1_048_576,
                part_size_bytes: 524_288,
                total_parts: 2,
                last_part_bytes: 524_288,
            }
        );
    }

    #[test]
    fn three_full_parts() {
        let stats = MultipartStats::new(1_572_864, part_size(524_288));
        assert_eq!(stats.total_parts, 3);
        assert_eq!(stats.last_part_bytes, 524_288);
    }

    #[test]
    fn short_final_part() {
        let stats = MultipartStats::new(1_000_000, part_size(524_288));
        assert_eq!(stats.total_parts, 2);
        assert_eq!(stats.last_part_bytes, 1_000_000 - 524_288);
    }

    #[test]
    fn object_smaller_than_one_part() {
        let stats = MultipartStats::new(100 * 1024, PartSize::from_megabytes(0.5).unwrap());
        assert_eq!(stats.total_parts, 1);
        assert_eq!(stats.last_part_bytes, 100 * 1024);
    }

    #[test]
    fn empty_object() {
        let stats = MultipartStats::new(0, part_size(512));
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.part_size_bytes, 512);
        assert_eq!(stats.total_parts, 0);
        assert_eq!(stats.last_part_bytes, 0);
    }

    proptest! {
        #[test]
        fn layout_adds_up(total in 0u64..1 << 40, part in 1u64..1 << 30) {
            let stats = MultipartStats::new(total, part_size(part));

            if total == 0 {
                prop_assert_eq!(stats.total_parts, 0);
                prop_assert_eq!(stats.last_part_bytes, 0);
            } else {
                prop_assert!(stats.last_part_bytes > 0);
                prop_assert!(stats.last_part_bytes <= part);
                prop_assert_eq!((stats.total_parts - 1) * part + stats.last_part_bytes, total);
            }

            if total > 0 && total % part == 0 {
                prop_assert_eq!(stats.last_part_bytes, part);
            } else {
                prop_assert_eq!(stats.last_part_bytes, total % part);
            }
        }
    }
}
