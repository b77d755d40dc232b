//! Byte sizes used for planning and cutting uploads.

use std::fmt;
use std::num::NonZeroU64;

use crate::error::ConfigurationError;

/// Number of bytes in one mebibyte, the unit all `_mb` settings are expressed in.
pub const MIB: u64 = 1024 * 1024;

/// Converts fractional megabytes into bytes, truncating towards zero.
///
/// Negative and non-finite inputs convert to zero bytes.
pub fn megabytes_to_bytes(megabytes: f64) -> u64 {
    // Float to int casts saturate, and NaN becomes 0.
    (megabytes * MIB as f64) as u64
}

/// The size of a single part of a multipart upload.
///
/// Always at least one byte. Every part of an upload has exactly this size, except the final one
/// which may be shorter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartSize(NonZeroU64);

impl PartSize {
    /// Creates a part size from a number of bytes.
    pub fn new(bytes: u64) -> Result<Self, ConfigurationError> {
        NonZeroU64::new(bytes)
            .map(Self)
            .ok_or_else(|| ConfigurationError::InvalidPartSize(bytes.to_string()))
    }

    /// Creates a part size from fractional megabytes, e.g. `0.5` for 512 KiB.
    pub fn from_megabytes(megabytes: f64) -> Result<Self, ConfigurationError> {
        if !megabytes.is_finite() || megabytes <= 0.0 {
            return Err(ConfigurationError::InvalidPartSize(format!("{megabytes} MiB")));
        }

        let bytes = megabytes_to_bytes(megabytes);
        NonZeroU64::new(bytes)
            .map(Self)
            .ok_or_else(|| ConfigurationError::InvalidPartSize(format!("{megabytes} MiB")))
    }

    /// Returns the part size in bytes.
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Returns the part size in bytes as a buffer length.
    pub(crate) fn as_usize(self) -> usize {
        usize::try_from(self.get()).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for PartSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_fractional_megabytes() {
        assert_eq!(megabytes_to_bytes(0.5), 512 * 1024);
        assert_eq!(megabytes_to_bytes(1.5), 1536 * 1024);
        assert_eq!(megabytes_to_bytes(0.0), 0);
        // 0.001 MiB is 1048.576 bytes, truncated.
        assert_eq!(megabytes_to_bytes(0.001), 1048);
    }

    #[test]
    fn degenerate_megabytes_convert_to_zero() {
        assert_eq!(megabytes_to_bytes(-3.0), 0);
        assert_eq!(megabytes_to_bytes(f64::NAN), 0);
    }

    #[test]
    fn part_size_from_megabytes() {
        assert_eq!(PartSize::from_megabytes(0.5).unwrap().get(), 524_288);
        assert_eq!(PartSize::from_megabytes(8.0).unwrap().get(), 8 * MIB);
    }

    #[test]
    fn rejects_empty_part_sizes() {
        assert!(PartSize::new(0).is_err());
        assert!(PartSize::from_megabytes(0.0).is_err());
        assert!(PartSize::from_megabytes(-1.0).is_err());
        assert!(PartSize::from_megabytes(f64::INFINITY).is_err());
        assert!(PartSize::from_megabytes(f64::NAN).is_err());
        // Positive, but rounds down to zero bytes.
        assert!(PartSize::from_megabytes(1e-9).is_err());
    }
}
