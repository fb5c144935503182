//! Boundary detection for content-defined chunking.
//!
//! A node boundary is declared wherever a rolling hash of an entry's
//! encoded bytes falls into a window of size `1/bucket_factor`, giving
//! leaves (and, recursively, branches) an expected run length of
//! `bucket_factor` independent of insertion order.

use sha2::{Digest, Sha256};

pub struct BoundaryHasher {
    bucket_factor: u32,
}

impl BoundaryHasher {
    pub fn new(bucket_factor: u32) -> Self {
        assert!(bucket_factor > 0, "bucket_factor must be positive");
        Self { bucket_factor }
    }

    /// Whether the entry whose canonical bytes are `bytes` closes the
    /// current chunk.
    pub fn is_boundary(&self, bytes: &[u8]) -> bool {
        let digest = Sha256::digest(bytes);
        let lower = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        (lower % self.bucket_factor) == 0
    }

    pub fn bucket_factor(&self) -> u32 {
        self.bucket_factor
    }
}

impl Default for BoundaryHasher {
    fn default() -> Self {
        Self::new(super::DEFAULT_BUCKET_FACTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_frequency_matches_bucket_factor() {
        let hasher = BoundaryHasher::new(3);
        let mut boundary_count = 0;
        for i in 0..3000 {
            let key = format!("key{}", i);
            if hasher.is_boundary(key.as_bytes()) {
                boundary_count += 1;
            }
        }
        // Expected ~1000 boundaries for 3000 entries at bucket_factor 3.
        assert!(boundary_count > 700 && boundary_count < 1400);
    }

    #[test]
    fn test_boundary_is_deterministic() {
        let hasher = BoundaryHasher::new(3);
        let bytes = b"same entry every time";
        assert_eq!(hasher.is_boundary(bytes), hasher.is_boundary(bytes));
    }
}
