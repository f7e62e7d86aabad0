//! Randomness seam
//!
//! Challenges, routing addresses, uuids and AES-GCM nonces all come from a
//! [`RandomSource`] so tests can substitute a deterministic sequence.

use rand::RngCore;

/// Source of the random bytes used when building messages
pub trait RandomSource: Send + Sync {
    /// Fill `dest` with random bytes
    fn fill_bytes(&self, dest: &mut [u8]);

    /// `len` random bytes
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.fill_bytes(&mut bytes);
        bytes
    }

    /// 16 random bytes, the size of challenges, uuids and routing addresses
    fn random_16(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        self.fill_bytes(&mut bytes);
        bytes
    }
}

/// Operating system randomness
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(dest);
    }
}
