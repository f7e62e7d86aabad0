//! Shared secret derivation
//!
//! The session key is not the raw ECDH output: the x-coordinate is left-padded
//! to 32 bytes, hashed with SHA-1 and truncated to an AES-128 key.

use crate::keys::{ClientKeyPair, PeerPublicKey};
use crate::{CryptoError, Result};
use sha1::{Digest, Sha1};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the derived session key
pub const SHARED_KEY_LEN: usize = 16;

const PADDED_SECRET_LEN: usize = 32;

/// A 16-byte key negotiated with a vehicle for one session epoch
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey([u8; SHARED_KEY_LEN]);

impl SharedKey {
    /// Wrap raw key bytes
    pub const fn from_bytes(bytes: [u8; SHARED_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw key bytes
    pub fn as_bytes(&self) -> &[u8; SHARED_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKey").finish_non_exhaustive()
    }
}

/// Derive the session key from our private key and the peer's public key
///
/// Symmetric: `derive_shared_secret(a, B) == derive_shared_secret(b, A)`.
pub fn derive_shared_secret(local: &ClientKeyPair, peer: &PeerPublicKey) -> Result<SharedKey> {
    let shared = p256::ecdh::diffie_hellman(
        local.secret().to_nonzero_scalar(),
        peer.key().as_affine(),
    );
    shared_key_from_raw(shared.raw_secret_bytes().as_slice())
}

/// Pad, hash and truncate a raw big-endian DH output
pub fn shared_key_from_raw(raw: &[u8]) -> Result<SharedKey> {
    if raw.len() > PADDED_SECRET_LEN {
        return Err(CryptoError::SharedSecretTooLong { actual: raw.len() });
    }

    let mut padded = [0u8; PADDED_SECRET_LEN];
    padded[PADDED_SECRET_LEN - raw.len()..].copy_from_slice(raw);

    let digest = Sha1::digest(padded);
    padded.zeroize();

    let mut key = [0u8; SHARED_KEY_LEN];
    key.copy_from_slice(&digest[..SHARED_KEY_LEN]);
    Ok(SharedKey(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(byte: u8) -> ClientKeyPair {
        ClientKeyPair::from_secret_bytes(&[byte; 32]).unwrap()
    }

    #[test]
    fn test_known_shared_key() {
        let client = pair(0x11);
        let vehicle = pair(0x22);
        let peer = PeerPublicKey::from_sec1_bytes(vehicle.public_key_bytes()).unwrap();

        let key = derive_shared_secret(&client, &peer).unwrap();
        assert_eq!(hex::encode(key.as_bytes()), "b628048f414afe9a606f6c97195bb2e4");
    }

    #[test]
    fn test_short_output_is_left_padded() {
        let short = [0xabu8; 31];
        let mut padded = vec![0u8];
        padded.extend_from_slice(&short);

        assert_eq!(
            shared_key_from_raw(&short).unwrap(),
            shared_key_from_raw(&padded).unwrap()
        );
    }

    #[test]
    fn test_oversized_output_rejected() {
        assert_eq!(
            shared_key_from_raw(&[1u8; 33]),
            Err(CryptoError::SharedSecretTooLong { actual: 33 })
        );
    }
}
