//! AES-128-GCM command encryption
//!
//! The metadata block is bound to the ciphertext through the associated data,
//! which is `SHA256(metadata)` rather than the metadata itself.

use crate::ecdh::SharedKey;
use crate::{CryptoError, Result};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aead::consts::U12;
use aes_gcm::{Aes128Gcm, Nonce, Tag};
use sha2::{Digest, Sha256};

/// AES-GCM nonce length
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length
pub const AEAD_TAG_LEN: usize = 16;

fn cipher(key: &SharedKey) -> Result<Aes128Gcm> {
    Aes128Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength {
        expected: 16,
        actual: key.as_bytes().len(),
    })
}

fn check_nonce(nonce: &[u8]) -> Result<&Nonce<U12>> {
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength {
            expected: NONCE_LEN,
            actual: nonce.len(),
        });
    }
    Ok(Nonce::from_slice(nonce))
}

/// Encrypt `payload`, binding it to `metadata`
///
/// Returns the ciphertext (same length as the payload) and the detached tag.
pub fn encrypt_aead(
    payload: &[u8],
    metadata: &[u8],
    key: &SharedKey,
    nonce: &[u8],
) -> Result<(Vec<u8>, [u8; AEAD_TAG_LEN])> {
    let nonce = check_nonce(nonce)?;
    let aad = Sha256::digest(metadata);

    let mut buffer = payload.to_vec();
    let tag = cipher(key)?
        .encrypt_in_place_detached(nonce, &aad, &mut buffer)
        .map_err(|e| CryptoError::EncryptionFailed {
            message: e.to_string(),
        })?;

    Ok((buffer, tag.into()))
}

/// Inverse of [`encrypt_aead`]; fails if any input was tampered with
pub fn decrypt_aead(
    ciphertext: &[u8],
    tag: &[u8],
    metadata: &[u8],
    key: &SharedKey,
    nonce: &[u8],
) -> Result<Vec<u8>> {
    let nonce = check_nonce(nonce)?;
    if tag.len() != AEAD_TAG_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let aad = Sha256::digest(metadata);

    let mut buffer = ciphertext.to_vec();
    cipher(key)?
        .decrypt_in_place_detached(nonce, &aad, &mut buffer, Tag::from_slice(tag))
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = "000105010103021135594a3345314541374b4630303030303103104c463f9cc0d3d26906e982ed224adde6040400000a5f050400000001ff";

    fn shared() -> SharedKey {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice("b628048f414afe9a606f6c97195bb2e4", &mut bytes).unwrap();
        SharedKey::from_bytes(bytes)
    }

    fn nonce() -> Vec<u8> {
        (0u8..12).collect()
    }

    #[test]
    fn test_known_ciphertext() {
        let metadata = hex::decode(METADATA).unwrap();
        let payload = hex::decode("120452020801").unwrap();

        let (ciphertext, tag) = encrypt_aead(&payload, &metadata, &shared(), &nonce()).unwrap();
        assert_eq!(hex::encode(&ciphertext), "2f4c55252c40");
        assert_eq!(hex::encode(tag), "69acba364338ba33b6c31f462d6cc0cc");

        let plain = decrypt_aead(&ciphertext, &tag, &metadata, &shared(), &nonce()).unwrap();
        assert_eq!(plain, payload);
    }

    #[test]
    fn test_metadata_is_authenticated() {
        let metadata = hex::decode(METADATA).unwrap();
        let (ciphertext, tag) = encrypt_aead(b"unlock", &metadata, &shared(), &nonce()).unwrap();

        let mut altered = metadata.clone();
        let last_counter_byte = altered.len() - 2;
        altered[last_counter_byte] ^= 0x01;

        assert_eq!(
            decrypt_aead(&ciphertext, &tag, &altered, &shared(), &nonce()),
            Err(CryptoError::DecryptionFailed)
        );
    }

    #[test]
    fn test_nonce_length_enforced() {
        assert_eq!(
            encrypt_aead(b"x", b"", &shared(), &[0u8; 8]),
            Err(CryptoError::InvalidNonceLength {
                expected: 12,
                actual: 8
            })
        );
    }

    #[test]
    fn test_truncated_tag_rejected() {
        let (ciphertext, tag) = encrypt_aead(b"x", b"", &shared(), &nonce()).unwrap();
        assert_eq!(
            decrypt_aead(&ciphertext, &tag[..8], b"", &shared(), &nonce()),
            Err(CryptoError::DecryptionFailed)
        );
    }
}
