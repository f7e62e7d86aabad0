//! # vcmd-crypto
//!
//! Cryptographic primitives for the vehicle command protocol:
//!
//! - P-256 key pairs and peer keys ([`keys`])
//! - ECDH with the SHA-1 truncation the vehicle expects ([`ecdh`])
//! - Purpose-bound HMAC-SHA256 subkeys and tags ([`mac`])
//! - AES-128-GCM with hashed associated data ([`aead`])
//!
//! Nothing here performs IO beyond reading a PEM file, and nothing retries.

#![forbid(unsafe_code)]

pub mod aead;
pub mod ecdh;
pub mod error;
pub mod keys;
pub mod mac;

pub use aead::{decrypt_aead, encrypt_aead, AEAD_TAG_LEN, NONCE_LEN};
pub use ecdh::{derive_shared_secret, shared_key_from_raw, SharedKey, SHARED_KEY_LEN};
pub use error::{CryptoError, Result};
pub use keys::{ClientKeyPair, PeerPublicKey, PUBLIC_KEY_LEN, SECRET_KEY_LEN};
pub use mac::{compute_tag, derive_key, tags_equal, DerivedKey, KeyPurpose, TAG_LEN};
