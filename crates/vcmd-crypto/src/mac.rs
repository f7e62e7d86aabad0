//! Purpose-bound HMAC-SHA256 keys and tags
//!
//! A session's shared key is never used directly as a MAC key. Each use gets
//! its own subkey, `HMAC-SHA256(shared_key, label)`, so a tag produced for one
//! purpose can never validate for another.

use crate::ecdh::SharedKey;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Length of a derived key and of a tag
pub const TAG_LEN: usize = 32;

/// What a derived key is allowed to authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPurpose {
    /// Validating the session info returned by a handshake
    SessionInfo,
    /// Tagging plaintext commands
    AuthenticatedCommand,
}

impl KeyPurpose {
    /// The ASCII label fed to the derivation HMAC
    pub fn label(&self) -> &'static str {
        match self {
            KeyPurpose::SessionInfo => "session info",
            KeyPurpose::AuthenticatedCommand => "authenticated command",
        }
    }
}

/// A 32-byte HMAC key bound to a single [`KeyPurpose`]
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    bytes: [u8; TAG_LEN],
    #[zeroize(skip)]
    purpose: KeyPurpose,
}

impl DerivedKey {
    /// The purpose this key was derived for
    pub fn purpose(&self) -> KeyPurpose {
        self.purpose
    }

    /// Borrow the raw key bytes
    pub fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> [u8; TAG_LEN] {
    // HMAC accepts keys of any length, so construction cannot fail
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any length"),
    };
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().into()
}

/// Derive the purpose-specific subkey `HMAC-SHA256(shared_key, label)`
pub fn derive_key(shared_key: &SharedKey, purpose: KeyPurpose) -> DerivedKey {
    DerivedKey {
        bytes: hmac_sha256(shared_key.as_bytes(), &[purpose.label().as_bytes()]),
        purpose,
    }
}

/// `HMAC-SHA256(key, metadata || payload)`
pub fn compute_tag(metadata: &[u8], payload: &[u8], key: &DerivedKey) -> [u8; TAG_LEN] {
    hmac_sha256(key.as_bytes(), &[metadata, payload])
}

/// Length check followed by a constant-time comparison
pub fn tags_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
