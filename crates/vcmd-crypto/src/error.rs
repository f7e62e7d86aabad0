//! Crypto errors
//!
//! Every failure in this crate is fatal to the operation that triggered it:
//! malformed key material and size violations are never retried.

/// Errors raised by the cryptographic primitives
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Peer public key bytes are not a valid SEC1 P-256 point
    #[error("Crypto error: invalid public key: {message}")]
    InvalidPublicKey {
        /// Parser detail
        message: String,
    },

    /// Private key material could not be parsed
    #[error("Crypto error: invalid private key: {message}")]
    InvalidPrivateKey {
        /// Parser detail
        message: String,
    },

    /// Raw Diffie-Hellman output exceeded the 32-byte padding window
    #[error("Crypto error: shared secret is {actual} bytes, expected at most 32")]
    SharedSecretTooLong {
        /// Length of the raw output
        actual: usize,
    },

    /// A key had the wrong length for the primitive
    #[error("Crypto error: invalid key length (expected {expected}, got {actual})")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// AES-GCM nonce had the wrong length
    #[error("Crypto error: invalid nonce length (expected {expected}, got {actual})")]
    InvalidNonceLength {
        /// Required length
        expected: usize,
        /// Supplied length
        actual: usize,
    },

    /// AEAD encryption failed
    #[error("Crypto error: encryption failed: {message}")]
    EncryptionFailed {
        /// Cipher detail
        message: String,
    },

    /// AEAD decryption or tag verification failed
    #[error("Crypto error: decryption failed")]
    DecryptionFailed,

    /// Key material could not be read from disk
    #[error("Crypto error: failed to read key file: {message}")]
    KeyFile {
        /// IO detail
        message: String,
    },
}

impl CryptoError {
    /// Create an invalid public key error
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey {
            message: message.into(),
        }
    }

    /// Create an invalid private key error
    pub fn invalid_private_key(message: impl Into<String>) -> Self {
        Self::InvalidPrivateKey {
            message: message.into(),
        }
    }
}

/// Crypto result type alias
pub type Result<T> = std::result::Result<T, CryptoError>;
