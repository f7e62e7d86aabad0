//! Error taxonomy for the vehicle command protocol
//!
//! Errors split along the lines a caller acts on: malformed local input
//! ([`ProtocolError`]), a handshake the vehicle answered badly
//! ([`HandshakeError`]), the relay itself failing ([`TransportError`]) and the
//! single terminal error surfaced to callers ([`VehicleError`]).

use crate::fault::{describe_fault, FaultClass};
use crate::wire::Domain;
use vcmd_crypto::CryptoError;

/// Boxed error returned by external collaborators
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Local encoding and framing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Protobuf bytes could not be decoded
    #[error("Protocol error: failed to decode {what}: {message}")]
    Decode {
        /// Which message was being decoded
        what: &'static str,
        /// Decoder detail
        message: String,
    },

    /// Base64 text could not be decoded
    #[error("Protocol error: invalid base64: {message}")]
    Base64 {
        /// Decoder detail
        message: String,
    },

    /// Metadata tags must be strictly increasing
    #[error("Protocol error: metadata tag {tag} added after tag {last}")]
    MetadataOrder {
        /// Tag being added
        tag: u8,
        /// Last tag already present
        last: u8,
    },

    /// Metadata values are length-prefixed with a single byte
    #[error("Protocol error: metadata value for tag {tag} is {len} bytes, limit is 255")]
    MetadataValueTooLong {
        /// Tag being added
        tag: u8,
        /// Value length
        len: usize,
    },

    /// Session epoch must be exactly 16 bytes
    #[error("Protocol error: epoch is {actual} bytes, expected 16")]
    InvalidEpochLength {
        /// Received length
        actual: usize,
    },

    /// The 32-bit counter cannot advance further in this epoch
    #[error("Protocol error: session counter exhausted, a new handshake is required")]
    CounterExhausted,

    /// Commands are framed with personalized HMAC or AES-GCM only
    #[error("Protocol error: unsupported signature type {signature_type}")]
    UnsupportedSignatureType {
        /// Requested signature type
        signature_type: i32,
    },

    /// Cryptographic primitive failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ProtocolError {
    /// Create a decode error
    pub fn decode(what: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            message: err.to_string(),
        }
    }
}

/// A handshake response was unusable
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// `to_destination.routing_address` was absent
    #[error("Handshake error: response missing routing address")]
    MissingRoutingAddress,

    /// The `session_info` payload was absent
    #[error("Handshake error: response missing session info")]
    MissingSessionInfo,

    /// `signature_data.session_info_tag` was absent
    #[error("Handshake error: response missing session info tag")]
    MissingSessionInfoTag,

    /// The session info tag did not verify
    #[error("Handshake error: session info tag mismatch")]
    InvalidSessionInfoTag,

    /// The vehicle does not have our public key on its whitelist
    #[error("Handshake error: client key is not paired with the vehicle")]
    KeyNotPaired,

    /// Session info could not be decoded or was malformed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Key agreement failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Failures reported by the transport collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The relay answered with a non-success HTTP status
    #[error("Transport error: HTTP {status}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, parsed as JSON when possible
        body: Option<serde_json::Value>,
    },

    /// The request never produced a response
    #[error("Transport error: network failure: {message}")]
    Network {
        /// Client detail
        message: String,
    },

    /// The request timed out
    #[error("Transport error: request timed out")]
    Timeout,

    /// The relay answered 2xx but the body was not a routable message
    #[error("Transport error: invalid response: {message}")]
    InvalidResponse {
        /// Decoder detail
        message: String,
    },
}

impl TransportError {
    /// Create an HTTP status error
    pub fn http(status: u16, body: Option<serde_json::Value>) -> Self {
        Self::Http { status, body }
    }

    /// HTTP status, if the relay answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for the two shapes the relay uses to say the access token is stale
    ///
    /// A 400 whose JSON `error` is `invalid_auth_code`, or a 401 with no body.
    pub fn needs_token_refresh(&self) -> bool {
        match self {
            TransportError::Http { status: 400, body } => body
                .as_ref()
                .and_then(|b| b.get("error"))
                .and_then(|e| e.as_str())
                .is_some_and(|e| e == "invalid_auth_code"),
            TransportError::Http { status: 401, body } => body_is_empty(body.as_ref()),
            _ => false,
        }
    }
}

fn body_is_empty(body: Option<&serde_json::Value>) -> bool {
    match body {
        None | Some(serde_json::Value::Null) => true,
        Some(serde_json::Value::String(s)) => s.is_empty(),
        Some(serde_json::Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// The single terminal error a vehicle operation returns
#[derive(Debug, thiserror::Error)]
pub enum VehicleError {
    /// Cryptographic failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Handshake response failed validation
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Local encoding or framing failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The vehicle rejected the message
    #[error("Vehicle fault ({class}): {}", describe_fault(*.fault))]
    Fault {
        /// Classification of the fault
        class: FaultClass,
        /// Raw fault code as reported
        fault: i32,
    },

    /// Relay failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The credential collaborator failed
    #[error("Credential provider failed: {0}")]
    Credentials(#[source] BoxError),

    /// Framing was attempted without an established session
    #[error("No session established for domain {domain:?}")]
    NoSession {
        /// Domain without a session
        domain: Domain,
    },

    /// The retry budget ran out
    #[error("Out of retries after {attempts} attempts: {last}")]
    OutOfRetries {
        /// Total attempts made
        attempts: u32,
        /// Failure observed on the final attempt
        last: Box<VehicleError>,
    },
}

impl VehicleError {
    /// Classification of the underlying vehicle fault, if any
    pub fn fault_class(&self) -> Option<FaultClass> {
        match self {
            VehicleError::Fault { class, .. } => Some(*class),
            VehicleError::OutOfRetries { last, .. } => last.fault_class(),
            _ => None,
        }
    }

    /// True when the underlying fault belongs to a retryable class
    ///
    /// An exhausted retry budget still reports the retryable class of its last
    /// failure, letting callers decide whether to try again later.
    pub fn is_retryable_class(&self) -> bool {
        match self {
            VehicleError::Transport(e) => e.needs_token_refresh(),
            VehicleError::OutOfRetries { last, .. } => last.is_retryable_class(),
            other => other.fault_class().is_some_and(|c| c.is_retryable()),
        }
    }

    /// True once the retry budget was exhausted
    pub fn is_out_of_retries(&self) -> bool {
        matches!(self, VehicleError::OutOfRetries { .. })
    }
}

/// Result alias for vehicle operations
pub type Result<T> = std::result::Result<T, VehicleError>;
