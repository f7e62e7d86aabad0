//! # vcmd-protocol
//!
//! The vehicle command protocol, independent of any transport:
//!
//! - [`wire`]: protobuf envelope and enums
//! - [`metadata`]: the TLV envelope folded into every tag
//! - [`session`]: per-domain session state and its store
//! - [`handshake`]: session establishment and session info validation
//! - [`command`]: HMAC and AES-GCM command framing
//! - [`fault`] and [`retry`]: classification of outcomes and the retry loop
//!
//! Randomness enters only through [`RandomSource`], so every frame can be
//! reproduced byte for byte in tests.

#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod fault;
pub mod handshake;
pub mod metadata;
pub mod random;
pub mod retry;
pub mod session;
pub mod wire;

pub use command::{command_metadata, CommandContext, CommandFrame};
pub use error::{BoxError, HandshakeError, ProtocolError, Result, TransportError, VehicleError};
pub use fault::{classify, describe_fault, Classification, FaultClass, RetryReason};
pub use handshake::{
    session_info_metadata, session_info_tag, verify_session_info, HandshakeRequest,
    HandshakeResponse, CHALLENGE_LEN,
};
pub use metadata::Metadata;
pub use random::{OsRandom, RandomSource};
pub use retry::{RetryEngine, RetryPolicy, RetryableOperation};
pub use session::{DomainSlot, SessionPhase, SessionState, SessionStore, EPOCH_LEN};
pub use wire::{Domain, MessageFault, RoutableMessage, SignatureType};
