//! Fault classification
//!
//! Turns the outcome of one round trip into an explicit [`Classification`]
//! that the retry engine consumes: success, a retry with its reason, or a
//! terminal error.

use crate::error::{TransportError, VehicleError};
use crate::wire::{MessageFault, RoutableMessage};
use std::fmt;

/// Coarse fault classes that decide retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultClass {
    /// No fault
    None,
    /// Transient vehicle condition; resend as-is
    Retry,
    /// Session keys, counter or clock disagree; resynchronize then resend
    SessionOutOfSync,
    /// The command was malformed; indicates a client bug
    InternalError,
    /// Our key is unknown, inactive or not allowed
    KeyPairingIssue,
    /// The key's role cannot perform this command
    InsufficientPrivileges,
    /// Command personalized to another VIN
    IncorrectVin,
    /// Expiration too far in the future
    TtlTooLong,
    /// Vehicle has no VIN provisioned
    VehicleMissingVin,
    /// Code outside the known set
    UnknownError,
}

impl FaultClass {
    /// Class of a known fault
    pub fn of(fault: MessageFault) -> Self {
        use MessageFault as F;
        match fault {
            F::None => FaultClass::None,
            F::Busy | F::Timeout | F::Internal | F::CouldNotHashMetadata => FaultClass::Retry,
            F::InvalidSignature | F::InvalidTokenOrCounter | F::IncorrectEpoch | F::TimeExpired => {
                FaultClass::SessionOutOfSync
            }
            F::InvalidDomains
            | F::InvalidCommand
            | F::Decoding
            | F::BadParameter
            | F::IvIncorrectLength
            | F::CommandRequiresAccountCredentials
            | F::RequestMtuExceeded
            | F::ResponseMtuExceeded => FaultClass::InternalError,
            F::UnknownKeyId
            | F::InactiveKey
            | F::KeychainIsFull
            | F::RemoteAccessDisabled
            | F::RemoteServiceAccessDisabled => FaultClass::KeyPairingIssue,
            F::InsufficientPrivileges => FaultClass::InsufficientPrivileges,
            F::WrongPersonalization => FaultClass::IncorrectVin,
            F::TimeToLiveTooLong => FaultClass::TtlTooLong,
            F::NotProvisionedWithIdentity => FaultClass::VehicleMissingVin,
        }
    }

    /// Class of a raw code as it arrived on the wire
    pub fn from_code(code: i32) -> Self {
        MessageFault::try_from(code).map_or(FaultClass::UnknownError, FaultClass::of)
    }

    /// Whether faults of this class are worth another attempt
    pub fn is_retryable(self) -> bool {
        matches!(self, FaultClass::Retry | FaultClass::SessionOutOfSync)
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultClass::None => "none",
            FaultClass::Retry => "retry",
            FaultClass::SessionOutOfSync => "session out of sync",
            FaultClass::InternalError => "internal error",
            FaultClass::KeyPairingIssue => "key pairing issue",
            FaultClass::InsufficientPrivileges => "insufficient privileges",
            FaultClass::IncorrectVin => "incorrect VIN",
            FaultClass::TtlTooLong => "TTL too long",
            FaultClass::VehicleMissingVin => "vehicle missing VIN",
            FaultClass::UnknownError => "unknown error",
        };
        f.write_str(name)
    }
}

/// Description of a raw fault code, including unknown ones
pub fn describe_fault(code: i32) -> String {
    match MessageFault::try_from(code) {
        Ok(fault) => fault.description().to_string(),
        Err(_) => format!("Unrecognized message fault {code}."),
    }
}

/// Why a round trip should be attempted again
#[derive(Debug, Clone, PartialEq)]
pub enum RetryReason {
    /// The relay rejected the access token; refresh it first
    AccessTokenExpired(TransportError),
    /// The vehicle reported a transient condition
    Transient(MessageFault),
    /// The vehicle rejected our session parameters
    SessionOutOfSync {
        /// The specific fault
        fault: MessageFault,
        /// The full response, which may carry fresh session info
        response: Box<RoutableMessage>,
    },
}

impl RetryReason {
    /// The error to report if no retries remain
    pub fn into_error(self) -> VehicleError {
        match self {
            RetryReason::AccessTokenExpired(err) => VehicleError::Transport(err),
            RetryReason::Transient(fault) => VehicleError::Fault {
                class: FaultClass::Retry,
                fault: fault.into(),
            },
            RetryReason::SessionOutOfSync { fault, .. } => VehicleError::Fault {
                class: FaultClass::SessionOutOfSync,
                fault: fault.into(),
            },
        }
    }
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::AccessTokenExpired(err) => write!(f, "access token expired ({err})"),
            RetryReason::Transient(fault) => write!(f, "transient fault {fault:?}"),
            RetryReason::SessionOutOfSync { fault, .. } => {
                write!(f, "session out of sync ({fault:?})")
            }
        }
    }
}

/// Outcome of one round trip
#[derive(Debug)]
pub enum Classification {
    /// Delivered with no fault
    Success(RoutableMessage),
    /// Worth another attempt
    Retry(RetryReason),
    /// Terminal
    Fatal(VehicleError),
}

/// Classify the result of sending one message
///
/// Transport failures retry only when the access token needs refreshing.
/// Responses retry for transient and session faults and are terminal for every
/// other non-zero fault, including codes this client does not know.
pub fn classify(result: Result<RoutableMessage, TransportError>) -> Classification {
    let response = match result {
        Ok(response) => response,
        Err(err) if err.needs_token_refresh() => {
            return Classification::Retry(RetryReason::AccessTokenExpired(err))
        }
        Err(err) => return Classification::Fatal(VehicleError::Transport(err)),
    };

    let code = response.fault_code();
    let Ok(fault) = MessageFault::try_from(code) else {
        return Classification::Fatal(VehicleError::Fault {
            class: FaultClass::UnknownError,
            fault: code,
        });
    };

    match FaultClass::of(fault) {
        FaultClass::None => Classification::Success(response),
        FaultClass::Retry => Classification::Retry(RetryReason::Transient(fault)),
        FaultClass::SessionOutOfSync => Classification::Retry(RetryReason::SessionOutOfSync {
            fault,
            response: Box::new(response),
        }),
        class => Classification::Fatal(VehicleError::Fault { class, fault: code }),
    }
}
