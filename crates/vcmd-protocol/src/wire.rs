//! Protobuf wire schema
//!
//! Hand-written prost messages for the subset of the vehicle protocol a
//! command client needs. Field numbers follow the vehicle's definitions; the
//! metadata [`Tag`] values are not protobuf but share the same numbering
//! authority.

use crate::error::ProtocolError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use prost::Message;

/// Vehicle subsystem a message is addressed to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Domain {
    /// Broadcast to every domain
    Broadcast = 0,
    /// Vehicle security controller (locks, immobilizer)
    VehicleSecurity = 2,
    /// Infotainment system (climate, media, horn)
    Infotainment = 3,
}

impl Domain {
    /// Domains that hold an independent command session
    pub const SESSION_DOMAINS: [Domain; 2] = [Domain::VehicleSecurity, Domain::Infotainment];

    /// Single-byte value used in the metadata envelope
    pub fn metadata_byte(self) -> u8 {
        self as i32 as u8
    }
}

/// Coarse outcome reported in a response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OperationStatus {
    /// Accepted
    Ok = 0,
    /// Accepted, result pending
    Wait = 1,
    /// Rejected, see the fault
    Error = 2,
}

/// Why the vehicle rejected a signed message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum MessageFault {
    None = 0,
    Busy = 1,
    Timeout = 2,
    UnknownKeyId = 3,
    InactiveKey = 4,
    InvalidSignature = 5,
    InvalidTokenOrCounter = 6,
    InsufficientPrivileges = 7,
    InvalidDomains = 8,
    InvalidCommand = 9,
    Decoding = 10,
    Internal = 11,
    WrongPersonalization = 12,
    BadParameter = 13,
    KeychainIsFull = 14,
    IncorrectEpoch = 15,
    IvIncorrectLength = 16,
    TimeExpired = 17,
    NotProvisionedWithIdentity = 18,
    CouldNotHashMetadata = 19,
    TimeToLiveTooLong = 20,
    RemoteAccessDisabled = 21,
    RemoteServiceAccessDisabled = 22,
    CommandRequiresAccountCredentials = 23,
    RequestMtuExceeded = 24,
    ResponseMtuExceeded = 25,
}

impl MessageFault {
    /// Human-readable explanation of the fault
    pub fn description(self) -> &'static str {
        match self {
            MessageFault::None => "Request succeeded.",
            MessageFault::Busy => "Required vehicle subsystem is busy. Try again.",
            MessageFault::Timeout => "Vehicle subsystem did not respond. Try again.",
            MessageFault::UnknownKeyId => {
                "Vehicle did not recognize the key used to authorize command. Make sure your key is paired with the vehicle."
            }
            MessageFault::InactiveKey => "Key used to authorize command has been disabled.",
            MessageFault::InvalidSignature => {
                "Command signature/MAC is incorrect. Use included session info to update session and try again."
            }
            MessageFault::InvalidTokenOrCounter => {
                "Command anti-replay counter has been used before. Use included session info to update session and try again."
            }
            MessageFault::InsufficientPrivileges => {
                "User is not authorized to execute command. This can be because of the role or because of vehicle state."
            }
            MessageFault::InvalidDomains => {
                "Command was malformed or addressed to an unrecognized vehicle system. May indicate client error or older vehicle firmware."
            }
            MessageFault::InvalidCommand => {
                "Unrecognized command. May indicate client error or unsupported vehicle firmware."
            }
            MessageFault::Decoding => "Could not parse command. Indicates client error.",
            MessageFault::Internal => {
                "Internal vehicle error. Try again. Most commonly encountered when the vehicle has not finished booting."
            }
            MessageFault::WrongPersonalization => "Command sent to wrong VIN.",
            MessageFault::BadParameter => "Command was malformed or used a deprecated parameter.",
            MessageFault::KeychainIsFull => {
                "Vehicle's keychain is full. You must delete a key before you can add another."
            }
            MessageFault::IncorrectEpoch => {
                "Session ID mismatch. Use included session info to update session and try again."
            }
            MessageFault::IvIncorrectLength => {
                "Initialization Value length is incorrect (AES-GCM must use 12-byte IVs). Indicates a client programming error."
            }
            MessageFault::TimeExpired => {
                "Command expired. Use included session info to determine if clocks have desynchronized and try again."
            }
            MessageFault::NotProvisionedWithIdentity => {
                "Vehicle has not been provisioned with a VIN and may require service."
            }
            MessageFault::CouldNotHashMetadata => "Internal vehicle error.",
            MessageFault::TimeToLiveTooLong => {
                "Vehicle rejected command because its expiration time was too far in the future. This is a security precaution."
            }
            MessageFault::RemoteAccessDisabled => "The vehicle owner has disabled Mobile access.",
            MessageFault::RemoteServiceAccessDisabled => {
                "The command was authorized with a Service key, but the vehicle has not been configured to permit remote service commands."
            }
            MessageFault::CommandRequiresAccountCredentials => {
                "The command requires proof of Tesla account credentials but was not sent over a channel that provides this proof. Resend the command using Fleet API."
            }
            MessageFault::RequestMtuExceeded => "Client sent a request with a field that exceeds MTU",
            MessageFault::ResponseMtuExceeded => {
                "Client's request was received, but response size exceeded MTU"
            }
        }
    }
}

/// How a message is authenticated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SignatureType {
    /// Unpersonalized AES-GCM
    AesGcm = 0,
    /// AES-GCM bound to a VIN
    AesGcmPersonalized = 5,
    /// HMAC over session info
    Hmac = 6,
    /// HMAC over a plaintext command bound to a VIN
    HmacPersonalized = 8,
    /// AES-GCM over a vehicle response
    AesGcmResponse = 9,
}

impl SignatureType {
    /// Single-byte value used in the metadata envelope
    pub fn metadata_byte(self) -> u8 {
        self as i32 as u8
    }
}

/// Metadata envelope tags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Tag {
    /// [`SignatureType`] byte
    SignatureType = 0,
    /// [`Domain`] byte
    Domain = 1,
    /// VIN string
    Personalization = 2,
    /// Session epoch
    Epoch = 3,
    /// Expiration in vehicle-clock seconds, big-endian u32
    ExpiresAt = 4,
    /// Anti-replay counter, big-endian u32
    Counter = 5,
    /// Handshake challenge
    Challenge = 6,
    /// Message flags
    Flags = 7,
    /// Envelope terminator
    End = 255,
}

/// Whether the vehicle recognized our key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SessionInfoStatus {
    /// Key is paired
    Ok = 0,
    /// Key is unknown to the vehicle
    KeyNotOnWhitelist = 1,
}

/// Source or destination of a routable message
#[derive(Clone, PartialEq, Message)]
pub struct Destination {
    /// Domain or routing address
    #[prost(oneof = "destination::SubDestination", tags = "1, 2")]
    pub sub_destination: Option<destination::SubDestination>,
}

/// Nested types for [`Destination`]
pub mod destination {
    /// Either a domain or an opaque routing address
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum SubDestination {
        /// Vehicle domain
        #[prost(enumeration = "super::Domain", tag = "1")]
        Domain(i32),
        /// Client routing address
        #[prost(bytes = "vec", tag = "2")]
        RoutingAddress(Vec<u8>),
    }
}

impl Destination {
    /// Address a vehicle domain
    pub fn domain(domain: Domain) -> Self {
        Self {
            sub_destination: Some(destination::SubDestination::Domain(domain.into())),
        }
    }

    /// Address a client routing address
    pub fn routing_address(address: Vec<u8>) -> Self {
        Self {
            sub_destination: Some(destination::SubDestination::RoutingAddress(address)),
        }
    }

    /// The domain, if this destination names one
    pub fn as_domain(&self) -> Option<Domain> {
        match &self.sub_destination {
            Some(destination::SubDestination::Domain(d)) => Domain::try_from(*d).ok(),
            _ => None,
        }
    }

    /// The routing address, if this destination carries one
    pub fn as_routing_address(&self) -> Option<&[u8]> {
        match &self.sub_destination {
            Some(destination::SubDestination::RoutingAddress(a)) => Some(a),
            _ => None,
        }
    }
}

/// Status attached to a vehicle response
#[derive(Clone, PartialEq, Message)]
pub struct MessageStatus {
    /// Coarse outcome
    #[prost(enumeration = "OperationStatus", tag = "1")]
    pub operation_status: i32,
    /// Raw [`MessageFault`] code; may be outside the known range
    #[prost(enumeration = "MessageFault", tag = "2")]
    pub signed_message_fault: i32,
}

/// Handshake request payload
#[derive(Clone, PartialEq, Message)]
pub struct SessionInfoRequest {
    /// Client public key, uncompressed SEC1
    #[prost(bytes = "vec", tag = "1")]
    pub public_key: Vec<u8>,
    /// 16-byte challenge
    #[prost(bytes = "vec", tag = "2")]
    pub challenge: Vec<u8>,
}

/// Identifies the signer of a message
#[derive(Clone, PartialEq, Message)]
pub struct KeyIdentity {
    /// Public key or key handle
    #[prost(oneof = "key_identity::IdentityType", tags = "1, 3")]
    pub identity_type: Option<key_identity::IdentityType>,
}

/// Nested types for [`KeyIdentity`]
pub mod key_identity {
    /// How the signer is identified
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum IdentityType {
        /// Uncompressed SEC1 public key
        #[prost(bytes = "vec", tag = "1")]
        PublicKey(Vec<u8>),
        /// Vehicle-assigned key handle
        #[prost(uint32, tag = "3")]
        Handle(u32),
    }
}

/// Signature data for an AES-GCM encrypted command
#[derive(Clone, PartialEq, Message)]
pub struct AesGcmPersonalizedSignatureData {
    /// Session epoch
    #[prost(bytes = "vec", tag = "1")]
    pub epoch: Vec<u8>,
    /// 12-byte nonce
    #[prost(bytes = "vec", tag = "2")]
    pub nonce: Vec<u8>,
    /// Anti-replay counter
    #[prost(uint32, tag = "3")]
    pub counter: u32,
    /// Expiration in vehicle-clock seconds
    #[prost(fixed32, tag = "4")]
    pub expires_at: u32,
    /// 16-byte GCM tag
    #[prost(bytes = "vec", tag = "5")]
    pub tag: Vec<u8>,
}

/// Signature data for session info
#[derive(Clone, PartialEq, Message)]
pub struct HmacSignatureData {
    /// 32-byte HMAC-SHA256 tag
    #[prost(bytes = "vec", tag = "1")]
    pub tag: Vec<u8>,
}

/// Signature data for an HMAC-authenticated plaintext command
#[derive(Clone, PartialEq, Message)]
pub struct HmacPersonalizedSignatureData {
    /// Session epoch
    #[prost(bytes = "vec", tag = "1")]
    pub epoch: Vec<u8>,
    /// Anti-replay counter
    #[prost(uint32, tag = "2")]
    pub counter: u32,
    /// Expiration in vehicle-clock seconds
    #[prost(fixed32, tag = "3")]
    pub expires_at: u32,
    /// 32-byte HMAC-SHA256 tag
    #[prost(bytes = "vec", tag = "4")]
    pub tag: Vec<u8>,
}

/// Signature data on an encrypted vehicle response
#[derive(Clone, PartialEq, Message)]
pub struct AesGcmResponseSignatureData {
    /// 12-byte nonce
    #[prost(bytes = "vec", tag = "1")]
    pub nonce: Vec<u8>,
    /// Counter of the request being answered
    #[prost(uint32, tag = "2")]
    pub counter: u32,
    /// 16-byte GCM tag
    #[prost(bytes = "vec", tag = "3")]
    pub tag: Vec<u8>,
}

/// Signer identity plus the type-specific authentication data
#[derive(Clone, PartialEq, Message)]
pub struct SignatureData {
    /// Who signed
    #[prost(message, optional, tag = "1")]
    pub signer_identity: Option<KeyIdentity>,
    /// Authentication data
    #[prost(oneof = "signature_data::SigType", tags = "5, 6, 8, 9")]
    pub sig_type: Option<signature_data::SigType>,
}

/// Nested types for [`SignatureData`]
pub mod signature_data {
    /// Authentication data by signature type
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum SigType {
        /// Encrypted command
        #[prost(message, tag = "5")]
        AesGcmPersonalizedData(super::AesGcmPersonalizedSignatureData),
        /// Session info tag
        #[prost(message, tag = "6")]
        SessionInfoTag(super::HmacSignatureData),
        /// HMAC-authenticated command
        #[prost(message, tag = "8")]
        HmacPersonalizedData(super::HmacPersonalizedSignatureData),
        /// Encrypted response
        #[prost(message, tag = "9")]
        AesGcmResponseData(super::AesGcmResponseSignatureData),
    }
}

impl SignatureData {
    /// The session info tag bytes, if present and non-empty
    pub fn session_info_tag(&self) -> Option<&[u8]> {
        match &self.sig_type {
            Some(signature_data::SigType::SessionInfoTag(data)) if !data.tag.is_empty() => {
                Some(&data.tag)
            }
            _ => None,
        }
    }
}

/// Session parameters advertised by the vehicle
#[derive(Clone, PartialEq, Message)]
pub struct SessionInfo {
    /// Last counter the vehicle accepted
    #[prost(uint32, tag = "1")]
    pub counter: u32,
    /// Vehicle public key, uncompressed SEC1
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: Vec<u8>,
    /// 16-byte session epoch
    #[prost(bytes = "vec", tag = "3")]
    pub epoch: Vec<u8>,
    /// Vehicle clock in seconds since the epoch started
    #[prost(fixed32, tag = "4")]
    pub clock_time: u32,
    /// Whether our key is paired
    #[prost(enumeration = "SessionInfoStatus", tag = "5")]
    pub status: i32,
    /// Vehicle-assigned key handle
    #[prost(uint32, tag = "6")]
    pub handle: u32,
}

/// The outer envelope exchanged with the relay
#[derive(Clone, PartialEq, Message)]
pub struct RoutableMessage {
    /// Where the message is going
    #[prost(message, optional, tag = "6")]
    pub to_destination: Option<Destination>,
    /// Where replies should go
    #[prost(message, optional, tag = "7")]
    pub from_destination: Option<Destination>,
    /// Command bytes, handshake request or session info
    #[prost(oneof = "routable_message::Payload", tags = "10, 14, 15")]
    pub payload: Option<routable_message::Payload>,
    /// Vehicle status on responses
    #[prost(message, optional, tag = "12")]
    pub signed_message_status: Option<MessageStatus>,
    /// Authentication data
    #[prost(message, optional, tag = "13")]
    pub signature_data: Option<SignatureData>,
    /// On responses, the uuid of the request being answered
    #[prost(bytes = "vec", tag = "50")]
    pub request_uuid: Vec<u8>,
    /// Correlation identifier
    #[prost(bytes = "vec", tag = "51")]
    pub uuid: Vec<u8>,
    /// Request flags
    #[prost(uint32, tag = "52")]
    pub flags: u32,
}

/// Nested types for [`RoutableMessage`]
pub mod routable_message {
    /// Message body
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// Authenticated command bytes (plaintext or ciphertext)
        #[prost(bytes = "vec", tag = "10")]
        ProtobufMessageAsBytes(Vec<u8>),
        /// Handshake request
        #[prost(message, tag = "14")]
        SessionInfoRequest(super::SessionInfoRequest),
        /// Serialized [`super::SessionInfo`]
        #[prost(bytes = "vec", tag = "15")]
        SessionInfo(Vec<u8>),
    }
}

impl RoutableMessage {
    /// Encode to protobuf bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    /// Decode from protobuf bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Self::decode(bytes).map_err(|e| ProtocolError::decode("RoutableMessage", e))
    }

    /// Encode to padded standard base64
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Decode from padded standard base64
    pub fn from_base64(text: &str) -> Result<Self, ProtocolError> {
        let bytes = STANDARD.decode(text.trim()).map_err(|e| ProtocolError::Base64 {
            message: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Raw session info bytes carried in the payload, if any
    pub fn session_info_bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(routable_message::Payload::SessionInfo(bytes)) if !bytes.is_empty() => {
                Some(bytes)
            }
            _ => None,
        }
    }

    /// Raw fault code, 0 when the response carries no status
    pub fn fault_code(&self) -> i32 {
        self.signed_message_status
            .as_ref()
            .map_or(0, |s| s.signed_message_fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip_keeps_oneofs() {
        let message = RoutableMessage {
            to_destination: Some(Destination::domain(Domain::Infotainment)),
            from_destination: Some(Destination::routing_address(vec![7; 16])),
            payload: Some(routable_message::Payload::SessionInfoRequest(
                SessionInfoRequest {
                    public_key: vec![4; 65],
                    challenge: vec![9; 16],
                },
            )),
            uuid: vec![9; 16],
            ..Default::default()
        };

        let decoded = RoutableMessage::from_base64(&message.to_base64()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(
            decoded.to_destination.and_then(|d| d.as_domain()),
            Some(Domain::Infotainment)
        );
        assert_eq!(
            decoded.from_destination.as_ref().and_then(|d| d.as_routing_address()),
            Some(&[7u8; 16][..])
        );
    }

    #[test]
    fn test_fixed32_fields_encode_little_endian() {
        let info = SessionInfo {
            clock_time: 0x0102_0304,
            ..Default::default()
        };
        // field 4, wire type 5 (fixed32)
        assert_eq!(info.encode_to_vec(), vec![0x25, 0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_unknown_fault_code_survives_decoding() {
        let message = RoutableMessage {
            signed_message_status: Some(MessageStatus {
                operation_status: OperationStatus::Error.into(),
                signed_message_fault: 42,
            }),
            ..Default::default()
        };
        let decoded = RoutableMessage::from_bytes(&message.to_bytes()).unwrap();
        assert_eq!(decoded.fault_code(), 42);
    }

    #[test]
    fn test_invalid_input_rejected() {
        assert!(matches!(
            RoutableMessage::from_base64("not base64!"),
            Err(ProtocolError::Base64 { .. })
        ));
        assert!(matches!(
            RoutableMessage::from_bytes(&[0xff, 0xff, 0xff]),
            Err(ProtocolError::Decode { .. })
        ));
    }

    #[test]
    fn test_fault_descriptions() {
        assert_eq!(
            MessageFault::Busy.description(),
            "Required vehicle subsystem is busy. Try again."
        );
        assert_eq!(MessageFault::try_from(17).ok(), Some(MessageFault::TimeExpired));
        assert!(MessageFault::try_from(26).is_err());
    }
}
