//! Session handshake
//!
//! The client sends its public key and a fresh challenge to a domain. The
//! vehicle answers with session info and an HMAC over it, keyed from the
//! shared secret and bound to our VIN and challenge. Only a response whose tag
//! verifies yields a [`SessionState`].

use crate::error::{HandshakeError, ProtocolError};
use crate::metadata::Metadata;
use crate::session::SessionState;
use crate::wire::{
    routable_message, Destination, Domain, RoutableMessage, SessionInfoRequest, SignatureType, Tag,
};
use vcmd_crypto::{compute_tag, derive_key, tags_equal, ClientKeyPair, KeyPurpose, SharedKey, TAG_LEN};

/// Length of a handshake challenge
pub const CHALLENGE_LEN: usize = 16;

/// A handshake request bound to its challenge
///
/// The challenge is chosen before any retries and reused by all of them, so
/// whichever attempt the vehicle answers validates against the same value.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeRequest {
    message: RoutableMessage,
    challenge: [u8; CHALLENGE_LEN],
}

impl HandshakeRequest {
    /// Build the request for `domain`
    pub fn new(
        domain: Domain,
        keys: &ClientKeyPair,
        challenge: [u8; CHALLENGE_LEN],
        routing_address: [u8; 16],
    ) -> Self {
        let message = RoutableMessage {
            to_destination: Some(Destination::domain(domain)),
            from_destination: Some(Destination::routing_address(routing_address.to_vec())),
            payload: Some(routable_message::Payload::SessionInfoRequest(
                SessionInfoRequest {
                    public_key: keys.public_key_bytes().to_vec(),
                    challenge: challenge.to_vec(),
                },
            )),
            uuid: challenge.to_vec(),
            ..Default::default()
        };
        Self { message, challenge }
    }

    /// The challenge the response must be bound to
    pub fn challenge(&self) -> &[u8; CHALLENGE_LEN] {
        &self.challenge
    }

    /// The wire message to send
    pub fn message(&self) -> &RoutableMessage {
        &self.message
    }
}

/// The parts of a handshake response needed to establish a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    routing_address: Vec<u8>,
    session_info: Vec<u8>,
    session_info_tag: Vec<u8>,
}

impl HandshakeResponse {
    /// Extract the required fields, failing if any is absent
    pub fn parse(message: &RoutableMessage) -> Result<Self, HandshakeError> {
        let routing_address = message
            .to_destination
            .as_ref()
            .and_then(|d| d.as_routing_address())
            .filter(|a| !a.is_empty())
            .ok_or(HandshakeError::MissingRoutingAddress)?;

        let session_info = message
            .session_info_bytes()
            .ok_or(HandshakeError::MissingSessionInfo)?;

        let session_info_tag = message
            .signature_data
            .as_ref()
            .and_then(|s| s.session_info_tag())
            .ok_or(HandshakeError::MissingSessionInfoTag)?;

        Ok(Self {
            routing_address: routing_address.to_vec(),
            session_info: session_info.to_vec(),
            session_info_tag: session_info_tag.to_vec(),
        })
    }

    /// Routing address the vehicle echoed back
    pub fn routing_address(&self) -> &[u8] {
        &self.routing_address
    }

    /// Raw session info bytes
    pub fn session_info_bytes(&self) -> &[u8] {
        &self.session_info
    }

    /// Tag over the session info
    pub fn session_info_tag(&self) -> &[u8] {
        &self.session_info_tag
    }

    /// Derive the session and verify its tag against our challenge
    pub fn establish(
        &self,
        vin: &str,
        challenge: &[u8],
        keys: &ClientKeyPair,
    ) -> Result<SessionState, HandshakeError> {
        let state = SessionState::from_session_info(&self.session_info, keys)?;
        verify_session_info(
            vin,
            challenge,
            &self.session_info,
            &self.session_info_tag,
            state.shared_key(),
        )?;
        Ok(state)
    }
}

/// Metadata bound into a session info tag
pub fn session_info_metadata(vin: &str, challenge: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut metadata = Metadata::new();
    metadata
        .add_u8(Tag::SignatureType, SignatureType::Hmac.metadata_byte())?
        .add_str(Tag::Personalization, vin)?
        .add_bytes(Tag::Challenge, challenge)?;
    Ok(metadata.to_bytes())
}

/// Tag the vehicle computes over session info
pub fn session_info_tag(
    vin: &str,
    challenge: &[u8],
    session_info: &[u8],
    shared_key: &SharedKey,
) -> Result<[u8; TAG_LEN], ProtocolError> {
    let metadata = session_info_metadata(vin, challenge)?;
    let key = derive_key(shared_key, KeyPurpose::SessionInfo);
    Ok(compute_tag(&metadata, session_info, &key))
}

/// Check a session info tag in constant time
pub fn verify_session_info(
    vin: &str,
    challenge: &[u8],
    session_info: &[u8],
    tag: &[u8],
    shared_key: &SharedKey,
) -> Result<(), HandshakeError> {
    let expected = session_info_tag(vin, challenge, session_info, shared_key)?;
    if tags_equal(&expected, tag) {
        Ok(())
    } else {
        Err(HandshakeError::InvalidSessionInfoTag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{signature_data, HmacSignatureData, SessionInfo, SignatureData};
    use prost::Message;
    use vcmd_crypto::{derive_shared_secret, PeerPublicKey};

    const VIN: &str = "5YJ3E1EA7KF000001";

    struct Fixture {
        client: ClientKeyPair,
        vehicle: ClientKeyPair,
        challenge: [u8; 16],
    }

    fn fixture() -> Fixture {
        Fixture {
            client: ClientKeyPair::from_secret_bytes(&[0x11; 32]).unwrap(),
            vehicle: ClientKeyPair::from_secret_bytes(&[0x22; 32]).unwrap(),
            challenge: [0x5a; 16],
        }
    }

    fn response(f: &Fixture, vin: &str, challenge: &[u8]) -> RoutableMessage {
        let info = SessionInfo {
            counter: 3,
            public_key: f.vehicle.public_key_bytes().to_vec(),
            epoch: vec![0x42; 16],
            clock_time: 100,
            ..Default::default()
        }
        .encode_to_vec();

        let client_public = PeerPublicKey::from_sec1_bytes(f.client.public_key_bytes()).unwrap();
        let shared = derive_shared_secret(&f.vehicle, &client_public).unwrap();
        let tag = session_info_tag(vin, challenge, &info, &shared).unwrap();

        RoutableMessage {
            to_destination: Some(Destination::routing_address(vec![1; 16])),
            from_destination: Some(Destination::domain(Domain::VehicleSecurity)),
            payload: Some(routable_message::Payload::SessionInfo(info)),
            signature_data: Some(SignatureData {
                signer_identity: None,
                sig_type: Some(signature_data::SigType::SessionInfoTag(HmacSignatureData {
                    tag: tag.to_vec(),
                })),
            }),
            request_uuid: challenge.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_carries_key_and_challenge() {
        let f = fixture();
        let request = HandshakeRequest::new(Domain::VehicleSecurity, &f.client, f.challenge, [7; 16]);
        let message = request.message();

        assert_eq!(message.uuid, f.challenge.to_vec());
        assert_eq!(
            message.to_destination.as_ref().and_then(|d| d.as_domain()),
            Some(Domain::VehicleSecurity)
        );
        match &message.payload {
            Some(routable_message::Payload::SessionInfoRequest(req)) => {
                assert_eq!(req.public_key, f.client.public_key_bytes());
                assert_eq!(req.challenge, f.challenge.to_vec());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_valid_response_establishes_session() {
        let f = fixture();
        let message = response(&f, VIN, &f.challenge);

        let parsed = HandshakeResponse::parse(&message).unwrap();
        let state = parsed.establish(VIN, &f.challenge, &f.client).unwrap();
        assert_eq!(state.counter(), 3);
        assert_eq!(state.epoch(), &[0x42; 16]);
    }

    #[test]
    fn test_tag_bound_to_vin_and_challenge() {
        let f = fixture();

        let other_vin = response(&f, "5YJ3E1EA7KF000002", &f.challenge);
        let parsed = HandshakeResponse::parse(&other_vin).unwrap();
        assert_eq!(
            parsed.establish(VIN, &f.challenge, &f.client).unwrap_err(),
            HandshakeError::InvalidSessionInfoTag
        );

        let other_challenge = response(&f, VIN, &[0x5b; 16]);
        let parsed = HandshakeResponse::parse(&other_challenge).unwrap();
        assert_eq!(
            parsed.establish(VIN, &f.challenge, &f.client).unwrap_err(),
            HandshakeError::InvalidSessionInfoTag
        );
    }

    #[test]
    fn test_missing_fields_rejected() {
        let f = fixture();

        let mut message = response(&f, VIN, &f.challenge);
        message.to_destination = Some(Destination::domain(Domain::VehicleSecurity));
        assert_eq!(
            HandshakeResponse::parse(&message).unwrap_err(),
            HandshakeError::MissingRoutingAddress
        );

        let mut message = response(&f, VIN, &f.challenge);
        message.payload = None;
        assert_eq!(
            HandshakeResponse::parse(&message).unwrap_err(),
            HandshakeError::MissingSessionInfo
        );

        let mut message = response(&f, VIN, &f.challenge);
        message.signature_data = None;
        assert_eq!(
            HandshakeResponse::parse(&message).unwrap_err(),
            HandshakeError::MissingSessionInfoTag
        );
    }

    #[test]
    fn test_session_info_metadata_layout() {
        let metadata = session_info_metadata("VIN", &[0xab; 2]).unwrap();
        assert_eq!(
            metadata,
            vec![0, 1, 6, 2, 3, b'V', b'I', b'N', 6, 2, 0xab, 0xab, 0xff]
        );
    }
}
