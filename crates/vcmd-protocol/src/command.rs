//! Command framing
//!
//! Wraps an opaque command payload for one domain. Both modes authenticate the
//! same metadata envelope; HMAC mode sends the payload in the clear with a
//! tag, AES-GCM mode sends only ciphertext.

use crate::error::ProtocolError;
use crate::metadata::Metadata;
use crate::random::RandomSource;
use crate::session::SessionState;
use crate::wire::{
    key_identity, routable_message, signature_data, AesGcmPersonalizedSignatureData, Destination,
    Domain, HmacPersonalizedSignatureData, KeyIdentity, RoutableMessage, SignatureData,
    SignatureType, Tag,
};
use tracing::debug;
use vcmd_crypto::{compute_tag, derive_key, encrypt_aead, KeyPurpose, NONCE_LEN};

/// Per-command inputs that do not live in the session
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    /// VIN the command is personalized to
    pub vin: &'a str,
    /// Destination domain
    pub domain: Domain,
    /// HMAC or AES-GCM
    pub signature_type: SignatureType,
    /// Lifetime in vehicle-clock seconds
    pub expiration_secs: u32,
    /// Our public key, sent as the signer identity
    pub client_public_key: &'a [u8],
}

/// A framed, authenticated command ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    message: RoutableMessage,
    metadata: Vec<u8>,
    counter: u32,
    expires_at: u32,
    uuid: [u8; 16],
    nonce: Option<[u8; NONCE_LEN]>,
}

impl CommandFrame {
    /// Frame `payload` under `session`
    ///
    /// Advances the session counter before anything else is computed, so a
    /// frame is never built twice with the same counter. Random draws happen
    /// in a fixed order: routing address, uuid, then the nonce in AES-GCM
    /// mode.
    pub fn build(
        payload: &[u8],
        session: &mut SessionState,
        ctx: &CommandContext<'_>,
        random: &dyn RandomSource,
    ) -> Result<Self, ProtocolError> {
        if !matches!(
            ctx.signature_type,
            SignatureType::HmacPersonalized | SignatureType::AesGcmPersonalized
        ) {
            return Err(ProtocolError::UnsupportedSignatureType {
                signature_type: ctx.signature_type.into(),
            });
        }

        let counter = session.next_counter()?;
        let expires_at = session.expires_at(ctx.expiration_secs);
        let metadata = command_metadata(
            ctx.signature_type,
            ctx.domain,
            ctx.vin,
            session.epoch(),
            expires_at,
            counter,
        )?;

        let routing_address = random.random_16();
        let uuid = random.random_16();

        let (body, sig_type, nonce) = if ctx.signature_type == SignatureType::AesGcmPersonalized {
            let mut nonce = [0u8; NONCE_LEN];
            random.fill_bytes(&mut nonce);
            let (ciphertext, tag) = encrypt_aead(payload, &metadata, session.shared_key(), &nonce)?;
            let data = AesGcmPersonalizedSignatureData {
                epoch: session.epoch().to_vec(),
                nonce: nonce.to_vec(),
                counter,
                expires_at,
                tag: tag.to_vec(),
            };
            (
                ciphertext,
                signature_data::SigType::AesGcmPersonalizedData(data),
                Some(nonce),
            )
        } else {
            let key = derive_key(session.shared_key(), KeyPurpose::AuthenticatedCommand);
            let data = HmacPersonalizedSignatureData {
                epoch: session.epoch().to_vec(),
                counter,
                expires_at,
                tag: compute_tag(&metadata, payload, &key).to_vec(),
            };
            (
                payload.to_vec(),
                signature_data::SigType::HmacPersonalizedData(data),
                None,
            )
        };

        let message = RoutableMessage {
            to_destination: Some(Destination::domain(ctx.domain)),
            from_destination: Some(Destination::routing_address(routing_address.to_vec())),
            payload: Some(routable_message::Payload::ProtobufMessageAsBytes(body)),
            signature_data: Some(SignatureData {
                signer_identity: Some(KeyIdentity {
                    identity_type: Some(key_identity::IdentityType::PublicKey(
                        ctx.client_public_key.to_vec(),
                    )),
                }),
                sig_type: Some(sig_type),
            }),
            uuid: uuid.to_vec(),
            flags: 0,
            ..Default::default()
        };

        debug!(
            vin = ctx.vin,
            domain = ?ctx.domain,
            signature_type = ?ctx.signature_type,
            counter,
            expires_at,
            "Framed vehicle command"
        );

        Ok(Self {
            message,
            metadata,
            counter,
            expires_at,
            uuid,
            nonce,
        })
    }

    /// The wire message
    pub fn message(&self) -> &RoutableMessage {
        &self.message
    }

    /// Metadata envelope that was authenticated
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    /// Counter this frame consumed
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Absolute expiration in vehicle-clock seconds
    pub fn expires_at(&self) -> u32 {
        self.expires_at
    }

    /// Correlation id; faults echo it back as `request_uuid`
    pub fn uuid(&self) -> &[u8; 16] {
        &self.uuid
    }

    /// AES-GCM nonce, absent in HMAC mode
    pub fn nonce(&self) -> Option<&[u8; NONCE_LEN]> {
        self.nonce.as_ref()
    }

    /// Protobuf encoding of the wire message
    pub fn to_bytes(&self) -> Vec<u8> {
        self.message.to_bytes()
    }

    /// Base64 encoding of the wire message
    pub fn to_base64(&self) -> String {
        self.message.to_base64()
    }
}

/// Metadata envelope authenticated by a command
///
/// The vehicle rebuilds the same envelope from the signature data to check a
/// command, so the layout here is fixed.
pub fn command_metadata(
    signature_type: SignatureType,
    domain: Domain,
    vin: &str,
    epoch: &[u8],
    expires_at: u32,
    counter: u32,
) -> Result<Vec<u8>, ProtocolError> {
    let mut metadata = Metadata::new();
    metadata
        .add_u8(Tag::SignatureType, signature_type.metadata_byte())?
        .add_u8(Tag::Domain, domain.metadata_byte())?
        .add_str(Tag::Personalization, vin)?
        .add_bytes(Tag::Epoch, epoch)?
        .add_u32(Tag::ExpiresAt, expires_at)?
        .add_u32(Tag::Counter, counter)?;
    Ok(metadata.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{SessionInfo, SessionInfoStatus};
    use prost::Message;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use vcmd_crypto::{decrypt_aead, ClientKeyPair};

    const VIN: &str = "5YJ3E1EA7KF000001";
    const EPOCH: &str = "4c463f9cc0d3d26906e982ed224adde6";

    /// Hands out queued chunks, one per fill
    struct Scripted(Mutex<VecDeque<Vec<u8>>>);

    impl Scripted {
        fn new(chunks: Vec<Vec<u8>>) -> Self {
            Self(Mutex::new(chunks.into()))
        }
    }

    impl RandomSource for Scripted {
        fn fill_bytes(&self, dest: &mut [u8]) {
            let chunk = self.0.lock().unwrap().pop_front().unwrap();
            dest.copy_from_slice(&chunk);
        }
    }

    fn client() -> ClientKeyPair {
        ClientKeyPair::from_secret_bytes(&[0x11; 32]).unwrap()
    }

    fn session(counter: u32) -> SessionState {
        let vehicle = ClientKeyPair::from_secret_bytes(&[0x22; 32]).unwrap();
        let info = SessionInfo {
            counter,
            public_key: vehicle.public_key_bytes().to_vec(),
            epoch: hex::decode(EPOCH).unwrap(),
            clock_time: 2650,
            status: SessionInfoStatus::Ok.into(),
            handle: 0,
        }
        .encode_to_vec();
        SessionState::from_session_info(&info, &client()).unwrap()
    }

    fn random() -> Scripted {
        Scripted::new(vec![vec![0xa0; 16], vec![0xb0; 16], (0u8..12).collect()])
    }

    fn signature(frame: &CommandFrame) -> &signature_data::SigType {
        frame
            .message()
            .signature_data
            .as_ref()
            .and_then(|s| s.sig_type.as_ref())
            .unwrap()
    }

    fn body(frame: &CommandFrame) -> &[u8] {
        match &frame.message().payload {
            Some(routable_message::Payload::ProtobufMessageAsBytes(bytes)) => bytes,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_aead_golden_frame() {
        let keys = client();
        let mut state = session(0);
        let ctx = CommandContext {
            vin: VIN,
            domain: Domain::Infotainment,
            signature_type: SignatureType::AesGcmPersonalized,
            expiration_secs: 5,
            client_public_key: keys.public_key_bytes(),
        };
        let payload = hex::decode("120452020801").unwrap();

        let frame = CommandFrame::build(&payload, &mut state, &ctx, &random()).unwrap();

        assert_eq!(
            hex::encode(frame.metadata()),
            "000105010103021135594a3345314541374b4630303030303103104c463f9cc0d3d26906e982ed224adde6040400000a5f050400000001ff"
        );
        assert_eq!(frame.counter(), 1);
        assert_eq!(frame.expires_at(), 2655);
        assert_eq!(state.counter(), 1);
        assert_eq!(frame.uuid(), &[0xb0; 16]);
        assert_eq!(hex::encode(body(&frame)), "2f4c55252c40");

        match signature(&frame) {
            signature_data::SigType::AesGcmPersonalizedData(data) => {
                assert_eq!(hex::encode(&data.tag), "69acba364338ba33b6c31f462d6cc0cc");
                assert_eq!(hex::encode(&data.nonce), "000102030405060708090a0b");
                assert_eq!(hex::encode(&data.epoch), EPOCH);
                assert_eq!(data.counter, 1);
                assert_eq!(data.expires_at, 2655);
            }
            other => panic!("unexpected signature {other:?}"),
        }

        let plain = decrypt_aead(
            body(&frame),
            &hex::decode("69acba364338ba33b6c31f462d6cc0cc").unwrap(),
            frame.metadata(),
            state.shared_key(),
            frame.nonce().unwrap(),
        )
        .unwrap();
        assert_eq!(plain, payload);
    }

    #[test]
    fn test_hmac_golden_frame() {
        let keys = client();
        let mut state = session(0);
        let ctx = CommandContext {
            vin: VIN,
            domain: Domain::Infotainment,
            signature_type: SignatureType::HmacPersonalized,
            expiration_secs: 5,
            client_public_key: keys.public_key_bytes(),
        };
        let payload = hex::decode("120452020801").unwrap();

        let frame = CommandFrame::build(&payload, &mut state, &ctx, &random()).unwrap();

        assert!(frame.nonce().is_none());
        assert_eq!(body(&frame), payload.as_slice());
        match signature(&frame) {
            signature_data::SigType::HmacPersonalizedData(data) => assert_eq!(
                hex::encode(&data.tag),
                "89f365a4580b797b8e7aa8f23a86ed41277d4228b6b30059244fb1e5763e4106"
            ),
            other => panic!("unexpected signature {other:?}"),
        }

        let identity = frame
            .message()
            .signature_data
            .as_ref()
            .and_then(|s| s.signer_identity.as_ref())
            .and_then(|i| i.identity_type.as_ref());
        assert_eq!(
            identity,
            Some(&key_identity::IdentityType::PublicKey(
                keys.public_key_bytes().to_vec()
            ))
        );
    }

    #[test]
    fn test_each_frame_consumes_a_counter() {
        let keys = client();
        let mut state = session(41);
        let ctx = CommandContext {
            vin: VIN,
            domain: Domain::VehicleSecurity,
            signature_type: SignatureType::HmacPersonalized,
            expiration_secs: 15,
            client_public_key: keys.public_key_bytes(),
        };

        let first = CommandFrame::build(b"lock", &mut state, &ctx, &crate::OsRandom).unwrap();
        let second = CommandFrame::build(b"lock", &mut state, &ctx, &crate::OsRandom).unwrap();
        assert_eq!(first.counter(), 42);
        assert_eq!(second.counter(), 43);
        assert_ne!(first.to_bytes(), second.to_bytes());
    }

    #[test]
    fn test_unsupported_signature_type_keeps_counter() {
        let keys = client();
        let mut state = session(0);
        let ctx = CommandContext {
            vin: VIN,
            domain: Domain::Infotainment,
            signature_type: SignatureType::Hmac,
            expiration_secs: 5,
            client_public_key: keys.public_key_bytes(),
        };

        assert_eq!(
            CommandFrame::build(b"x", &mut state, &ctx, &crate::OsRandom).unwrap_err(),
            ProtocolError::UnsupportedSignatureType { signature_type: 6 }
        );
        assert_eq!(state.counter(), 0);
    }
}
