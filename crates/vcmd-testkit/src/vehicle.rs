//! Simulated vehicle peer
//!
//! [`SimulatedVehicle`] implements the transport seam and plays the vehicle
//! side of the protocol: it answers handshakes with tagged session info,
//! authenticates HMAC and AES-GCM commands against the same metadata envelope
//! the client builds, and rejects replayed counters. Faults and transport
//! errors can be queued ahead of time; each queued entry answers exactly one
//! request.
//!
//! Session faults are answered the way a real vehicle answers them, with
//! fresh session info tagged against the rejected request's uuid, unless
//! [`SimulatedVehicle::without_session_info_on_faults`] is set. A handshake
//! against a domain whose counter reached `u32::MAX` starts a new epoch.

use async_trait::async_trait;
use prost::Message;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;
use vcmd_client::VehicleTransport;
use vcmd_crypto::{
    compute_tag, decrypt_aead, derive_key, derive_shared_secret, tags_equal, ClientKeyPair,
    KeyPurpose, PeerPublicKey, SharedKey,
};
use vcmd_protocol::wire::{
    key_identity, routable_message, signature_data, Destination, HmacSignatureData,
    MessageStatus, OperationStatus, SessionInfo, SessionInfoStatus, SignatureData,
};
use vcmd_protocol::{
    command_metadata, session_info_tag, Domain, MessageFault, RoutableMessage, SignatureType,
    TransportError,
};

use crate::keys::{client_key_pair, vehicle_key_pair, TEST_VIN};

/// Vehicle clock reported by default
pub const DEFAULT_CLOCK_TIME: u32 = 2650;

/// A command the vehicle authenticated and accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedCommand {
    /// Domain it was addressed to
    pub domain: Domain,
    /// Counter it carried
    pub counter: u32,
    /// HMAC or AES-GCM
    pub signature_type: SignatureType,
    /// Payload after decryption
    pub payload: Vec<u8>,
}

/// Session info attached to a fault response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attached {
    Nothing,
    SessionInfo,
    CorruptTag,
    ForeignChallenge,
}

/// What to do with the next request instead of processing it
#[derive(Debug, Clone)]
enum Scripted {
    Fault { fault: MessageFault, attached: Attached },
    Transport(TransportError),
    CorruptHandshake,
}

#[derive(Debug)]
struct DomainState {
    epoch: [u8; 16],
    generation: u32,
    counter: u32,
}

impl DomainState {
    fn new(domain: Domain) -> Self {
        Self {
            epoch: generated_epoch(domain, 0),
            generation: 0,
            counter: 0,
        }
    }

    fn rotate(&mut self, domain: Domain) {
        self.generation += 1;
        self.epoch = generated_epoch(domain, self.generation);
        self.counter = 0;
    }
}

fn generated_epoch(domain: Domain, generation: u32) -> [u8; 16] {
    let mut epoch = [0x5a; 16];
    epoch[0] = domain.metadata_byte();
    epoch[12..].copy_from_slice(&generation.to_be_bytes());
    epoch
}

#[derive(Debug, Default)]
struct SimState {
    domains: HashMap<Domain, DomainState>,
    paired: HashSet<Vec<u8>>,
    scripted: VecDeque<Scripted>,
    received: Vec<RoutableMessage>,
    tokens: Vec<String>,
    accepted: Vec<AcceptedCommand>,
    handshakes: usize,
}

/// In-process vehicle speaking the command protocol
#[derive(Debug)]
pub struct SimulatedVehicle {
    vin: String,
    keys: ClientKeyPair,
    clock_time: u32,
    session_info_on_faults: bool,
    epoch_rollover: bool,
    state: Mutex<SimState>,
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVehicle {
    /// Vehicle with the fixture VIN and key that has the client fixture paired
    pub fn new() -> Self {
        let mut state = SimState::default();
        for domain in Domain::SESSION_DOMAINS {
            state.domains.insert(domain, DomainState::new(domain));
        }
        state.paired.insert(client_key_pair().public_key_bytes().to_vec());

        Self {
            vin: TEST_VIN.to_string(),
            keys: vehicle_key_pair(),
            clock_time: DEFAULT_CLOCK_TIME,
            session_info_on_faults: true,
            epoch_rollover: true,
            state: Mutex::new(state),
        }
    }

    /// Use a different VIN for personalization checks
    pub fn with_vin(mut self, vin: impl Into<String>) -> Self {
        self.vin = vin.into();
        self
    }

    /// Report `clock_time` in session info
    pub fn with_clock_time(mut self, clock_time: u32) -> Self {
        self.clock_time = clock_time;
        self
    }

    /// Start `domain` at a fixed epoch and counter
    pub fn with_session(mut self, domain: Domain, epoch: [u8; 16], counter: u32) -> Self {
        if let Some(state) = self.state.get_mut().domains.get_mut(&domain) {
            state.epoch = epoch;
            state.counter = counter;
        }
        self
    }

    /// Answer session faults with a bare fault, forcing a new handshake
    pub fn without_session_info_on_faults(mut self) -> Self {
        self.session_info_on_faults = false;
        self
    }

    /// Keep an exhausted epoch across handshakes instead of starting a new one
    pub fn without_epoch_rollover(mut self) -> Self {
        self.epoch_rollover = false;
        self
    }

    /// Remove every paired key
    pub fn unpaired(mut self) -> Self {
        self.state.get_mut().paired.clear();
        self
    }

    /// Answer the next request with `fault`
    pub async fn push_fault(&self, fault: MessageFault) {
        self.push(Scripted::Fault {
            fault,
            attached: Attached::Nothing,
        })
        .await;
    }

    /// Answer the next request with `fault` plus freshly tagged session info
    pub async fn push_fault_with_session_info(&self, fault: MessageFault) {
        self.push(Scripted::Fault {
            fault,
            attached: Attached::SessionInfo,
        })
        .await;
    }

    /// Answer the next request with `fault` and session info whose tag is damaged
    pub async fn push_fault_with_corrupt_session_info(&self, fault: MessageFault) {
        self.push(Scripted::Fault {
            fault,
            attached: Attached::CorruptTag,
        })
        .await;
    }

    /// Answer the next request with `fault` and session info tagged for
    /// some other request
    pub async fn push_fault_with_foreign_session_info(&self, fault: MessageFault) {
        self.push(Scripted::Fault {
            fault,
            attached: Attached::ForeignChallenge,
        })
        .await;
    }

    /// Answer the next request as a handshake whose session info tag does not
    /// verify
    pub async fn push_corrupt_handshake(&self) {
        self.push(Scripted::CorruptHandshake).await;
    }

    /// Fail the next request at the transport layer
    pub async fn push_transport_error(&self, error: TransportError) {
        self.push(Scripted::Transport(error)).await;
    }

    async fn push(&self, entry: Scripted) {
        self.state.lock().await.scripted.push_back(entry);
    }

    /// Simulate a reboot of `domain`: new epoch, counter back to zero
    pub async fn rotate_epoch(&self, domain: Domain) {
        let mut state = self.state.lock().await;
        if let Some(domain_state) = state.domains.get_mut(&domain) {
            domain_state.rotate(domain);
        }
    }

    /// Current epoch of `domain`
    pub async fn epoch(&self, domain: Domain) -> Option<[u8; 16]> {
        self.state.lock().await.domains.get(&domain).map(|d| d.epoch)
    }

    /// Highest counter accepted for `domain`
    pub async fn counter(&self, domain: Domain) -> Option<u32> {
        self.state.lock().await.domains.get(&domain).map(|d| d.counter)
    }

    /// Handshake requests answered
    pub async fn handshake_count(&self) -> usize {
        self.state.lock().await.handshakes
    }

    /// Commands accepted, in arrival order
    pub async fn accepted(&self) -> Vec<AcceptedCommand> {
        self.state.lock().await.accepted.clone()
    }

    /// Every request received, scripted ones included
    pub async fn received(&self) -> Vec<RoutableMessage> {
        self.state.lock().await.received.clone()
    }

    /// Bearer tokens presented, one per request
    pub async fn tokens(&self) -> Vec<String> {
        self.state.lock().await.tokens.clone()
    }

    fn shared_key(&self, client_public_key: &[u8]) -> Option<SharedKey> {
        let peer = PeerPublicKey::from_sec1_bytes(client_public_key).ok()?;
        derive_shared_secret(&self.keys, &peer).ok()
    }

    fn session_info(&self, domain: &DomainState, paired: bool) -> Vec<u8> {
        let status = if paired {
            SessionInfoStatus::Ok
        } else {
            SessionInfoStatus::KeyNotOnWhitelist
        };
        SessionInfo {
            counter: domain.counter,
            public_key: self.keys.public_key_bytes().to_vec(),
            epoch: domain.epoch.to_vec(),
            clock_time: self.clock_time,
            status: status.into(),
            handle: 0,
        }
        .encode_to_vec()
    }

    /// Response skeleton addressed back to the requester
    fn reply_to(request: &RoutableMessage) -> RoutableMessage {
        RoutableMessage {
            to_destination: request.from_destination.clone(),
            from_destination: request.to_destination.clone(),
            request_uuid: request.uuid.clone(),
            ..Default::default()
        }
    }

    /// Attach session info tagged against the request uuid
    fn attach_session_info(
        &self,
        response: &mut RoutableMessage,
        domain: &DomainState,
        client_public_key: &[u8],
        challenge: &[u8],
    ) {
        let Some(shared_key) = self.shared_key(client_public_key) else {
            return;
        };
        let info = self.session_info(domain, true);
        let Ok(tag) = session_info_tag(&self.vin, challenge, &info, &shared_key) else {
            return;
        };
        response.payload = Some(routable_message::Payload::SessionInfo(info));
        response.signature_data = Some(SignatureData {
            signer_identity: None,
            sig_type: Some(signature_data::SigType::SessionInfoTag(HmacSignatureData {
                tag: tag.to_vec(),
            })),
        });
    }

    fn corrupt_session_info_tag(response: &mut RoutableMessage) {
        if let Some(SignatureData {
            sig_type: Some(signature_data::SigType::SessionInfoTag(data)),
            ..
        }) = response.signature_data.as_mut()
        {
            if let Some(byte) = data.tag.first_mut() {
                *byte ^= 0x01;
            }
        }
    }

    fn fault_response(
        &self,
        state: &SimState,
        request: &RoutableMessage,
        fault: MessageFault,
        attached: Attached,
    ) -> RoutableMessage {
        let mut response = Self::reply_to(request);
        response.signed_message_status = Some(MessageStatus {
            operation_status: OperationStatus::Error.into(),
            signed_message_fault: fault.into(),
        });

        if attached != Attached::Nothing {
            let domain = request_domain(request).and_then(|d| state.domains.get(&d));
            if let (Some(domain), Some(key)) = (domain, client_key(request)) {
                let challenge: Vec<u8> = match attached {
                    Attached::ForeignChallenge => request.uuid.iter().map(|b| !b).collect(),
                    _ => request.uuid.clone(),
                };
                self.attach_session_info(&mut response, domain, key, &challenge);
                if attached == Attached::CorruptTag {
                    Self::corrupt_session_info_tag(&mut response);
                }
            }
        }
        debug!(fault = ?fault, "Simulated vehicle rejected request");
        response
    }

    fn handshake(&self, state: &mut SimState, request: &RoutableMessage) -> RoutableMessage {
        state.handshakes += 1;
        let (Some(domain), Some(routable_message::Payload::SessionInfoRequest(hello))) =
            (request_domain(request), &request.payload)
        else {
            return self.fault_response(state, request, MessageFault::Decoding, Attached::Nothing);
        };
        if self.epoch_rollover {
            if let Some(exhausted) = state.domains.get_mut(&domain).filter(|d| d.counter == u32::MAX) {
                exhausted.rotate(domain);
            }
        }
        let Some(domain_state) = state.domains.get(&domain) else {
            return self.fault_response(state, request, MessageFault::InvalidDomains, Attached::Nothing);
        };
        let Some(shared_key) = self.shared_key(&hello.public_key) else {
            return self.fault_response(state, request, MessageFault::BadParameter, Attached::Nothing);
        };

        let paired = state.paired.contains(&hello.public_key);
        let info = self.session_info(domain_state, paired);
        let Ok(tag) = session_info_tag(&self.vin, &hello.challenge, &info, &shared_key) else {
            return self.fault_response(state, request, MessageFault::Decoding, Attached::Nothing);
        };

        let mut response = Self::reply_to(request);
        response.payload = Some(routable_message::Payload::SessionInfo(info));
        response.signature_data = Some(SignatureData {
            signer_identity: None,
            sig_type: Some(signature_data::SigType::SessionInfoTag(HmacSignatureData {
                tag: tag.to_vec(),
            })),
        });
        response
    }

    fn command(&self, state: &mut SimState, request: &RoutableMessage, body: &[u8]) -> RoutableMessage {
        match self.authenticate(state, request, body) {
            Ok(accepted) => {
                if let Some(domain) = state.domains.get_mut(&accepted.domain) {
                    domain.counter = accepted.counter;
                }
                let mut response = Self::reply_to(request);
                response.payload = Some(routable_message::Payload::ProtobufMessageAsBytes(
                    accepted.payload.clone(),
                ));
                state.accepted.push(accepted);
                response
            }
            Err(fault) => {
                let resync = self.session_info_on_faults
                    && matches!(
                        fault,
                        MessageFault::InvalidSignature
                            | MessageFault::InvalidTokenOrCounter
                            | MessageFault::IncorrectEpoch
                            | MessageFault::TimeExpired
                    );
                let attached = if resync {
                    Attached::SessionInfo
                } else {
                    Attached::Nothing
                };
                self.fault_response(state, request, fault, attached)
            }
        }
    }

    /// Check a command the way the vehicle does, returning the plaintext
    fn authenticate(
        &self,
        state: &SimState,
        request: &RoutableMessage,
        body: &[u8],
    ) -> Result<AcceptedCommand, MessageFault> {
        let domain = request_domain(request).ok_or(MessageFault::InvalidDomains)?;
        let domain_state = state.domains.get(&domain).ok_or(MessageFault::InvalidDomains)?;
        let client_public_key = client_key(request).ok_or(MessageFault::UnknownKeyId)?;
        if !state.paired.contains(client_public_key) {
            return Err(MessageFault::UnknownKeyId);
        }
        let shared_key = self
            .shared_key(client_public_key)
            .ok_or(MessageFault::BadParameter)?;

        let sig_type = request
            .signature_data
            .as_ref()
            .and_then(|s| s.sig_type.as_ref())
            .ok_or(MessageFault::InvalidSignature)?;

        let (signature_type, epoch, counter, expires_at) = match sig_type {
            signature_data::SigType::HmacPersonalizedData(d) => {
                (SignatureType::HmacPersonalized, &d.epoch, d.counter, d.expires_at)
            }
            signature_data::SigType::AesGcmPersonalizedData(d) => {
                (SignatureType::AesGcmPersonalized, &d.epoch, d.counter, d.expires_at)
            }
            _ => return Err(MessageFault::InvalidSignature),
        };

        if epoch.as_slice() != domain_state.epoch.as_slice() {
            return Err(MessageFault::IncorrectEpoch);
        }
        if expires_at < self.clock_time {
            return Err(MessageFault::TimeExpired);
        }

        let metadata = command_metadata(signature_type, domain, &self.vin, epoch, expires_at, counter)
            .map_err(|_| MessageFault::CouldNotHashMetadata)?;

        let payload = match sig_type {
            signature_data::SigType::HmacPersonalizedData(d) => {
                let key = derive_key(&shared_key, KeyPurpose::AuthenticatedCommand);
                if !tags_equal(&compute_tag(&metadata, body, &key), &d.tag) {
                    return Err(MessageFault::InvalidSignature);
                }
                body.to_vec()
            }
            signature_data::SigType::AesGcmPersonalizedData(d) => {
                decrypt_aead(body, &d.tag, &metadata, &shared_key, &d.nonce)
                    .map_err(|_| MessageFault::InvalidSignature)?
            }
            _ => return Err(MessageFault::InvalidSignature),
        };

        if counter <= domain_state.counter {
            return Err(MessageFault::InvalidTokenOrCounter);
        }

        Ok(AcceptedCommand {
            domain,
            counter,
            signature_type,
            payload,
        })
    }
}

fn request_domain(request: &RoutableMessage) -> Option<Domain> {
    request.to_destination.as_ref().and_then(Destination::as_domain)
}

/// Client public key from a handshake request or a command's signer identity
fn client_key(request: &RoutableMessage) -> Option<&[u8]> {
    if let Some(routable_message::Payload::SessionInfoRequest(hello)) = &request.payload {
        return Some(&hello.public_key);
    }
    match request
        .signature_data
        .as_ref()?
        .signer_identity
        .as_ref()?
        .identity_type
        .as_ref()?
    {
        key_identity::IdentityType::PublicKey(key) => Some(key),
        _ => None,
    }
}

#[async_trait]
impl VehicleTransport for SimulatedVehicle {
    async fn send(
        &self,
        _vin: &str,
        message: &RoutableMessage,
        access_token: &str,
    ) -> Result<RoutableMessage, TransportError> {
        // Round trip through the wire encoding like the relay does
        let request = RoutableMessage::from_bytes(&message.to_bytes()).unwrap();

        let mut state = self.state.lock().await;
        state.received.push(request.clone());
        state.tokens.push(access_token.to_string());

        if let Some(entry) = state.scripted.pop_front() {
            return match entry {
                Scripted::Transport(error) => Err(error),
                Scripted::Fault { fault, attached } => {
                    Ok(self.fault_response(&state, &request, fault, attached))
                }
                Scripted::CorruptHandshake => {
                    let mut response = self.handshake(&mut state, &request);
                    Self::corrupt_session_info_tag(&mut response);
                    Ok(response)
                }
            };
        }

        let response = match &request.payload {
            Some(routable_message::Payload::SessionInfoRequest(_)) => self.handshake(&mut state, &request),
            Some(routable_message::Payload::ProtobufMessageAsBytes(body)) => {
                self.command(&mut state, &request, body)
            }
            _ => self.fault_response(&state, &request, MessageFault::Decoding, Attached::Nothing),
        };

        Ok(RoutableMessage::from_bytes(&response.to_bytes()).unwrap())
    }
}
