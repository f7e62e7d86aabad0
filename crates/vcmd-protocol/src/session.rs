//! Per-domain session state
//!
//! A [`SessionState`] is built in one step from validated session info and is
//! never partially updated afterwards; the counter is the only field that
//! moves. A new epoch replaces the whole state.

use crate::error::{HandshakeError, ProtocolError};
use crate::wire::{Domain, SessionInfo, SessionInfoStatus};
use prost::Message;
use std::collections::HashMap;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use vcmd_crypto::{derive_shared_secret, ClientKeyPair, PeerPublicKey, SharedKey};

/// Length of a session epoch
pub const EPOCH_LEN: usize = 16;

/// Negotiated key material and anti-replay state for one domain
#[derive(Debug, Clone)]
pub struct SessionState {
    epoch: [u8; EPOCH_LEN],
    counter: u32,
    clock_time: u32,
    handle: u32,
    peer_public_key: PeerPublicKey,
    shared_key: SharedKey,
    session_info_bytes: Vec<u8>,
}

impl SessionState {
    /// Decode session info and derive the session key
    ///
    /// The raw bytes are kept because the session info tag is computed over
    /// them exactly as received.
    pub fn from_session_info(bytes: &[u8], keys: &ClientKeyPair) -> Result<Self, HandshakeError> {
        let info = SessionInfo::decode(bytes).map_err(|e| ProtocolError::decode("SessionInfo", e))?;

        if info.status() == SessionInfoStatus::KeyNotOnWhitelist {
            return Err(HandshakeError::KeyNotPaired);
        }

        let epoch: [u8; EPOCH_LEN] =
            info.epoch
                .as_slice()
                .try_into()
                .map_err(|_| ProtocolError::InvalidEpochLength {
                    actual: info.epoch.len(),
                })?;

        let peer_public_key = PeerPublicKey::from_sec1_bytes(&info.public_key)?;
        let shared_key = derive_shared_secret(keys, &peer_public_key)?;

        Ok(Self {
            epoch,
            counter: info.counter,
            clock_time: info.clock_time,
            handle: info.handle,
            peer_public_key,
            shared_key,
            session_info_bytes: bytes.to_vec(),
        })
    }

    /// Peer-issued session identifier
    pub fn epoch(&self) -> &[u8; EPOCH_LEN] {
        &self.epoch
    }

    /// Last counter value used or advertised
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Vehicle clock from the session info, in seconds
    pub fn clock_time(&self) -> u32 {
        self.clock_time
    }

    /// Key handle the vehicle assigned to us
    pub fn handle(&self) -> u32 {
        self.handle
    }

    /// The vehicle's public key
    pub fn peer_public_key(&self) -> &PeerPublicKey {
        &self.peer_public_key
    }

    /// Session key derived at handshake time
    pub fn shared_key(&self) -> &SharedKey {
        &self.shared_key
    }

    /// Session info exactly as received
    pub fn session_info_bytes(&self) -> &[u8] {
        &self.session_info_bytes
    }

    /// Advance the counter and return the new value
    ///
    /// Fails instead of wrapping once the counter reaches `u32::MAX`.
    pub fn next_counter(&mut self) -> Result<u32, ProtocolError> {
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or(ProtocolError::CounterExhausted)?;
        Ok(self.counter)
    }

    /// Absolute expiration `secs` after the vehicle's last known clock
    pub fn expires_at(&self, secs: u32) -> u32 {
        self.clock_time.saturating_add(secs)
    }

    /// Never fall behind a counter already used in the same epoch
    ///
    /// A refreshed session for an unchanged epoch may advertise a counter
    /// below values we already sent; those must not be issued again.
    pub fn inherit_counter(&mut self, previous: &SessionState) {
        self.raise_counter(&previous.epoch, previous.counter);
    }

    fn raise_counter(&mut self, epoch: &[u8; EPOCH_LEN], counter: u32) {
        if &self.epoch == epoch {
            self.counter = self.counter.max(counter);
        }
    }
}

/// Where a domain is in its session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionPhase {
    /// No usable session
    #[default]
    NoSession,
    /// A handshake is in flight
    Handshaking,
    /// Session info validated and stored
    Established,
}

/// The session slot for one domain, held under that domain's lock
///
/// Dropping a session remembers its epoch and last counter, so the next
/// session installed for the same epoch never reissues a counter.
#[derive(Debug, Default)]
pub struct DomainSlot {
    session: Option<SessionState>,
    floor: Option<([u8; EPOCH_LEN], u32)>,
}

impl DomainSlot {
    /// The current session, if any
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Mutable access for counter advancement
    pub fn session_mut(&mut self) -> Option<&mut SessionState> {
        self.session.as_mut()
    }

    /// Install a freshly negotiated session
    ///
    /// The counter is raised to the last one used in the same epoch, whether
    /// that came from the session being replaced or from a dropped one.
    pub fn install(&mut self, mut state: SessionState) {
        if let Some(current) = &self.session {
            state.inherit_counter(current);
        } else if let Some((epoch, counter)) = &self.floor {
            state.raise_counter(epoch, *counter);
        }
        self.floor = None;
        self.session = Some(state);
    }

    /// Replace the session wholesale, returning the previous one
    pub fn replace(&mut self, state: SessionState) -> Option<SessionState> {
        self.floor = None;
        self.session.replace(state)
    }

    /// Drop the session, keeping its counter as a floor
    pub fn remove(&mut self) -> Option<SessionState> {
        let removed = self.session.take();
        if let Some(state) = &removed {
            self.floor = Some((state.epoch, state.counter));
        }
        removed
    }

    /// True when a session is present
    pub fn contains(&self) -> bool {
        self.session.is_some()
    }
}

/// Session slots keyed by domain, each behind its own lock
///
/// Holding a domain's lock serializes counter advancement, framing and
/// handshakes for that domain while other domains proceed independently.
#[derive(Debug)]
pub struct SessionStore {
    slots: HashMap<Domain, Mutex<DomainSlot>>,
    phases: RwLock<HashMap<Domain, SessionPhase>>,
}

impl SessionStore {
    /// Create empty slots for `domains`
    pub fn new(domains: &[Domain]) -> Self {
        Self {
            slots: domains
                .iter()
                .map(|d| (*d, Mutex::new(DomainSlot::default())))
                .collect(),
            phases: RwLock::new(HashMap::new()),
        }
    }

    /// Domains this store holds slots for
    pub fn domains(&self) -> impl Iterator<Item = Domain> + '_ {
        self.slots.keys().copied()
    }

    /// Lock a domain's slot; `None` for domains without a slot
    pub async fn lock(&self, domain: Domain) -> Option<MutexGuard<'_, DomainSlot>> {
        match self.slots.get(&domain) {
            Some(slot) => Some(slot.lock().await),
            None => None,
        }
    }

    /// Current lifecycle phase of a domain
    pub async fn phase(&self, domain: Domain) -> SessionPhase {
        self.phases
            .read()
            .await
            .get(&domain)
            .copied()
            .unwrap_or_default()
    }

    /// Record a lifecycle transition
    pub async fn set_phase(&self, domain: Domain, phase: SessionPhase) {
        self.phases.write().await.insert(domain, phase);
    }
}
