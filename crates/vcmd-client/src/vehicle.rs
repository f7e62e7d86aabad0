//! Vehicle session orchestrator
//!
//! A [`Vehicle`] owns one session slot per domain. Each slot sits behind its
//! own async mutex, and that lock is held for the whole of a handshake or a
//! command issuance, retries included. Two commands to the same domain can
//! therefore never observe the same counter, and a second handshake waits for
//! the first instead of racing it. Different domains proceed independently.
//!
//! Session resynchronization lives here rather than in the retry engine: the
//! engine reports `SessionOutOfSync` and the command operation repairs the
//! slot in its `prepare_retry` hook.

use crate::context::ClientContext;
use crate::credentials::TokenKind;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vcmd_protocol::{
    classify, verify_session_info, Classification, CommandContext, CommandFrame, Domain,
    DomainSlot, HandshakeRequest, HandshakeResponse, MessageFault, ProtocolError, RetryEngine,
    RetryReason, RetryableOperation, RoutableMessage, SessionPhase, SessionState, SessionStore, SignatureType,
    VehicleError,
};

/// Command orchestrator for a single vehicle
#[derive(Debug)]
pub struct Vehicle {
    id: String,
    vin: String,
    context: Arc<ClientContext>,
    sessions: SessionStore,
    engine: RetryEngine,
}

impl Vehicle {
    /// Create a vehicle with no sessions
    pub fn new(id: impl Into<String>, vin: impl Into<String>, context: Arc<ClientContext>) -> Self {
        let engine = RetryEngine::new(context.retry);
        Self {
            id: id.into(),
            vin: vin.into(),
            context,
            sessions: SessionStore::new(&Domain::SESSION_DOMAINS),
            engine,
        }
    }

    /// Caller-chosen identifier, also used for credential lookups
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Vehicle identification number
    pub fn vin(&self) -> &str {
        &self.vin
    }

    /// Where `domain` is in its session lifecycle
    pub async fn session_phase(&self, domain: Domain) -> SessionPhase {
        self.sessions.phase(domain).await
    }

    /// Last counter used or advertised for `domain`, if a session exists
    pub async fn session_counter(&self, domain: Domain) -> Option<u32> {
        let slot = self.sessions.lock(domain).await?;
        slot.session().map(SessionState::counter)
    }

    /// Establish a session with `domain` unless one already exists
    pub async fn start_session(&self, domain: Domain) -> Result<(), VehicleError> {
        let mut slot = self.lock_slot(domain).await?;
        if slot.contains() {
            return Ok(());
        }
        self.handshake(domain, &mut slot).await
    }

    /// Drop the session for `domain`; the next command handshakes again
    pub async fn invalidate_session(&self, domain: Domain) -> Result<(), VehicleError> {
        let mut slot = self.lock_slot(domain).await?;
        self.drop_session(domain, &mut slot).await;
        Ok(())
    }

    /// Send `payload` with the context's default signature type and lifetime
    pub async fn send_command(
        &self,
        domain: Domain,
        payload: &[u8],
    ) -> Result<RoutableMessage, VehicleError> {
        self.issue_command(
            domain,
            payload,
            self.context.default_signature_type,
            self.context.default_expiration_secs,
        )
        .await
    }

    /// Frame and send `payload` to `domain`, returning the vehicle's response
    ///
    /// Handshakes first if the domain has no session. Every attempt is framed
    /// again with a fresh counter; the response is returned untouched once it
    /// carries no fault.
    pub async fn issue_command(
        &self,
        domain: Domain,
        payload: &[u8],
        signature_type: SignatureType,
        expiration_secs: u32,
    ) -> Result<RoutableMessage, VehicleError> {
        let mut slot = self.lock_slot(domain).await?;
        let fresh_session = !slot.contains();
        if fresh_session {
            self.handshake(domain, &mut slot).await?;
        }

        let mut operation = CommandAttempt {
            vehicle: self,
            domain,
            slot: &mut *slot,
            payload,
            signature_type,
            expiration_secs,
            last_uuid: None,
            fresh_session,
        };
        self.engine.execute(&mut operation).await
    }

    async fn lock_slot(
        &self,
        domain: Domain,
    ) -> Result<tokio::sync::MutexGuard<'_, DomainSlot>, VehicleError> {
        self.sessions
            .lock(domain)
            .await
            .ok_or(VehicleError::NoSession { domain })
    }

    async fn drop_session(&self, domain: Domain, slot: &mut DomainSlot) {
        if slot.remove().is_some() {
            debug!(vin = %self.vin, domain = ?domain, "Session dropped");
        }
        self.sessions.set_phase(domain, SessionPhase::NoSession).await;
    }

    /// Replace the slot's session with a freshly negotiated one
    ///
    /// The old session stays in the slot until its replacement is installed.
    /// On failure the domain is left without a session, though its last
    /// counter still bounds the next session of the same epoch.
    async fn handshake(&self, domain: Domain, slot: &mut DomainSlot) -> Result<(), VehicleError> {
        self.sessions.set_phase(domain, SessionPhase::Handshaking).await;

        let challenge = self.context.random.random_16();
        let routing_address = self.context.random.random_16();
        let request = HandshakeRequest::new(domain, &self.context.key_pair, challenge, routing_address);
        debug!(vin = %self.vin, domain = ?domain, "Starting session handshake");

        match self.negotiate(&request).await {
            Ok(state) => {
                slot.install(state);
                if let Some(state) = slot.session() {
                    info!(
                        vin = %self.vin,
                        domain = ?domain,
                        counter = state.counter(),
                        clock_time = state.clock_time(),
                        "Session established"
                    );
                }
                self.sessions.set_phase(domain, SessionPhase::Established).await;
                Ok(())
            }
            Err(err) => {
                warn!(vin = %self.vin, domain = ?domain, error = %err, "Session handshake failed");
                self.drop_session(domain, slot).await;
                Err(err)
            }
        }
    }

    async fn negotiate(&self, request: &HandshakeRequest) -> Result<SessionState, VehicleError> {
        let mut operation = HandshakeAttempt {
            vehicle: self,
            request,
        };
        let response = self.engine.execute(&mut operation).await?;
        let state = HandshakeResponse::parse(&response)?.establish(
            &self.vin,
            request.challenge(),
            &self.context.key_pair,
        )?;
        Ok(state)
    }

    /// Adopt session info a vehicle attached to a fault response
    ///
    /// Only accepted when its tag verifies against `challenge`, the uuid of
    /// the command that was rejected.
    fn adopt_session_info(
        &self,
        domain: Domain,
        slot: &mut DomainSlot,
        response: &RoutableMessage,
        challenge: &[u8],
    ) -> bool {
        let Some(info) = response.session_info_bytes() else {
            return false;
        };
        let Some(tag) = response
            .signature_data
            .as_ref()
            .and_then(|s| s.session_info_tag())
        else {
            return false;
        };

        let state = match SessionState::from_session_info(info, &self.context.key_pair) {
            Ok(state) => state,
            Err(err) => {
                debug!(vin = %self.vin, domain = ?domain, error = %err, "Ignoring attached session info");
                return false;
            }
        };
        if let Err(err) = verify_session_info(&self.vin, challenge, info, tag, state.shared_key()) {
            warn!(vin = %self.vin, domain = ?domain, error = %err, "Attached session info failed verification");
            return false;
        }

        slot.install(state);
        info!(
            vin = %self.vin,
            domain = ?domain,
            counter = slot.session().map(SessionState::counter),
            "Session resynchronized from fault response"
        );
        true
    }

    /// Fetch a token and perform one classified round trip
    async fn round_trip(&self, message: &RoutableMessage) -> Classification {
        let token = match self
            .context
            .credentials
            .access_token(&self.id, TokenKind::Vehicle)
            .await
        {
            Ok(token) => token,
            Err(err) => return Classification::Fatal(VehicleError::Credentials(err)),
        };
        classify(self.context.transport.send(&self.vin, message, &token).await)
    }

    async fn refresh_token(&self) -> Result<(), VehicleError> {
        info!(vin = %self.vin, id = %self.id, "Refreshing vehicle access token");
        self.context
            .credentials
            .refresh_access_token(&self.id, TokenKind::Vehicle)
            .await
            .map(|_| ())
            .map_err(VehicleError::Credentials)
    }
}

/// Sends one handshake request; every attempt reuses the same challenge
struct HandshakeAttempt<'a> {
    vehicle: &'a Vehicle,
    request: &'a HandshakeRequest,
}

#[async_trait]
impl<'a> RetryableOperation for HandshakeAttempt<'a> {
    async fn attempt(&mut self, _attempt: u32) -> Classification {
        self.vehicle.round_trip(self.request.message()).await
    }

    async fn prepare_retry(&mut self, reason: &RetryReason) -> Result<(), VehicleError> {
        match reason {
            RetryReason::AccessTokenExpired(_) => self.vehicle.refresh_token().await,
            RetryReason::Transient(_) | RetryReason::SessionOutOfSync { .. } => Ok(()),
        }
    }
}

/// Sends one command, reframing it with a fresh counter on every attempt
struct CommandAttempt<'a> {
    vehicle: &'a Vehicle,
    domain: Domain,
    slot: &'a mut DomainSlot,
    payload: &'a [u8],
    signature_type: SignatureType,
    expiration_secs: u32,
    last_uuid: Option<[u8; 16]>,
    /// The session was negotiated during this issuance
    fresh_session: bool,
}

impl CommandAttempt<'_> {
    fn frame(&mut self) -> Result<CommandFrame, VehicleError> {
        let vehicle = self.vehicle;
        let session = self.slot.session_mut().ok_or(VehicleError::NoSession {
            domain: self.domain,
        })?;
        let ctx = CommandContext {
            vin: &vehicle.vin,
            domain: self.domain,
            signature_type: self.signature_type,
            expiration_secs: self.expiration_secs,
            client_public_key: vehicle.context.key_pair.public_key_bytes(),
        };
        Ok(CommandFrame::build(
            self.payload,
            session,
            &ctx,
            vehicle.context.random.as_ref(),
        )?)
    }

    /// Frame the command, negotiating a new session if the counter ran out
    ///
    /// A session negotiated during this issuance is not renegotiated; if the
    /// vehicle keeps handing out an exhausted epoch the session is dropped and
    /// the error surfaces.
    async fn frame_or_renegotiate(&mut self) -> Result<CommandFrame, VehicleError> {
        match self.frame() {
            Err(VehicleError::Protocol(ProtocolError::CounterExhausted)) => {}
            other => return other,
        }

        if !self.fresh_session {
            warn!(
                vin = %self.vehicle.vin,
                domain = ?self.domain,
                "Session counter exhausted, negotiating a new session"
            );
            self.vehicle.handshake(self.domain, self.slot).await?;
            self.fresh_session = true;
            match self.frame() {
                Err(VehicleError::Protocol(ProtocolError::CounterExhausted)) => {}
                other => return other,
            }
        }

        self.vehicle.drop_session(self.domain, self.slot).await;
        Err(ProtocolError::CounterExhausted.into())
    }

    async fn resync(&mut self, fault: MessageFault, response: &RoutableMessage) -> Result<(), VehicleError> {
        if let Some(uuid) = self.last_uuid {
            if self
                .vehicle
                .adopt_session_info(self.domain, self.slot, response, &uuid)
            {
                return Ok(());
            }
        }

        warn!(
            vin = %self.vehicle.vin,
            domain = ?self.domain,
            fault = ?fault,
            "Session out of sync, negotiating a new session"
        );
        self.vehicle.handshake(self.domain, self.slot).await?;
        self.fresh_session = true;
        Ok(())
    }
}

#[async_trait]
impl<'a> RetryableOperation for CommandAttempt<'a> {
    async fn attempt(&mut self, attempt: u32) -> Classification {
        let frame = match self.frame_or_renegotiate().await {
            Ok(frame) => frame,
            Err(err) => return Classification::Fatal(err),
        };
        let vehicle = self.vehicle;
        self.last_uuid = Some(*frame.uuid());
        debug!(
            vin = %vehicle.vin,
            domain = ?self.domain,
            attempt,
            counter = frame.counter(),
            "Sending vehicle command"
        );

        vehicle.round_trip(frame.message()).await
    }

    async fn prepare_retry(&mut self, reason: &RetryReason) -> Result<(), VehicleError> {
        match reason {
            RetryReason::AccessTokenExpired(_) => self.vehicle.refresh_token().await,
            RetryReason::Transient(_) => Ok(()),
            RetryReason::SessionOutOfSync { fault, response } => self.resync(*fault, response).await,
        }
    }
}
