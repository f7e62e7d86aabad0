//! Shared client context
//!
//! Everything a vehicle needs from its host: our key pair, the credential and
//! transport collaborators, a random source and the retry policy. Built once
//! and shared by `Arc`; independent contexts never interact.

use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::error::ConfigError;
use crate::transport::{HttpRelayTransport, VehicleTransport};
use std::fmt;
use std::sync::Arc;
use vcmd_crypto::ClientKeyPair;
use vcmd_protocol::{OsRandom, RandomSource, RetryPolicy, SignatureType};

/// Collaborators and settings shared by every vehicle of one client
#[derive(Clone)]
pub struct ClientContext {
    /// Our P-256 key pair
    pub key_pair: Arc<ClientKeyPair>,
    /// Bearer token source
    pub credentials: Arc<dyn CredentialProvider>,
    /// Relay to the vehicles
    pub transport: Arc<dyn VehicleTransport>,
    /// Randomness for challenges, uuids and nonces
    pub random: Arc<dyn RandomSource>,
    /// Retry budget and backoff
    pub retry: RetryPolicy,
    /// Command lifetime for [`crate::Vehicle::send_command`]
    pub default_expiration_secs: u32,
    /// Signature type for [`crate::Vehicle::send_command`]
    pub default_signature_type: SignatureType,
}

impl ClientContext {
    /// Context with OS randomness and the default retry policy
    pub fn new(
        key_pair: ClientKeyPair,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn VehicleTransport>,
    ) -> Self {
        let defaults = ClientConfig::default();
        Self {
            key_pair: Arc::new(key_pair),
            credentials,
            transport,
            random: Arc::new(OsRandom),
            retry: defaults.retry_policy(),
            default_expiration_secs: defaults.default_expiration_secs,
            default_signature_type: SignatureType::AesGcmPersonalized,
        }
    }

    /// Build a context from validated configuration
    ///
    /// Loads the private key from `private_key_path` and talks to the relay
    /// at `relay_base_url`.
    pub fn from_config(
        config: &ClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let key_path = config
            .private_key_path
            .as_deref()
            .ok_or_else(|| ConfigError::invalid("private_key_path is required"))?;
        let key_pair = ClientKeyPair::from_pem_file(key_path)?;
        let transport = HttpRelayTransport::new(config.relay_base_url.clone(), config.request_timeout())?;

        Ok(Self {
            retry: config.retry_policy(),
            default_expiration_secs: config.default_expiration_secs,
            ..Self::new(key_pair, credentials, Arc::new(transport))
        })
    }

    /// Replace the random source
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientContext")
            .field("key_pair", &self.key_pair)
            .field("credentials", &"<dyn CredentialProvider>")
            .field("transport", &"<dyn VehicleTransport>")
            .field("random", &"<dyn RandomSource>")
            .field("retry", &self.retry)
            .field("default_expiration_secs", &self.default_expiration_secs)
            .field("default_signature_type", &self.default_signature_type)
            .finish()
    }
}
