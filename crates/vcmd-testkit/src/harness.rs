//! Wiring for end-to-end tests
//!
//! A [`TestClient`] connects a [`ClientContext`] to a [`SimulatedVehicle`]
//! with fixture keys, [`StaticCredentials`] and [`SequenceRandom`], keeping a
//! handle on each collaborator so tests can script and inspect them.

use crate::credentials::StaticCredentials;
use crate::keys::{client_key_pair, TEST_VIN};
use crate::random::SequenceRandom;
use crate::vehicle::SimulatedVehicle;
use std::sync::Arc;
use std::time::Duration;
use vcmd_client::{ClientContext, Vehicle, VehicleRegistry};
use vcmd_crypto::ClientKeyPair;
use vcmd_protocol::RetryPolicy;

/// Retry policy with short delays, meant for tests on a paused clock
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_timeout: Duration::from_millis(10),
        max_timeout: Duration::from_millis(100),
    }
}

/// A client context wired to a simulated vehicle
pub struct TestClient {
    /// The peer
    pub vehicle: Arc<SimulatedVehicle>,
    /// Token source
    pub credentials: Arc<StaticCredentials>,
    /// Randomness handed to the client
    pub random: Arc<SequenceRandom>,
    /// The shared context
    pub context: Arc<ClientContext>,
}

impl TestClient {
    /// Default simulated vehicle and four fast retries
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start customizing the wiring
    pub fn builder() -> TestClientBuilder {
        TestClientBuilder::default()
    }

    /// An orchestrator for the fixture VIN
    pub fn orchestrator(&self) -> Vehicle {
        Vehicle::new("test-car", TEST_VIN, self.context.clone())
    }

    /// A registry over the shared context
    pub fn registry(&self) -> VehicleRegistry {
        VehicleRegistry::new(self.context.clone())
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`TestClient`]
#[derive(Default)]
pub struct TestClientBuilder {
    vehicle: Option<SimulatedVehicle>,
    random: Option<SequenceRandom>,
    key_pair: Option<ClientKeyPair>,
    retry: Option<RetryPolicy>,
}

impl TestClientBuilder {
    /// Use a customized simulated vehicle
    pub fn vehicle(mut self, vehicle: SimulatedVehicle) -> Self {
        self.vehicle = Some(vehicle);
        self
    }

    /// Use scripted randomness
    pub fn random(mut self, random: SequenceRandom) -> Self {
        self.random = Some(random);
        self
    }

    /// Use a different client key
    pub fn key_pair(mut self, key_pair: ClientKeyPair) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    /// Use a different retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Wire everything together
    pub fn build(self) -> TestClient {
        let vehicle = Arc::new(self.vehicle.unwrap_or_default());
        let credentials = Arc::new(StaticCredentials::new());
        let random = Arc::new(self.random.unwrap_or_default());
        let context = ClientContext::new(
            self.key_pair.unwrap_or_else(client_key_pair),
            credentials.clone(),
            vehicle.clone(),
        )
        .with_random(random.clone())
        .with_retry(self.retry.unwrap_or_else(|| fast_retry(4)));

        TestClient {
            vehicle,
            credentials,
            random,
            context: Arc::new(context),
        }
    }
}
