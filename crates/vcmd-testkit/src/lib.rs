//! # vcmd-testkit
//!
//! Test infrastructure for the vehicle command workspace: a simulated vehicle
//! peer, deterministic randomness, an in-memory credential provider and fixed
//! key fixtures.
//!
//! ```rust,no_run
//! use vcmd_testkit::TestClient;
//! use vcmd_client::Domain;
//!
//! # async fn demo() {
//! let client = TestClient::new();
//! let car = client.orchestrator();
//! car.send_command(Domain::Infotainment, b"honk").await.unwrap();
//! assert_eq!(client.vehicle.accepted().await.len(), 1);
//! # }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod credentials;
pub mod harness;
pub mod keys;
pub mod random;
pub mod vehicle;

pub use credentials::StaticCredentials;
pub use harness::{fast_retry, TestClient, TestClientBuilder};
pub use keys::{
    client_key_pair, fixture_shared_key, stranger_key_pair, vehicle_key_pair, FIXTURE_SHARED_KEY,
    TEST_VIN,
};
pub use random::SequenceRandom;
pub use vehicle::{AcceptedCommand, SimulatedVehicle, DEFAULT_CLOCK_TIME};
