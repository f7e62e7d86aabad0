//! # vcmd-client
//!
//! Issues authenticated commands to vehicles through a relay.
//!
//! - [`Vehicle`]: per-vehicle session orchestration and command issuance
//! - [`VehicleRegistry`]: ids to vehicles sharing one [`ClientContext`]
//! - [`VehicleTransport`] and [`CredentialProvider`]: the host-supplied
//!   collaborators, with [`HttpRelayTransport`] as the default transport
//! - [`ClientConfig`]: TOML and environment configuration
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vcmd_client::{ClientConfig, ClientContext, CredentialProvider, Domain, VehicleRegistry};
//!
//! # async fn run(credentials: Arc<dyn CredentialProvider>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::load(Path::new("vcmd.toml"))?;
//! let context = Arc::new(ClientContext::from_config(&config, credentials)?);
//! let registry = VehicleRegistry::new(context);
//!
//! let car = registry.ensure_vehicle("car", "5YJ3E1EA7KF000001").await;
//! let response = car.send_command(Domain::Infotainment, b"\x0a\x00").await?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod registry;
pub mod transport;
pub mod vehicle;

pub use config::{ClientConfig, ENV_PREFIX};
pub use context::ClientContext;
pub use credentials::{CredentialProvider, TokenKind};
pub use error::{ConfigError, RegistryError};
pub use registry::VehicleRegistry;
pub use transport::{HttpRelayTransport, VehicleTransport, DEFAULT_RELAY_URL};
pub use vehicle::Vehicle;

pub use vcmd_protocol::{Domain, RoutableMessage, SignatureType, VehicleError};
