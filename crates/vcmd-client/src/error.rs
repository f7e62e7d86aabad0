//! Client-level errors
//!
//! Vehicle operations fail with [`vcmd_protocol::VehicleError`]; the errors
//! here cover registry bookkeeping and configuration, which are always caller
//! mistakes and never retried.

/// Registry lookups and insertions that conflict with its contents
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Strict insertion of an id that is already present
    #[error("Vehicle with id '{id}' already exists. Use ensure_vehicle or override_vehicle.")]
    AlreadyExists {
        /// Conflicting id
        id: String,
        /// VIN of the rejected insertion
        vin: String,
    },

    /// Lookup or removal of an id that is not present
    #[error("Vehicle with id '{id}' not found in the registry.")]
    DoesNotExist {
        /// Missing id
        id: String,
    },
}

impl RegistryError {
    /// Create an already-exists error
    pub fn already_exists(id: impl Into<String>, vin: impl Into<String>) -> Self {
        Self::AlreadyExists {
            id: id.into(),
            vin: vin.into(),
        }
    }

    /// Create a does-not-exist error
    pub fn does_not_exist(id: impl Into<String>) -> Self {
        Self::DoesNotExist { id: id.into() }
    }
}

/// Configuration could not be loaded or is invalid
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Config error: failed to read {path}: {message}")]
    Io {
        /// Path that was read
        path: String,
        /// IO detail
        message: String,
    },

    /// The file was not valid TOML for this schema
    #[error("Config error: invalid TOML: {message}")]
    Parse {
        /// Parser detail
        message: String,
    },

    /// An environment override could not be parsed
    #[error("Config error: invalid value for {key}: {value}")]
    InvalidEnv {
        /// Environment variable name
        key: String,
        /// Rejected value
        value: String,
    },

    /// A value is out of range
    #[error("Config error: {message}")]
    Invalid {
        /// What is wrong
        message: String,
    },

    /// The configured private key could not be loaded
    #[error("Config error: {0}")]
    Key(#[from] vcmd_crypto::CryptoError),

    /// The relay transport could not be built
    #[error("Config error: {0}")]
    Transport(#[from] vcmd_protocol::TransportError),
}

impl ConfigError {
    /// Create an invalid value error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}
