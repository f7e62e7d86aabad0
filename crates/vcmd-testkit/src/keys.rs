//! Fixed key material
//!
//! Both key pairs are derived from constant scalars so shared secrets, tags
//! and ciphertexts are identical on every run.

use vcmd_crypto::{derive_shared_secret, ClientKeyPair, PeerPublicKey, SharedKey, SECRET_KEY_LEN};

/// VIN used throughout the test suites
pub const TEST_VIN: &str = "5YJ3E1EA7KF000001";

/// Private scalar of the client fixture
pub const CLIENT_SECRET: [u8; SECRET_KEY_LEN] = [0x11; SECRET_KEY_LEN];

/// Private scalar of the vehicle fixture
pub const VEHICLE_SECRET: [u8; SECRET_KEY_LEN] = [0x22; SECRET_KEY_LEN];

/// Shared key the two fixtures agree on
pub const FIXTURE_SHARED_KEY: &str = "b628048f414afe9a606f6c97195bb2e4";

/// The client's key pair
pub fn client_key_pair() -> ClientKeyPair {
    ClientKeyPair::from_secret_bytes(&CLIENT_SECRET).unwrap()
}

/// The vehicle's key pair
pub fn vehicle_key_pair() -> ClientKeyPair {
    ClientKeyPair::from_secret_bytes(&VEHICLE_SECRET).unwrap()
}

/// A client key the vehicle fixture has never seen
pub fn stranger_key_pair() -> ClientKeyPair {
    ClientKeyPair::from_secret_bytes(&[0x33; SECRET_KEY_LEN]).unwrap()
}

/// Session key between the client and vehicle fixtures
pub fn fixture_shared_key() -> SharedKey {
    let vehicle = vehicle_key_pair();
    let peer = PeerPublicKey::from_sec1_bytes(vehicle.public_key_bytes()).unwrap();
    derive_shared_secret(&client_key_pair(), &peer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_shared_key() {
        assert_eq!(hex::encode(fixture_shared_key().as_bytes()), FIXTURE_SHARED_KEY);
    }
}
