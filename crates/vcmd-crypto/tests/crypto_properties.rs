//! Property tests for the session crypto
//!
//! - ECDH agreement is symmetric between client and vehicle
//! - A single flipped bit in metadata or payload changes the HMAC tag
//! - AEAD decryption inverts encryption for any payload

use proptest::prelude::*;
use vcmd_crypto::{
    compute_tag, decrypt_aead, derive_key, derive_shared_secret, encrypt_aead, tags_equal,
    ClientKeyPair, KeyPurpose, PeerPublicKey, SharedKey,
};

fn key_pair() -> impl Strategy<Value = ClientKeyPair> {
    any::<[u8; 32]>().prop_filter_map("scalar out of range", |bytes| {
        ClientKeyPair::from_secret_bytes(&bytes).ok()
    })
}

fn peer(pair: &ClientKeyPair) -> PeerPublicKey {
    PeerPublicKey::from_sec1_bytes(pair.public_key_bytes()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Both ends of an exchange land on the same session key
    #[test]
    fn ecdh_agreement_is_symmetric(a in key_pair(), b in key_pair()) {
        let ab = derive_shared_secret(&a, &peer(&b)).unwrap();
        let ba = derive_shared_secret(&b, &peer(&a)).unwrap();
        prop_assert_eq!(ab, ba);
    }

    /// Flipping any bit of the authenticated input changes the tag
    #[test]
    fn hmac_tag_detects_bit_flips(
        key in any::<[u8; 16]>(),
        metadata in proptest::collection::vec(any::<u8>(), 1..64),
        payload in proptest::collection::vec(any::<u8>(), 1..64),
        flip in any::<prop::sample::Index>(),
    ) {
        let key = derive_key(&SharedKey::from_bytes(key), KeyPurpose::AuthenticatedCommand);
        let original = compute_tag(&metadata, &payload, &key);

        let mut joined = metadata.clone();
        joined.extend_from_slice(&payload);
        let position = flip.index(joined.len());
        joined[position] ^= 0x01;
        let (tampered_meta, tampered_payload) = joined.split_at(metadata.len());

        let tampered = compute_tag(tampered_meta, tampered_payload, &key);
        prop_assert!(!tags_equal(&original, &tampered));
    }

    /// Decryption recovers the plaintext under the same metadata
    #[test]
    fn aead_decrypt_inverts_encrypt(
        key in any::<[u8; 16]>(),
        nonce in any::<[u8; 12]>(),
        metadata in proptest::collection::vec(any::<u8>(), 0..64),
        payload in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let key = SharedKey::from_bytes(key);
        let (ciphertext, tag) = encrypt_aead(&payload, &metadata, &key, &nonce).unwrap();
        prop_assert_eq!(ciphertext.len(), payload.len());

        let plain = decrypt_aead(&ciphertext, &tag, &metadata, &key, &nonce).unwrap();
        prop_assert_eq!(plain, payload);
    }
}

#[test]
fn test_known_hmac_command_tag() {
    let mut shared = [0u8; 16];
    hex::decode_to_slice("b628048f414afe9a606f6c97195bb2e4", &mut shared).unwrap();
    let key = derive_key(&SharedKey::from_bytes(shared), KeyPurpose::AuthenticatedCommand);

    let metadata = hex::decode(
        "000108010103021135594a3345314541374b4630303030303103104c463f9cc0d3d26906e982ed224adde6040400000a5f050400000001ff",
    )
    .unwrap();
    let payload = hex::decode("120452020801").unwrap();

    assert_eq!(
        hex::encode(compute_tag(&metadata, &payload, &key)),
        "89f365a4580b797b8e7aa8f23a86ed41277d4228b6b30059244fb1e5763e4106"
    );
}
