//! Session establishment and command issuance against a simulated vehicle

use assert_matches::assert_matches;
use std::sync::Arc;
use vcmd_client::{Domain, SignatureType, Vehicle, VehicleError};
use vcmd_protocol::wire::{routable_message, signature_data};
use vcmd_protocol::{HandshakeError, RoutableMessage, SessionPhase};
use vcmd_testkit::{stranger_key_pair, SequenceRandom, SimulatedVehicle, TestClient};

const GOLDEN_EPOCH: &str = "4c463f9cc0d3d26906e982ed224adde6";

fn body(message: &RoutableMessage) -> &[u8] {
    match &message.payload {
        Some(routable_message::Payload::ProtobufMessageAsBytes(bytes)) => bytes,
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_establishes_session_once() {
    let client = TestClient::new();
    let car = client.orchestrator();
    assert_eq!(car.session_phase(Domain::Infotainment).await, SessionPhase::NoSession);

    car.start_session(Domain::Infotainment).await.unwrap();
    car.start_session(Domain::Infotainment).await.unwrap();

    assert_eq!(car.session_phase(Domain::Infotainment).await, SessionPhase::Established);
    assert_eq!(car.session_counter(Domain::Infotainment).await, Some(0));
    assert_eq!(car.session_counter(Domain::VehicleSecurity).await, None);
    assert_eq!(client.vehicle.handshake_count().await, 1);
}

#[tokio::test]
async fn test_handshake_request_shape() {
    let random = SequenceRandom::with_chunks(vec![vec![0xc0; 16], vec![0xd0; 16]]);
    let client = TestClient::builder().random(random).build();
    let car = client.orchestrator();

    car.start_session(Domain::VehicleSecurity).await.unwrap();

    let received = client.vehicle.received().await;
    assert_eq!(received.len(), 1);
    let request = &received[0];
    assert_eq!(request.uuid, vec![0xc0; 16]);
    assert_eq!(
        request.from_destination.as_ref().and_then(|d| d.as_routing_address()),
        Some([0xd0; 16].as_slice())
    );
    match &request.payload {
        Some(routable_message::Payload::SessionInfoRequest(hello)) => {
            assert_eq!(hello.challenge, vec![0xc0; 16]);
            assert_eq!(hello.public_key, client.context.key_pair.public_key_bytes());
        }
        other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn test_aead_command_matches_golden_bytes() {
    let epoch: [u8; 16] = hex::decode(GOLDEN_EPOCH).unwrap().try_into().unwrap();
    let random = SequenceRandom::with_chunks(vec![
        vec![0xc0; 16],
        vec![0xd0; 16],
        vec![0xa0; 16],
        vec![0xb0; 16],
        (0u8..12).collect(),
    ]);
    let client = TestClient::builder()
        .vehicle(SimulatedVehicle::new().with_session(Domain::Infotainment, epoch, 0))
        .random(random)
        .build();
    let car = client.orchestrator();
    let payload = hex::decode("120452020801").unwrap();

    let response = car
        .issue_command(Domain::Infotainment, &payload, SignatureType::AesGcmPersonalized, 5)
        .await
        .unwrap();

    let received = client.vehicle.received().await;
    let command = &received[1];
    assert_eq!(hex::encode(body(command)), "2f4c55252c40");
    assert_eq!(command.uuid, vec![0xb0; 16]);
    match command.signature_data.as_ref().and_then(|s| s.sig_type.as_ref()) {
        Some(signature_data::SigType::AesGcmPersonalizedData(data)) => {
            assert_eq!(hex::encode(&data.tag), "69acba364338ba33b6c31f462d6cc0cc");
            assert_eq!(data.counter, 1);
            assert_eq!(data.expires_at, 2655);
        }
        other => panic!("unexpected signature {other:?}"),
    }

    let accepted = client.vehicle.accepted().await;
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].payload, payload);
    assert_eq!(accepted[0].signature_type, SignatureType::AesGcmPersonalized);
    assert_eq!(body(&response), payload.as_slice());
    assert_eq!(response.request_uuid, vec![0xb0; 16]);
}

#[tokio::test]
async fn test_hmac_command_sends_plaintext() {
    let client = TestClient::new();
    let car = client.orchestrator();

    car.issue_command(Domain::VehicleSecurity, b"unlock", SignatureType::HmacPersonalized, 15)
        .await
        .unwrap();

    let accepted = client.vehicle.accepted().await;
    assert_eq!(accepted[0].signature_type, SignatureType::HmacPersonalized);
    assert_eq!(accepted[0].payload, b"unlock");
    assert_eq!(accepted[0].domain, Domain::VehicleSecurity);
    let received = client.vehicle.received().await;
    assert_eq!(body(&received[1]), b"unlock");
}

#[tokio::test]
async fn test_send_command_uses_context_defaults() {
    let client = TestClient::new();
    let car = client.orchestrator();

    car.send_command(Domain::Infotainment, b"honk").await.unwrap();

    let accepted = client.vehicle.accepted().await;
    assert_eq!(accepted[0].signature_type, SignatureType::AesGcmPersonalized);
    let received = client.vehicle.received().await;
    match received[1].signature_data.as_ref().and_then(|s| s.sig_type.as_ref()) {
        Some(signature_data::SigType::AesGcmPersonalizedData(data)) => {
            assert_eq!(data.expires_at, 2650 + 15);
        }
        other => panic!("unexpected signature {other:?}"),
    }
}

#[tokio::test]
async fn test_counters_advance_per_domain() {
    let client = TestClient::new();
    let car = client.orchestrator();

    for _ in 0..3 {
        car.send_command(Domain::Infotainment, b"media").await.unwrap();
    }
    car.send_command(Domain::VehicleSecurity, b"lock").await.unwrap();

    assert_eq!(car.session_counter(Domain::Infotainment).await, Some(3));
    assert_eq!(car.session_counter(Domain::VehicleSecurity).await, Some(1));
    assert_eq!(client.vehicle.counter(Domain::Infotainment).await, Some(3));
    assert_eq!(client.vehicle.handshake_count().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commands_never_share_a_counter() {
    let client = TestClient::new();
    let car = Arc::new(client.orchestrator());

    let mut tasks = Vec::new();
    for i in 0..12u8 {
        let car = car.clone();
        let domain = if i % 3 == 0 {
            Domain::VehicleSecurity
        } else {
            Domain::Infotainment
        };
        tasks.push(tokio::spawn(async move {
            car.send_command(domain, &[i]).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let accepted = client.vehicle.accepted().await;
    assert_eq!(accepted.len(), 12);
    for (domain, expected) in [(Domain::Infotainment, 8u32), (Domain::VehicleSecurity, 4)] {
        let mut counters: Vec<u32> = accepted
            .iter()
            .filter(|c| c.domain == domain)
            .map(|c| c.counter)
            .collect();
        counters.sort_unstable();
        assert_eq!(counters, (1..=expected).collect::<Vec<_>>());
    }
    // One handshake per domain even though every task raced to start one
    assert_eq!(client.vehicle.handshake_count().await, 2);
}

#[tokio::test]
async fn test_invalidate_forces_new_handshake() {
    let client = TestClient::new();
    let car = client.orchestrator();

    car.send_command(Domain::Infotainment, b"one").await.unwrap();
    car.invalidate_session(Domain::Infotainment).await.unwrap();
    assert_eq!(car.session_phase(Domain::Infotainment).await, SessionPhase::NoSession);

    car.send_command(Domain::Infotainment, b"two").await.unwrap();
    assert_eq!(client.vehicle.handshake_count().await, 2);
    let counters: Vec<u32> = client.vehicle.accepted().await.iter().map(|c| c.counter).collect();
    assert_eq!(counters, vec![1, 2]);
}

#[tokio::test]
async fn test_unpaired_key_is_reported() {
    let client = TestClient::builder()
        .vehicle(SimulatedVehicle::new().unpaired())
        .build();
    let car = client.orchestrator();

    let err = car.start_session(Domain::Infotainment).await.unwrap_err();
    assert_matches!(err, VehicleError::Handshake(HandshakeError::KeyNotPaired));
    assert_eq!(car.session_phase(Domain::Infotainment).await, SessionPhase::NoSession);
}

#[tokio::test]
async fn test_stranger_key_is_not_paired() {
    let client = TestClient::builder().key_pair(stranger_key_pair()).build();
    let car = client.orchestrator();

    let err = car.send_command(Domain::VehicleSecurity, b"lock").await.unwrap_err();
    assert_matches!(err, VehicleError::Handshake(HandshakeError::KeyNotPaired));
    assert!(client.vehicle.accepted().await.is_empty());
}

#[tokio::test]
async fn test_session_info_for_another_vin_is_rejected() {
    let client = TestClient::new();
    let car = Vehicle::new("other", "5YJ3E1EA7KF999999", client.context.clone());

    let err = car.start_session(Domain::Infotainment).await.unwrap_err();
    assert_matches!(err, VehicleError::Handshake(HandshakeError::InvalidSessionInfoTag));
    assert_eq!(car.session_counter(Domain::Infotainment).await, None);
}

#[tokio::test]
async fn test_broadcast_commands_are_refused() {
    let client = TestClient::new();
    let car = client.orchestrator();

    let err = car.send_command(Domain::Broadcast, b"ping").await.unwrap_err();
    assert_matches!(err, VehicleError::NoSession { domain: Domain::Broadcast });
    assert!(client.vehicle.received().await.is_empty());
}

#[tokio::test]
async fn test_registry_vehicles_share_context_but_not_sessions() {
    let client = TestClient::new();
    let registry = client.registry();

    let first = registry.ensure_vehicle("car", vcmd_testkit::TEST_VIN).await;
    first.start_session(Domain::Infotainment).await.unwrap();

    let replaced = registry.override_vehicle("car", vcmd_testkit::TEST_VIN).await;
    assert_eq!(replaced.session_phase(Domain::Infotainment).await, SessionPhase::NoSession);
    assert_eq!(first.session_phase(Domain::Infotainment).await, SessionPhase::Established);

    let looked_up = registry.get_vehicle("car").await.unwrap();
    assert!(Arc::ptr_eq(&looked_up, &replaced));
    assert_eq!(registry.count().await, 1);
}
