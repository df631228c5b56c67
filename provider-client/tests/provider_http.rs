//! Integration tests for the provider client against a fake HTTP provider

use std::time::Duration;

use provider_client::{Action, ClientError, HealthProbe, JishiClient, SnapshotSource};

fn client_for(server: &mockito::Server) -> JishiClient {
    JishiClient::new(&server.url(), Duration::from_secs(5)).unwrap()
}

const ZONES: &str = r#"[
    {
        "uuid": "RINCON_A",
        "coordinator": {
            "uuid": "RINCON_A",
            "roomName": "Living Room",
            "state": { "volume": 20, "mute": false, "playbackState": "PLAYING" }
        },
        "members": [
            { "uuid": "RINCON_A", "roomName": "Living Room" },
            { "uuid": "RINCON_B", "roomName": "Kitchen" }
        ]
    },
    42,
    { "coordinator": { "uuid": "RINCON_C", "roomName": "Office" }, "members": [] }
]"#;

#[test]
fn test_zones_are_decoded_individually() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/zones")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(ZONES)
        .create();

    let client = client_for(&server);
    let zones = SnapshotSource::zones(&client).unwrap();

    mock.assert();
    assert_eq!(zones.len(), 3);
    assert_eq!(zones[0].uuid.as_deref(), Some("RINCON_A"));
    assert_eq!(zones[0].members.len(), 2);
    // The bare number decodes to an empty descriptor rather than failing the batch
    assert!(zones[1].uuid.is_none() && zones[1].coordinator.is_none());
    // Missing uuid is preserved as-is for the synchronizer to drop
    assert!(zones[2].uuid.is_none());
}

#[test]
fn test_zones_non_200_is_status_error() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/zones")
        .with_status(503)
        .with_body("starting up")
        .create();

    let client = client_for(&server);
    match client.zones() {
        Err(ClientError::Status { code, body }) => {
            assert_eq!(code, 503);
            assert_eq!(body, "starting up");
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[test]
fn test_zones_invalid_json_is_parse_error() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/zones")
        .with_status(200)
        .with_body("<html>")
        .create();

    let client = client_for(&server);
    assert!(matches!(client.zones(), Err(ClientError::Parse(_))));
}

#[test]
fn test_send_command_encodes_path() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/Living%20Room/volume/35")
        .with_status(200)
        .with_body(r#"{"status":"success"}"#)
        .create();

    let client = client_for(&server);
    let response = client.send("Living Room", &Action::Volume(35)).unwrap();

    mock.assert();
    assert_eq!(response.status, 200);
    assert!(response.body.contains("success"));
}

#[test]
fn test_join_command() {
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/Kitchen/join/Living%20Room")
        .with_status(200)
        .with_body("{}")
        .create();

    let client = client_for(&server);
    client
        .send("Kitchen", &Action::Join("Living Room".to_string()))
        .unwrap();
    mock.assert();
}

#[test]
fn test_command_failure_carries_body() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/Garage/play")
        .with_status(500)
        .with_body(r#"{"status":"error","error":"Got status 500 when invoking /MediaRenderer/AVTransport/Control"}"#)
        .create();

    let client = client_for(&server);
    let err = client.send("Garage", &Action::Play).unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert!(err.to_string().contains("AVTransport"));
}

#[test]
fn test_device_state() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/Living%20Room/state")
        .with_status(200)
        .with_body(r#"{"volume": 31, "mute": true, "currentTrack": {"uri": "x-sonos-htastream:RINCON_A:spdif"}}"#)
        .create();

    let client = client_for(&server);
    let state = client.device_state("Living Room").unwrap();
    assert_eq!(state.volume, Some(31));
    assert_eq!(state.mute, Some(true));
    assert!(state.current_track.unwrap().is_line_in());
}

#[test]
fn test_probe() {
    let mut server = mockito::Server::new();
    server.mock("GET", "/zones").with_status(200).with_body("[]").create();

    let client = client_for(&server);
    assert!(client.probe());
    assert!(HealthProbe::probe(&client));
}

#[test]
fn test_unreachable_provider() {
    // Nothing listens on port 1 of the loopback interface
    let client = JishiClient::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
    let err = client.zones().unwrap_err();
    assert!(err.is_unreachable(), "expected unreachable, got {:?}", err);
    assert!(!client.probe());
}
