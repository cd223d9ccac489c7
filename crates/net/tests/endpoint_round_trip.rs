//! Loopback round trip through the server and client endpoints.

use std::time::Duration;

use tandem_net::{ClientEvent, EndpointEvent, WsServer, connect_text};
use tokio::time::timeout;

const TICK: Duration = Duration::from_secs(5);

#[tokio::test]
async fn frames_flow_both_ways_and_close_is_reported_once() {
    let (server, mut events) = WsServer::bind("127.0.0.1:0".parse().unwrap(), "/test")
        .await
        .unwrap();
    let url = format!("ws://{}/test", server.local_addr());

    let (client_sender, mut client_events) = connect_text(&url).await.unwrap();

    // Server sees the connection and greets.
    let (id, server_sender) = match timeout(TICK, events.recv()).await.unwrap().unwrap() {
        EndpointEvent::Connected(id, sender) => (id, sender),
        _ => panic!("expected Connected first"),
    };
    assert_eq!(server.registry().active_count(), 1);
    assert_eq!(server.registry().high_water_mark(), 1);

    server_sender.send_text("hello".to_string()).await.unwrap();
    match timeout(TICK, client_events.recv()).await.unwrap().unwrap() {
        ClientEvent::Message(text) => assert_eq!(text, "hello"),
        other => panic!("expected message, got {:?}", other),
    }

    // Client frame reaches the server tagged with the connection id.
    client_sender.send_text("report".to_string()).await.unwrap();
    match timeout(TICK, events.recv()).await.unwrap().unwrap() {
        EndpointEvent::Message(from, text) => {
            assert_eq!(from, id);
            assert_eq!(text, "report");
        }
        _ => panic!("expected Message"),
    }

    // Close from the client side: exactly one Disconnected, counter
    // back to zero, high-water mark untouched.
    client_sender.close();
    match timeout(TICK, events.recv()).await.unwrap().unwrap() {
        EndpointEvent::Disconnected(gone) => assert_eq!(gone, id),
        _ => panic!("expected Disconnected"),
    }
    assert_eq!(server.registry().active_count(), 0);
    assert_eq!(server.registry().high_water_mark(), 1);
}

#[tokio::test]
async fn wrong_path_is_rejected() {
    let (server, _events) = WsServer::bind("127.0.0.1:0".parse().unwrap(), "/cii")
        .await
        .unwrap();
    let url = format!("ws://{}/elsewhere", server.local_addr());

    assert!(connect_text(&url).await.is_err());
}

#[tokio::test]
async fn broadcast_reaches_all_connections() {
    let (server, mut events) = WsServer::bind("127.0.0.1:0".parse().unwrap(), "/test")
        .await
        .unwrap();
    let url = format!("ws://{}/test", server.local_addr());

    let (_sender_a, mut events_a) = connect_text(&url).await.unwrap();
    let (_sender_b, mut events_b) = connect_text(&url).await.unwrap();

    // Wait for both registrations before broadcasting.
    for _ in 0..2 {
        match timeout(TICK, events.recv()).await.unwrap().unwrap() {
            EndpointEvent::Connected(..) => {}
            _ => panic!("expected Connected"),
        }
    }

    assert_eq!(server.registry().broadcast("tick"), 2);
    for events in [&mut events_a, &mut events_b] {
        match timeout(TICK, events.recv()).await.unwrap().unwrap() {
            ClientEvent::Message(text) => assert_eq!(text, "tick"),
            other => panic!("expected broadcast frame, got {:?}", other),
        }
    }
}
