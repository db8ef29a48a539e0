use super::*;
use crate::transport::Connection;
use crate::transport::test_helpers::channel_transport;
use serde_json::json;
use tokio::time::{Duration, timeout};

fn response_text(request_id: &str, action: &str) -> String {
    json!({
        "request_id": request_id,
        "type": "response",
        "action": action,
        "success": true,
        "payload": {"action": action},
    })
    .to_string()
}

#[tokio::test]
async fn response_for_outstanding_request_is_delivered() {
    let table = CorrelationTable::new();
    let pushes = PushBuffer::new(8);
    let waiter = table.register("11").expect("register");

    assert_eq!(route_frame(&response_text("11", "login"), &table, &pushes), Route::Delivered);
    assert!(pushes.is_empty());
    assert_eq!(waiter.await.unwrap().unwrap().action, "login");
}

#[test]
fn late_response_is_buffered_as_push() {
    let table = CorrelationTable::new();
    let pushes = PushBuffer::new(8);

    assert_eq!(route_frame(&response_text("99", "get_chat"), &table, &pushes), Route::Buffered);
    let push = pushes.try_pop().expect("buffered");
    assert_eq!(push.request_id.as_deref(), Some("99"));
    assert_eq!(push.kind.as_deref(), Some("response"));
}

#[test]
fn push_with_matching_request_id_never_resolves_a_waiter() {
    let table = CorrelationTable::new();
    let pushes = PushBuffer::new(8);
    let _waiter = table.register("5").expect("register");

    let text = json!({"request_id": "5", "type": "push", "action": "incoming_chat", "payload": {}}).to_string();
    assert_eq!(route_frame(&text, &table, &pushes), Route::Buffered);
    assert!(table.contains("5"));
    assert_eq!(pushes.len(), 1);
}

#[test]
fn ping_acknowledgements_are_discarded() {
    let table = CorrelationTable::new();
    let pushes = PushBuffer::new(8);

    let ack = json!({"action": "ping", "type": "response", "success": true, "payload": {}}).to_string();
    assert_eq!(route_frame(&ack, &table, &pushes), Route::Discarded);
    assert_eq!(route_frame(&response_text("404", "ping"), &table, &pushes), Route::Discarded);
    assert!(pushes.is_empty());
}

#[test]
fn malformed_frame_is_dropped() {
    let table = CorrelationTable::new();
    let pushes = PushBuffer::new(8);
    assert_eq!(route_frame("{oops", &table, &pushes), Route::Malformed);
    assert!(pushes.is_empty());
}

#[tokio::test]
async fn loop_survives_malformed_frames_and_keeps_routing() {
    let (Connection { source, .. }, server) = channel_transport();
    let table = CorrelationTable::new();
    let pushes = Arc::new(PushBuffer::new(8));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let _handle = spawn_dispatcher(source, table.clone(), pushes.clone(), shutdown_rx);

    let waiter = table.register("1").expect("register");
    server.push_text("not json at all");
    server.push_text(response_text("1", "a"));

    let resolved = timeout(Duration::from_secs(1), waiter).await.expect("resolution timed out");
    assert_eq!(resolved.unwrap().unwrap().action, "a");
}

#[tokio::test]
async fn read_failure_fails_outstanding_requests_and_closes_pushes() {
    let (Connection { source, .. }, server) = channel_transport();
    let table = CorrelationTable::new();
    let pushes = Arc::new(PushBuffer::new(8));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_dispatcher(source, table.clone(), pushes.clone(), shutdown_rx);

    let waiter = table.register("1").expect("register");
    let _ = server.inbound.send(Err(TransportError::Other("reset by peer".into())));

    let exit = timeout(Duration::from_secs(1), handle).await.expect("exit timed out").expect("join");
    assert!(matches!(exit, DispatchExit::ReadFailed(_)));
    assert_eq!(waiter.await.unwrap().unwrap_err(), SendError::ConnectionClosed);
    assert!(table.is_closed());
    assert!(pushes.is_closed());
}

#[tokio::test]
async fn peer_close_ends_loop() {
    let (Connection { source, .. }, server) = channel_transport();
    let table = CorrelationTable::new();
    let pushes = Arc::new(PushBuffer::new(8));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_dispatcher(source, table.clone(), pushes, shutdown_rx);

    drop(server);
    let exit = timeout(Duration::from_secs(1), handle).await.expect("exit timed out").expect("join");
    assert!(matches!(exit, DispatchExit::PeerClosed));
    assert!(table.is_closed());
}

#[tokio::test]
async fn shutdown_signal_stops_loop() {
    let (Connection { source, .. }, _server) = channel_transport();
    let table = CorrelationTable::new();
    let pushes = Arc::new(PushBuffer::new(8));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_dispatcher(source, table, pushes, shutdown_rx);

    shutdown_tx.send_replace(true);
    let exit = timeout(Duration::from_secs(1), handle).await.expect("exit timed out").expect("join");
    assert!(matches!(exit, DispatchExit::Shutdown));
}
