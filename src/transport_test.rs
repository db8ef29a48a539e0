use super::test_helpers::*;
use super::*;
use std::sync::atomic::Ordering;
use tokio::net::TcpListener;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

async fn loopback_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");
    (listener, format!("ws://{addr}/v3.5/agent/rtm/ws"))
}

#[tokio::test]
async fn ws_connector_round_trips_text_frames() {
    let (listener, url) = loopback_listener().await;
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                ws.send(Message::Text(format!("echo:{}", text.as_str()).into())).await.expect("echo");
            }
        }
    });

    let Connection { mut sink, mut source } = WsConnector.connect(&url, None).await.expect("connect");
    sink.send("hello".to_owned()).await.expect("send");
    let echoed = timeout(Duration::from_secs(2), source.recv())
        .await
        .expect("recv timed out")
        .expect("stream open")
        .expect("text frame");
    assert_eq!(echoed, "echo:hello");

    sink.close().await.expect("close");
    let _ = timeout(Duration::from_secs(2), server).await;
}

#[tokio::test]
async fn ws_connector_sends_origin_header() {
    let (listener, url) = loopback_listener().await;
    let (origin_tx, origin_rx) = tokio::sync::oneshot::channel::<Option<String>>();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            let origin = req
                .headers()
                .get(ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned);
            let _ = origin_tx.send(origin);
            Ok(resp)
        };
        let _ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.expect("handshake");
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let _conn = WsConnector.connect(&url, Some("https://my.example.test")).await.expect("connect");
    let origin = timeout(Duration::from_secs(2), origin_rx).await.expect("origin timed out").expect("sent");
    assert_eq!(origin.as_deref(), Some("https://my.example.test"));
}

#[tokio::test]
async fn ws_source_ends_when_peer_closes() {
    let (listener, url) = loopback_listener().await;
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
        ws.send(Message::Text("{\"action\":\"incoming_event\"}".into())).await.expect("push");
        ws.close(None).await.expect("close");
        while ws.next().await.is_some() {}
    });

    let Connection { sink: _sink, mut source } = WsConnector.connect(&url, None).await.expect("connect");
    let first = timeout(Duration::from_secs(2), source.recv()).await.expect("recv timed out");
    assert!(matches!(first, Some(Ok(_))));
    let end = timeout(Duration::from_secs(2), source.recv()).await.expect("recv timed out");
    assert!(end.is_none());
}

#[tokio::test]
async fn ws_connector_reports_refused_connection() {
    let (listener, url) = loopback_listener().await;
    drop(listener);

    let err = WsConnector.connect(&url, None).await.err().expect("connect should fail");
    assert!(matches!(err, ConnectionError::Transport(TransportError::WebSocket(_))));
}

#[tokio::test]
async fn ws_connector_rejects_invalid_origin() {
    let err = WsConnector
        .connect("ws://127.0.0.1:1/", Some("bad\norigin"))
        .await
        .err()
        .expect("origin should be rejected");
    assert!(matches!(err, ConnectionError::InvalidOrigin(_)));
}

#[tokio::test]
async fn channel_transport_delivers_both_directions() {
    let (Connection { mut sink, mut source }, mut server) = channel_transport();

    sink.send("out".to_owned()).await.expect("send");
    assert_eq!(server.written.recv().await.as_deref(), Some("out"));

    server.push_text("in");
    assert_eq!(source.recv().await.expect("open").expect("frame"), "in");

    server.fail_writes.store(true, Ordering::SeqCst);
    assert!(matches!(sink.send("x".to_owned()).await, Err(TransportError::Closed)));

    sink.close().await.expect("close");
    assert!(server.client_closed.load(Ordering::SeqCst));

    drop(server);
    assert!(source.recv().await.is_none());
}

#[tokio::test]
async fn channel_connector_hands_out_one_connection() {
    let (connector, _server) = ChannelConnector::new();
    assert!(connector.connect("ws://mock", None).await.is_ok());
    assert!(connector.connect("ws://mock", None).await.is_err());
}
