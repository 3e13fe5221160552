//! End-to-end tests for the WebSocket command surface
//!
//! Each test boots a real bridge on an ephemeral port and talks to it with
//! a plain WebSocket client, the way a browser tab would.

use bridge_server::config::{ConfigStore, RuntimeConfig};
use bridge_server::server::{self, AppState, OriginPolicy};
use bridge_server::supervisor::Supervisor;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestBridge {
    port: u16,
    supervisor: Arc<Supervisor>,
    shutdown: CancellationToken,
    _config_dir: tempfile::TempDir,
}

impl TestBridge {
    /// Boot a bridge with the given origin allow-list
    async fn start(allowed_origins: Vec<String>) -> Self {
        let config_dir = tempfile::tempdir().unwrap();
        let config_store = ConfigStore::new(config_dir.path().join("config.json"));

        // A cloud project is configured so setRestaurantId can start a
        // poller; the store endpoint points at a dead local port, which the
        // poller tolerates by design.
        let runtime = RuntimeConfig {
            cloud_project_id: "demo-project".to_string(),
            ..RuntimeConfig::default()
        };
        let supervisor = Arc::new(
            Supervisor::new(config_store, runtime).with_store_base_url("http://127.0.0.1:9"),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = AppState {
            supervisor: supervisor.clone(),
            origins: Arc::new(OriginPolicy::new(allowed_origins)),
            port,
        };

        let shutdown = CancellationToken::new();
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = server::serve(listener, state, server_shutdown).await;
        });

        Self {
            port,
            supervisor,
            shutdown,
            _config_dir: config_dir,
        }
    }

    fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/", self.port)
    }

    async fn connect(&self) -> WsClient {
        let (ws, _) = tokio_tungstenite::connect_async(self.url()).await.unwrap();
        ws
    }
}

impl Drop for TestBridge {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn recv_json(ws: &mut WsClient) -> Value {
    loop {
        let message = ws
            .next()
            .await
            .expect("socket closed before a reply arrived")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn roundtrip(ws: &mut WsClient, frame: Value) -> Value {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
    recv_json(ws).await
}

#[tokio::test]
async fn ping_echoes_id() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    let reply = roundtrip(&mut ws, json!({"id": 1, "type": "ping"})).await;
    assert_eq!(reply, json!({"id": 1, "ok": true}));
}

#[tokio::test]
async fn unknown_type_is_an_error() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    let reply = roundtrip(&mut ws, json!({"id": 9, "type": "makeCoffee"})).await;
    assert_eq!(reply, json!({"id": 9, "ok": false, "error": "unknown type"}));
}

#[tokio::test]
async fn bad_frames_are_dropped_without_disconnect() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    // None of these deserve a reply: not JSON, no id, string id, float id
    ws.send(Message::Text("not json at all".into()))
        .await
        .unwrap();
    ws.send(Message::Text(json!({"type": "ping"}).to_string().into()))
        .await
        .unwrap();
    ws.send(Message::Text(
        json!({"id": "1", "type": "ping"}).to_string().into(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text(
        json!({"id": 1.5, "type": "ping"}).to_string().into(),
    ))
    .await
    .unwrap();

    // The socket is still alive and the next valid command replies first
    let reply = roundtrip(&mut ws, json!({"id": 2, "type": "ping"})).await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["ok"], true);
}

#[tokio::test]
async fn missing_type_with_valid_id_gets_an_error_reply() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    let reply = roundtrip(&mut ws, json!({"id": 4})).await;
    assert_eq!(reply["id"], 4);
    assert_eq!(reply["ok"], false);
}

#[tokio::test]
async fn print_raw_tcp_delivers_bytes() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    let printer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let printer_port = printer.local_addr().unwrap().port();
    let capture = tokio::spawn(async move {
        let (mut socket, _) = printer.accept().await.unwrap();
        let mut received = Vec::new();
        socket.read_to_end(&mut received).await.unwrap();
        received
    });

    let reply = roundtrip(
        &mut ws,
        json!({
            "id": 2,
            "type": "printRawTcp",
            "ip": "127.0.0.1",
            "port": printer_port,
            "dataB64": "SGk=",
        }),
    )
    .await;

    assert_eq!(reply, json!({"id": 2, "ok": true}));
    assert_eq!(capture.await.unwrap(), b"Hi");
}

#[tokio::test]
async fn print_raw_tcp_validates_input() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    let reply = roundtrip(
        &mut ws,
        json!({"id": 1, "type": "printRawTcp", "dataB64": "SGk="}),
    )
    .await;
    assert_eq!(reply["error"], "ip is required");

    let reply = roundtrip(
        &mut ws,
        json!({"id": 2, "type": "printRawTcp", "ip": "127.0.0.1"}),
    )
    .await;
    assert_eq!(reply["error"], "dataB64 is required");

    let reply = roundtrip(
        &mut ws,
        json!({"id": 3, "type": "printRawTcp", "ip": "127.0.0.1", "dataB64": "!!"}),
    )
    .await;
    assert_eq!(reply["error"], "invalid base64 in dataB64");
}

#[tokio::test]
async fn get_info_reports_address_and_port() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    let reply = roundtrip(&mut ws, json!({"id": 11, "type": "getInfo"})).await;
    assert_eq!(reply["ok"], true);
    assert_eq!(reply["port"], bridge.port);
    assert!(reply["localIp"].is_string());
    // No restaurant configured yet
    assert!(reply.get("restaurantId").is_none());
}

#[tokio::test]
async fn set_restaurant_id_requires_a_value() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    let reply = roundtrip(
        &mut ws,
        json!({"id": 5, "type": "setRestaurantId", "restaurantId": ""}),
    )
    .await;
    assert_eq!(
        reply,
        json!({"id": 5, "ok": false, "error": "restaurantId is required"})
    );
    // The rejected command must leave the cloud poller alone
    assert!(!bridge.supervisor.cloud_active().await);
}

#[tokio::test]
async fn set_restaurant_id_starts_poller_and_clear_config_stops_it() {
    let bridge = TestBridge::start(vec![]).await;
    let mut ws = bridge.connect().await;

    assert!(!bridge.supervisor.cloud_active().await);

    let reply = roundtrip(
        &mut ws,
        json!({
            "id": 6,
            "type": "setRestaurantId",
            "restaurantId": "rest-42",
            "deviceName": "Front Counter",
        }),
    )
    .await;
    assert_eq!(reply, json!({"id": 6, "ok": true}));
    assert!(bridge.supervisor.cloud_active().await);

    // The binding survives in getInfo
    let info = roundtrip(&mut ws, json!({"id": 7, "type": "getInfo"})).await;
    assert_eq!(info["restaurantId"], "rest-42");
    assert_eq!(info["deviceName"], "Front Counter");

    let reply = roundtrip(&mut ws, json!({"id": 8, "type": "clearConfig"})).await;
    assert_eq!(reply, json!({"id": 8, "ok": true}));
    assert!(!bridge.supervisor.cloud_active().await);
}

#[tokio::test]
async fn disallowed_origin_is_rejected_with_403() {
    let bridge = TestBridge::start(vec!["https://pos.example.com".to_string()]).await;

    let mut request = bridge.url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Origin", "https://evil.example".parse().unwrap());

    match tokio_tungstenite::connect_async(request).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 403);
        }
        other => panic!("expected HTTP 403 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn allowed_and_localhost_origins_connect() {
    let bridge = TestBridge::start(vec!["https://pos.example.com".to_string()]).await;

    for origin in ["https://pos.example.com", "http://localhost:5173"] {
        let mut request = bridge.url().into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Origin", origin.parse().unwrap());
        let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();

        let reply = roundtrip(&mut ws, json!({"id": 1, "type": "ping"})).await;
        assert_eq!(reply, json!({"id": 1, "ok": true}));
    }
}

#[tokio::test]
async fn plain_http_request_gets_400() {
    use tokio::io::AsyncWriteExt;

    let bridge = TestBridge::start(vec![]).await;
    let mut stream = TcpStream::connect(("127.0.0.1", bridge.port)).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(
        response.starts_with("HTTP/1.1 400"),
        "expected 400 for a non-upgrade request, got: {}",
        response.lines().next().unwrap_or("")
    );
}
