//! Robustness tests for the rating server.
//!
//! These tests verify the server handles edge cases and error conditions
//! gracefully:
//! - Malformed and oversized frames
//! - Rapid connect/disconnect
//! - Clients that never read
//! - Store failures
//!
//! Tests CAN use `.unwrap()` and `.expect()`. We test the panic-free
//! behavior of production code through assertions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pixrated::config::ServerConfig;
use pixrated::registry::{spawn_registry, RegistryHandle};
use pixrated::server::RatingServer;
use pixrated::store::MemoryRatingStore;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    store: Arc<MemoryRatingStore>,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn(config: ServerConfig) -> Self {
        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();
        let store = Arc::new(MemoryRatingStore::new());
        let server = RatingServer::new(
            config,
            registry.clone(),
            Arc::clone(&store) as _,
            cancel_token.clone(),
        );

        let listener = server.bind().await.expect("bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            addr,
            registry,
            store,
            cancel_token,
        }
    }

    fn config() -> ServerConfig {
        ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            pics_dir: std::env::temp_dir().join("pixrate-robustness-no-pics"),
            ..ServerConfig::default()
        }
    }

    async fn connect(&self) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
        let (mut ws, _) = connect_async(format!("ws://{}", self.addr))
            .await
            .expect("websocket connect");
        let file_list = recv_json(&mut ws).await;
        assert_eq!(file_list["type"], "file_list");
        ws
    }

    async fn wait_for_size(&self, expected: usize) {
        let start = Instant::now();
        while start.elapsed() < RECV_TIMEOUT {
            if self.registry.size().await == expected {
                return;
            }
            sleep(POLL_INTERVAL).await;
        }
        panic!("registry size did not reach {expected}");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn recv_text(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> String {
    loop {
        let frame = timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = frame {
            return text.as_str().to_string();
        }
    }
}

async fn recv_json(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> Value {
    serde_json::from_str(&recv_text(ws).await).expect("JSON frame")
}

// ============================================================================
// Malformed Message Tests
// ============================================================================

#[tokio::test]
async fn test_malformed_json_is_echoed_as_text() {
    let server = TestServer::spawn(TestServer::config()).await;
    let mut ws = server.connect().await;

    ws.send(Message::text("{\"type\": \"image_rating\"")).await.unwrap();
    let reply = recv_text(&mut ws).await;
    assert!(reply.starts_with("Echo: {\"type\": \"image_rating\" (from "), "{reply}");
}

#[tokio::test]
async fn test_binary_frames_are_ignored() {
    let server = TestServer::spawn(TestServer::config()).await;
    let mut ws = server.connect().await;

    ws.send(Message::binary(vec![0u8, 1, 2, 3])).await.unwrap();
    ws.send(Message::text("still here")).await.unwrap();

    let reply = recv_text(&mut ws).await;
    assert!(reply.starts_with("Echo: still here"));
}

#[tokio::test]
async fn test_json_scalars_are_echoed() {
    let server = TestServer::spawn(TestServer::config()).await;
    let mut ws = server.connect().await;

    ws.send(Message::text("42")).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "echo");
    assert_eq!(reply["original_message"], json!(42));
}

#[tokio::test]
async fn test_oversized_message_rejected_session_continues() {
    let config = ServerConfig {
        max_message_size: 64,
        ..TestServer::config()
    };
    let server = TestServer::spawn(config).await;
    let mut ws = server.connect().await;

    ws.send(Message::text("x".repeat(1000))).await.unwrap();
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["type"], "error");

    ws.send(Message::text("small")).await.unwrap();
    assert!(recv_text(&mut ws).await.starts_with("Echo: small"));
}

// ============================================================================
// Connection Churn Tests
// ============================================================================

#[tokio::test]
async fn test_rapid_connect_disconnect() {
    let server = TestServer::spawn(TestServer::config()).await;

    for _ in 0..20 {
        let mut ws = server.connect().await;
        let _ = ws.close(None).await;
    }

    server.wait_for_size(0).await;

    let mut ws = server.connect().await;
    ws.send(Message::text("{}")).await.unwrap();
    assert_eq!(recv_json(&mut ws).await["type"], "echo");
}

#[tokio::test]
async fn test_stalled_reader_does_not_block_others() {
    let config = ServerConfig {
        outbound_capacity: 2,
        ..TestServer::config()
    };
    let server = TestServer::spawn(config).await;

    // Never reads after the file list
    let _stalled = server.connect().await;
    let mut sender = server.connect().await;
    let mut watcher = server.connect().await;
    server.wait_for_size(3).await;

    for i in 0..20 {
        let msg = json!({
            "type": "image_rating",
            "image_filename": format!("img{i}.png"),
            "rating": 3,
        });
        sender.send(Message::text(msg.to_string())).await.unwrap();

        let saved = loop {
            let value = recv_json(&mut sender).await;
            if value["type"] == "rating_saved" {
                break value;
            }
        };
        assert_eq!(saved["success"], true);

        let update = recv_json(&mut watcher).await;
        assert_eq!(update["type"], "rating_feed_update");
        assert_eq!(update["image_filename"], format!("img{i}.png"));
    }
}

// ============================================================================
// Store Failure Tests
// ============================================================================

#[tokio::test]
async fn test_store_failure_reports_unsuccessful_save() {
    let server = TestServer::spawn(TestServer::config()).await;
    server.store.set_fail_writes(true);

    let mut sender = server.connect().await;
    let mut watcher = server.connect().await;
    server.wait_for_size(2).await;

    let msg = json!({"type": "image_rating", "image_filename": "a.png", "rating": 5});
    sender.send(Message::text(msg.to_string())).await.unwrap();

    let reply = recv_json(&mut sender).await;
    assert_eq!(reply["type"], "rating_saved");
    assert_eq!(reply["success"], false);

    // Session keeps working once the store recovers
    server.store.set_fail_writes(false);
    sender.send(Message::text(msg.to_string())).await.unwrap();
    assert_eq!(recv_json(&mut sender).await["success"], true);

    let update = recv_json(&mut watcher).await;
    assert_eq!(update["type"], "rating_feed_update");
    assert_eq!(update["total_ratings"], 1);
}
