use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use collab_api::auth::directory::{MemoryDirectory, UserDirectory};
use collab_api::config::Config;
use collab_api::error::EngineError;
use collab_api::gateway::rooms::RoomRegistry;
use collab_api::review::tracker::ReviewTracker;
use collab_api::review::{ReviewEngine, ReviewInput};
use collab_api::session::SessionPersister;
use collab_api::store::{KeyValueStore, MemoryStore};
use collab_api::AppState;
use tandem_common::SnowflakeGenerator;

pub const TEST_SECRET: &str = "test-secret-do-not-use-in-production";

/// Short debounce so session tests settle quickly.
pub const TEST_DEBOUNCE: Duration = Duration::from_millis(100);

/// Engine stub that waits before answering, so cancellation can race it.
pub struct StubEngine {
    pub delay: Duration,
    pub result: String,
}

#[async_trait]
impl ReviewEngine for StubEngine {
    async fn review(&self, _input: &ReviewInput) -> Result<String, EngineError> {
        time::sleep(self.delay).await;
        Ok(self.result.clone())
    }
}

/// Build a test AppState with in-memory stores and two known users.
pub fn test_state(engine_delay: Duration) -> AppState {
    let config = Config {
        auth_secret: TEST_SECRET.to_string(),
        identity_url: "http://127.0.0.1:1".to_string(),
        llm_api_url: "http://127.0.0.1:1".to_string(),
        llm_api_key: "test-key".to_string(),
        llm_model: "test-model".to_string(),
        port: 0,
    };

    let directory = MemoryDirectory::new();
    directory.insert("usr_alice", "alice");
    directory.insert("usr_bob", "bob");

    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    AppState {
        kv: kv.clone(),
        directory: Arc::new(directory),
        engine: Arc::new(StubEngine {
            delay: engine_delay,
            result: "Looks good.".to_string(),
        }),
        config: Arc::new(config),
        rooms: Arc::new(RoomRegistry::new()),
        reviews: Arc::new(ReviewTracker::new()),
        sessions: Arc::new(SessionPersister::with_debounce(kv, TEST_DEBOUNCE)),
        snowflake: Arc::new(SnowflakeGenerator::new(0)),
    }
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_server(engine_delay: Duration) -> (SocketAddr, AppState) {
    let state = test_state(engine_delay);
    let app = collab_api::gateway::server::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

/// Mint a bearer token the gateway will accept.
pub fn mint_token(user_id: &str) -> String {
    let claims = TestClaims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::seconds(300)).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

/// Mint a token that is already past the validation leeway.
pub fn mint_expired_token(user_id: &str) -> String {
    let claims = TestClaims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() - chrono::Duration::seconds(300)).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("mint expired token")
}

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open one of the gateway channels, optionally with a token in the
/// handshake. Does not wait for the auth event.
pub async fn connect(addr: SocketAddr, channel: &str, token: Option<&str>) -> Ws {
    let url = match token {
        Some(token) => format!("ws://{addr}/gateway/{channel}?token={token}"),
        None => format!("ws://{addr}/gateway/{channel}"),
    };
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Open a channel and assert the `auth:success` greeting.
pub async fn connect_authenticated(addr: SocketAddr, channel: &str, user_id: &str) -> Ws {
    let token = mint_token(user_id);
    let mut ws = connect(addr, channel, Some(&token)).await;
    let greeting = recv_event(&mut ws).await;
    assert_eq!(greeting["event"], "auth:success");
    assert_eq!(greeting["data"]["user"]["id"], user_id);
    ws
}

/// Send one request envelope as a text frame.
pub async fn send_event(ws: &mut Ws, event: &serde_json::Value) {
    ws.send(tungstenite::Message::Text(event.to_string().into()))
        .await
        .expect("ws send");
}

/// Read the next text frame as JSON, skipping control frames.
pub async fn recv_event(ws: &mut Ws) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse event");
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got: {other:?}"),
        }
    }
}

/// Assert that nothing arrives on the socket within `window`.
pub async fn assert_silent(ws: &mut Ws, window: Duration) {
    match time::timeout(window, ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_)))) => {}
        Ok(other) => panic!("expected silence, got: {other:?}"),
    }
}
