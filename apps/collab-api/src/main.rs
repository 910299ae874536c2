use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collab_api::auth::directory::{HttpUserDirectory, UserDirectory};
use collab_api::config::Config;
use collab_api::gateway::rooms::RoomRegistry;
use collab_api::review::{HttpReviewEngine, ReviewEngine, ReviewTracker};
use collab_api::session::SessionPersister;
use collab_api::store::{KeyValueStore, MemoryStore};
use collab_api::AppState;
use tandem_common::SnowflakeGenerator;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // In-memory KV store for now. Replace with RedisStore when Redis is added.
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let directory: Arc<dyn UserDirectory> = Arc::new(HttpUserDirectory::new(&config.identity_url));
    let engine: Arc<dyn ReviewEngine> = Arc::new(HttpReviewEngine::new(&config));

    tracing::info!(identity_url = %config.identity_url, llm_model = %config.llm_model, "collab-api configured");

    let state = AppState {
        kv: kv.clone(),
        directory,
        engine,
        config: Arc::new(config),
        rooms: Arc::new(RoomRegistry::new()),
        reviews: Arc::new(ReviewTracker::new()),
        sessions: Arc::new(SessionPersister::new(kv)),
        snowflake: Arc::new(SnowflakeGenerator::new(0)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(collab_api::gateway::server::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "collab-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
