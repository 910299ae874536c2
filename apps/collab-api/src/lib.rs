pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod review;
pub mod session;
pub mod store;

use std::sync::Arc;

use auth::directory::UserDirectory;
use config::Config;
use gateway::rooms::RoomRegistry;
use review::engine::ReviewEngine;
use review::tracker::ReviewTracker;
use session::SessionPersister;
use store::KeyValueStore;
use tandem_common::SnowflakeGenerator;

/// Shared application state available to all gateway handlers.
#[derive(Clone)]
pub struct AppState {
    pub kv: Arc<dyn KeyValueStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub engine: Arc<dyn ReviewEngine>,
    pub config: Arc<Config>,
    pub rooms: Arc<RoomRegistry>,
    pub reviews: Arc<ReviewTracker>,
    pub sessions: Arc<SessionPersister>,
    pub snowflake: Arc<SnowflakeGenerator>,
}
