//! External identity lookup.
//!
//! The user store lives in a separate service; this module only resolves a
//! verified token subject to a user profile.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;

/// A resolved user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
}

/// Failure reaching the identity service. Treated as a terminal error for
/// the connection being opened.
#[derive(Debug)]
pub struct DirectoryError(pub String);

/// Abstraction over the identity service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a user id. `Ok(None)` means the id no longer exists.
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, DirectoryError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Directory client talking to the identity service's internal user API.
#[derive(Clone)]
pub struct HttpUserDirectory {
    base_url: String,
    http: reqwest::Client,
}

impl HttpUserDirectory {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, DirectoryError> {
        let url = format!("{}/internal/users/{}", self.base_url, user_id);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError(format!("identity request failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(DirectoryError(format!(
                "identity service returned {}",
                resp.status()
            )));
        }

        let profile: UserProfile = resp
            .json()
            .await
            .map_err(|e| DirectoryError(format!("identity response parse failed: {e}")))?;

        Ok(Some(profile))
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (for tests)
// ---------------------------------------------------------------------------

pub struct MemoryDirectory {
    users: Mutex<HashMap<String, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, user_id: &str, username: &str) {
        self.users
            .lock()
            .insert(user_id.to_string(), username.to_string());
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, DirectoryError> {
        Ok(self.users.lock().get(user_id).map(|username| UserProfile {
            id: user_id.to_string(),
            username: username.clone(),
        }))
    }
}
