//! Connection-open authentication: token verification + identity lookup.

pub mod directory;
pub mod tokens;

use crate::error::AuthFailure;
use directory::UserDirectory;

/// Authenticated identity attached to a connection for its lifetime.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Verify a bearer token and resolve it to a user identity.
///
/// Runs exactly once per connection, at open time, before any room/job
/// operation is accepted.
pub async fn authenticate(
    secret: &str,
    directory: &dyn UserDirectory,
    token: &str,
) -> Result<Identity, AuthFailure> {
    let claims = tokens::verify_token(secret, token)?;

    let profile = directory
        .find_user(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!(?e, user_id = %claims.sub, "identity lookup failed");
            AuthFailure::LookupFailed
        })?
        .ok_or(AuthFailure::UnknownUser)?;

    Ok(Identity {
        user_id: profile.id,
        username: profile.username,
    })
}
