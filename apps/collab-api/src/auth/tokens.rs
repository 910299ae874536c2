//! Editor access token (HS256 JWT) verification.
//!
//! Tokens are issued by the external identity service; this core only
//! verifies signature and expiry.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AuthFailure;

/// Claims carried by an editor access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User id the token was issued for.
    pub sub: String,
    pub exp: i64,
}

/// Validate a bearer token and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<TokenClaims, AuthFailure> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);

    let token_data = jsonwebtoken::decode::<TokenClaims>(token, &key, &validation).map_err(|e| {
        tracing::debug!(?e, "token validation failed");
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AuthFailure::InvalidToken("Token expired")
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                AuthFailure::InvalidToken("Bad token signature")
            }
            _ => AuthFailure::InvalidToken("Invalid token"),
        }
    })?;

    Ok(token_data.claims)
}

/// Sign a token for tests (the real issuer lives in the identity service).
#[cfg(test)]
pub(crate) fn mint_token(secret: &str, user_id: &str, ttl_secs: i64) -> String {
    let claims = TokenClaims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("sign test token")
}
