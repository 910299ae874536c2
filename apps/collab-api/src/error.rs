use std::fmt;

/// Machine-readable codes carried on wire `error` events.
pub mod code {
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const STORE_ERROR: &str = "STORE_ERROR";
}

/// Why connection-open authentication failed. Every variant is fatal for the
/// connection: an `auth:error` event is sent and the socket is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Token malformed, expired, or carrying a bad signature.
    InvalidToken(&'static str),
    /// Token verified but the referenced user no longer exists.
    UnknownUser,
    /// The identity directory could not be reached.
    LookupFailed,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::InvalidToken(reason) => reason,
            AuthFailure::UnknownUser => "User not found",
            AuthFailure::LookupFailed => "Identity lookup failed",
        }
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Failure talking to the backing TTL store.
#[derive(Debug)]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

/// Failure from the external analysis backend.
#[derive(Debug)]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
