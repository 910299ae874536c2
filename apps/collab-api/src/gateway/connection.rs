//! Per-connection state for a gateway channel.

use tandem_common::id::{prefix, prefixed_ulid};

use crate::auth::Identity;
use crate::gateway::events::UserRef;

/// State for a single channel connection.
///
/// `identity` is `None` for a connection admitted without a token; every
/// operation on such a connection fails with `Unauthorized` while the socket
/// itself stays open.
pub struct Connection {
    pub conn_id: String,
    pub identity: Option<Identity>,
}

impl Connection {
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            conn_id: prefixed_ulid(prefix::CONNECTION),
            identity,
        }
    }

    pub fn user_ref(&self) -> Option<UserRef> {
        self.identity.as_ref().map(|identity| UserRef {
            id: identity.user_id.clone(),
            username: identity.username.clone(),
        })
    }
}
