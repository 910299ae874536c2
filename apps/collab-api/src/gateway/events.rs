//! Wire-format messages for the three gateway channels.
//!
//! Inbound messages deserialize into one closed enum per channel; an unknown
//! `event` tag or malformed payload surfaces as a `PROTOCOL_ERROR` event
//! rather than being silently ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionSnapshot;

// ---------------------------------------------------------------------------
// Shared payload types
// ---------------------------------------------------------------------------

/// A user as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRange {
    pub start: CursorPosition,
    pub end: CursorPosition,
}

// ---------------------------------------------------------------------------
// Collaboration channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTarget {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMovePayload {
    pub room_id: String,
    pub position: CursorPosition,
    #[serde(default)]
    pub selection: Option<SelectionRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChangePayload {
    pub room_id: String,
    /// Opaque CRDT update fragments; never interpreted by the server.
    pub changes: Vec<Value>,
    /// Accepted and echoed verbatim; carries no server-side semantics.
    #[serde(default)]
    pub version_id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendPayload {
    pub room_id: String,
    pub message: String,
}

/// Client → server messages on the collaboration channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum CollabRequest {
    #[serde(rename = "join-room")]
    JoinRoom(RoomTarget),
    #[serde(rename = "leave-room")]
    LeaveRoom(RoomTarget),
    #[serde(rename = "cursor-move")]
    CursorMove(CursorMovePayload),
    #[serde(rename = "text-change")]
    TextChange(TextChangePayload),
    #[serde(rename = "chat-message")]
    ChatMessage(ChatSendPayload),
}

/// Server → client messages on the collaboration channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum CollabEvent {
    #[serde(rename = "auth:success")]
    AuthSuccess { user: UserRef },
    #[serde(rename = "auth:error")]
    AuthError { message: String },
    #[serde(rename = "user-joined")]
    UserJoined { user: UserRef, users: Vec<UserRef> },
    #[serde(rename = "user-left")]
    UserLeft { user: UserRef, users: Vec<UserRef> },
    #[serde(rename = "cursor-moved", rename_all = "camelCase")]
    CursorMoved {
        user_id: String,
        username: String,
        position: CursorPosition,
        #[serde(skip_serializing_if = "Option::is_none")]
        selection: Option<SelectionRange>,
    },
    #[serde(rename = "text-changed", rename_all = "camelCase")]
    TextChanged {
        user_id: String,
        username: String,
        changes: Vec<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        version_id: Option<Value>,
    },
    #[serde(rename = "chat-message", rename_all = "camelCase")]
    Chat {
        id: String,
        user_id: String,
        username: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

// ---------------------------------------------------------------------------
// Analysis-job channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStartPayload {
    pub request_id: String,
    pub project_id: String,
    pub code: String,
    pub language: String,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCancelPayload {
    pub request_id: String,
}

/// Client → server messages on the analysis-job channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ReviewRequest {
    #[serde(rename = "review:start")]
    Start(ReviewStartPayload),
    #[serde(rename = "review:cancel")]
    Cancel(ReviewCancelPayload),
}

/// Server → client messages on the analysis-job channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ReviewEvent {
    #[serde(rename = "auth:success")]
    AuthSuccess { user: UserRef },
    #[serde(rename = "auth:error")]
    AuthError { message: String },
    #[serde(rename = "review:progress", rename_all = "camelCase")]
    Progress {
        request_id: String,
        stage: String,
        message: String,
        progress: u8,
    },
    #[serde(rename = "review:completed", rename_all = "camelCase")]
    Completed {
        request_id: String,
        result: String,
        progress: u8,
    },
    #[serde(rename = "review:error", rename_all = "camelCase")]
    ReviewError { request_id: String, message: String },
    #[serde(rename = "review:cancelled", rename_all = "camelCase")]
    Cancelled { request_id: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

// ---------------------------------------------------------------------------
// Session channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTarget {
    pub project_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdatePayload {
    pub project_id: String,
    pub session: SessionSnapshot,
}

/// Client → server messages on the session channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionRequest {
    #[serde(rename = "session:get")]
    Get(ProjectTarget),
    #[serde(rename = "session:update")]
    Update(SessionUpdatePayload),
    #[serde(rename = "session:extend")]
    Extend(ProjectTarget),
    #[serde(rename = "session:delete")]
    Delete(ProjectTarget),
}

/// Server → client messages on the session channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    #[serde(rename = "auth:success")]
    AuthSuccess { user: UserRef },
    #[serde(rename = "auth:error")]
    AuthError { message: String },
    #[serde(rename = "session:data", rename_all = "camelCase")]
    Data {
        project_id: String,
        /// `null` when absent or expired.
        session: Option<SessionSnapshot>,
    },
    #[serde(rename = "session:saved", rename_all = "camelCase")]
    Saved { project_id: String },
    #[serde(rename = "session:extended", rename_all = "camelCase")]
    Extended { project_id: String },
    #[serde(rename = "session:deleted", rename_all = "camelCase")]
    Deleted { project_id: String },
    #[serde(rename = "session:error")]
    SessionError { message: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}
