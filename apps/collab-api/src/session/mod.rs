//! Per-user editor-layout persistence.

pub mod persister;

pub use persister::SessionPersister;

use serde::{Deserialize, Serialize};

/// A single open editor tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabDescriptor {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub unsaved: bool,
}

/// Editor-layout snapshot persisted per (user, project).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub open_tabs: Vec<TabDescriptor>,
    #[serde(default)]
    pub active_tab_id: Option<String>,
    #[serde(default)]
    pub sidebar_collapsed: bool,
    #[serde(default)]
    pub sidebar_width: u32,
}
