use crate::jid::BareJid;
use crate::types::message::ChatMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE_SIZE: usize = 50;

/// Filter for a server-side history (MAM) lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveQuery {
    pub with: Option<BareJid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Archive id to page backwards from.
    pub before: Option<String>,
    pub max: usize,
}

impl Default for ArchiveQuery {
    fn default() -> Self {
        Self {
            with: None,
            start: None,
            end: None,
            before: None,
            max: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ArchiveQuery {
    pub fn with_peer(peer: &BareJid, max: usize) -> Self {
        Self {
            with: Some(peer.clone()),
            max,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMessage {
    pub archive_id: String,
    pub stamp: DateTime<Utc>,
    pub message: ChatMessage,
}
