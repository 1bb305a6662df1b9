use crate::jid::Jid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type MessageId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Chat,
    Normal,
    Groupchat,
    Headline,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub from: Option<Jid>,
    pub to: Jid,
    pub kind: MessageType,
    pub body: String,
    pub thread: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A one-to-one chat message stamped with the current time.
    pub fn chat(id: MessageId, to: Jid, body: &str) -> Self {
        Self {
            id,
            from: None,
            to,
            kind: MessageType::Chat,
            body: body.to_string(),
            thread: None,
            timestamp: Utc::now(),
        }
    }
}
