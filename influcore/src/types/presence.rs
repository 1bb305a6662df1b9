use crate::jid::{BareJid, Jid};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceType {
    Available,
    Unavailable,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Probe,
    Error,
}

impl PresenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceType::Available => "available",
            PresenceType::Unavailable => "unavailable",
            PresenceType::Subscribe => "subscribe",
            PresenceType::Subscribed => "subscribed",
            PresenceType::Unsubscribe => "unsubscribe",
            PresenceType::Unsubscribed => "unsubscribed",
            PresenceType::Probe => "probe",
            PresenceType::Error => "error",
        }
    }
}

/// The `<show/>` element of an available presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Show {
    Chat,
    Away,
    Xa,
    Dnd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub kind: PresenceType,
    /// Sender; filled in by the server for inbound stanzas.
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub show: Option<Show>,
    pub status: Option<String>,
    pub priority: i8,
}

impl Presence {
    pub fn new(kind: PresenceType) -> Self {
        Self {
            kind,
            from: None,
            to: None,
            show: None,
            status: None,
            priority: 0,
        }
    }

    pub fn available() -> Self {
        Self::new(PresenceType::Available)
    }

    pub fn unavailable() -> Self {
        Self::new(PresenceType::Unavailable)
    }

    /// Unavailable presence attributed to `owner`, used when nothing is known.
    pub fn unavailable_from(owner: &BareJid) -> Self {
        Self {
            from: Some(owner.clone().into()),
            ..Self::unavailable()
        }
    }

    /// Approval of a subscription request sent by `to`.
    pub fn subscribed(to: &BareJid) -> Self {
        Self {
            to: Some(to.clone().into()),
            ..Self::new(PresenceType::Subscribed)
        }
    }

    pub fn is_available(&self) -> bool {
        self.kind == PresenceType::Available
    }

    pub fn owner(&self) -> Option<BareJid> {
        self.from.as_ref().map(Jid::to_bare)
    }
}
