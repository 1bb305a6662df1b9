use crate::jid::BareJid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    #[default]
    None,
    To,
    From,
    Both,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RosterEntry {
    pub jid: BareJid,
    pub name: Option<String>,
    pub subscription: Subscription,
    /// An outgoing subscription request is still awaiting approval.
    pub pending_out: bool,
    pub groups: Vec<String>,
}

impl RosterEntry {
    pub fn new(jid: BareJid, subscription: Subscription) -> Self {
        Self {
            jid,
            name: None,
            subscription,
            pending_out: false,
            groups: Vec::new(),
        }
    }
}
