use crate::jid::BareJid;
use crate::types::message::ChatMessage;
use crate::types::presence::Presence;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event);
}

impl<F> EventHandler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle_event(&self, event: &Event) {
        self(event)
    }
}

/// Synchronous fan-out of session events to every registered handler.
#[derive(Default, Clone)]
pub struct CoreEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .expect("RwLock should not be poisoned")
            .push(handler);
    }

    /// Returns true if there are any event handlers registered.
    pub fn has_handlers(&self) -> bool {
        !self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .is_empty()
    }

    pub fn dispatch(&self, event: &Event) {
        for handler in self
            .handlers
            .read()
            .expect("RwLock should not be poisoned")
            .iter()
        {
            handler.handle_event(event);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Connected;

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticationSucceeded {
    pub jid: Option<BareJid>,
    /// The server resumed an earlier stream instead of starting a new one.
    pub resumed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Disconnected {
    /// Set when the transport dropped the stream because of an error.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconnecting {
    pub attempt: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    pub from: BareJid,
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize)]
pub enum Event {
    Connected(Connected),
    AuthenticationSucceeded(AuthenticationSucceeded),
    Disconnected(Disconnected),
    Reconnecting(Reconnecting),
    Reconnected,

    Message(ChatMessage),
    Presence(Presence),
    SubscriptionRequest(SubscriptionRequest),
    RosterLoaded { entries: usize },
    RosterLoadFailed { error: String },
}
