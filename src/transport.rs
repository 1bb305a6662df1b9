//! Boundary to the protocol library.
//!
//! The session core never touches sockets, TLS or stanza encoding. It drives a
//! connection through [`XmppConnection`] and learns about lifecycle changes
//! from the ordered [`ConnectionEvent`] stream handed back by
//! [`TransportFactory::connect`].

use async_trait::async_trait;
use influcore::jid::BareJid;
use influcore::types::archive::{ArchiveQuery, ArchivedMessage};
use influcore::types::message::ChatMessage;
use influcore::types::presence::Presence;
use influcore::types::roster::RosterEntry;
use influcore::types::vcard::VCard;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("no response from server")]
    NoResponse,
    #[error("timed out")]
    Timeout,
    #[error("server returned error condition `{condition}`")]
    Protocol { condition: String },
    #[error("operation interrupted")]
    Interrupted,
    #[error("I/O error: {0}")]
    Io(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Lifecycle and inbound traffic reported by the transport, in wire order.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected,
    Authenticated { resumed: bool },
    ConnectionClosed,
    ConnectionClosedOnError(String),
    Message(ChatMessage),
    Presence(Presence),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub domain: String,
    pub host: String,
    pub resource: String,
    pub require_tls: bool,
    pub compression: bool,
    pub connect_timeout: Duration,
}

/// A live stream to the server.
#[async_trait]
pub trait XmppConnection: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<(), TransportError>;

    async fn send_message(&self, message: &ChatMessage) -> Result<(), TransportError>;

    async fn send_presence(&self, presence: &Presence) -> Result<(), TransportError>;

    async fn fetch_roster(&self) -> Result<Vec<RosterEntry>, TransportError>;

    async fn load_vcard(&self, jid: &BareJid) -> Result<VCard, TransportError>;

    /// Whether the server advertises message archive management.
    async fn supports_archive(&self) -> Result<bool, TransportError>;

    /// Sets the archiving default so every message is archived.
    async fn enable_archiving(&self) -> Result<(), TransportError>;

    async fn query_archive(
        &self,
        query: &ArchiveQuery,
    ) -> Result<Vec<ArchivedMessage>, TransportError>;

    /// Closes the stream. Must be safe to call more than once.
    async fn disconnect(&self);
}

/// Opens new connections. The returned receiver yields [`ConnectionEvent::Connected`]
/// first; the transport keeps sending on it until the stream is gone.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<(Arc<dyn XmppConnection>, mpsc::Receiver<ConnectionEvent>), TransportError>;
}
