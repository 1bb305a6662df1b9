use crate::client::Client;
use crate::transport::XmppConnection;
use influcore::jid::BareJid;
use influcore::types::archive::{ArchiveQuery, ArchivedMessage};
use log::{debug, info, warn};
use std::fmt;
use std::sync::Arc;

/// Access to the server-side message archive of the current connection.
#[derive(Clone)]
pub struct ArchiveHandle {
    connection: Arc<dyn XmppConnection>,
}

impl fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHandle").finish_non_exhaustive()
    }
}

impl ArchiveHandle {
    pub(crate) fn new(connection: Arc<dyn XmppConnection>) -> Self {
        Self { connection }
    }

    pub async fn query(&self, query: &ArchiveQuery) -> Option<Vec<ArchivedMessage>> {
        match self.connection.query_archive(query).await {
            Ok(messages) => Some(messages),
            Err(e) => {
                warn!(target: "Client", "Archive query failed: {e}");
                None
            }
        }
    }

    /// The last `max` archived messages exchanged with `peer`.
    pub async fn history_with(&self, peer: &BareJid, max: usize) -> Option<Vec<ArchivedMessage>> {
        self.query(&ArchiveQuery::with_peer(peer, max)).await
    }
}

impl Client {
    /// Enables archiving on servers that support it and keeps a handle for
    /// later queries. Leaves no handle when the feature is unavailable.
    pub(crate) async fn bind_archive(&self, connection: &Arc<dyn XmppConnection>) {
        let supported = match connection.supports_archive().await {
            Ok(supported) => supported,
            Err(e) => {
                warn!(target: "Client", "Archive discovery failed: {e}");
                false
            }
        };

        let handle = if supported {
            if let Err(e) = connection.enable_archiving().await {
                warn!(target: "Client", "Failed to enable archiving: {e}");
            } else {
                info!(target: "Client", "Message archiving enabled");
            }
            Some(ArchiveHandle::new(connection.clone()))
        } else {
            debug!(target: "Client", "Server has no message archive");
            None
        };
        *self.archive.write().expect("RwLock should not be poisoned") = handle;
    }

    /// The archive of the current session. `None` while the session is not
    /// alive or when the server does not support archiving.
    pub fn get_archive_handle(&self) -> Option<ArchiveHandle> {
        if !self.is_alive() {
            return None;
        }
        self.archive
            .read()
            .expect("RwLock should not be poisoned")
            .clone()
    }
}
