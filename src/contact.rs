use crate::client::{Client, SessionError};
use crate::roster::RosterSlot;
use influcore::jid::BareJid;
use influcore::types::roster::RosterEntry;
use log::{debug, warn};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;

impl Client {
    /// Raw avatar bytes from the contact's vCard, if any.
    pub async fn get_avatar(&self, jid: &BareJid) -> Option<Vec<u8>> {
        if !self.is_alive() {
            debug!(target: "Client", "Not loading avatar of {jid}: session is not alive");
            return None;
        }
        let connection = self.current_connection().await?;
        match connection.load_vcard(jid).await {
            Ok(vcard) => vcard.avatar,
            Err(e) => {
                warn!(target: "Client", "Failed to load vCard of {jid}: {e}");
                None
            }
        }
    }

    /// All roster entries, waiting up to the configured roster timeout for the
    /// roster to finish loading.
    pub async fn get_contact_list(&self) -> Result<HashSet<RosterEntry>, SessionError> {
        self.get_contact_list_within(self.config.roster_timeout)
            .await
    }

    pub async fn get_contact_list_within(
        &self,
        wait: Duration,
    ) -> Result<HashSet<RosterEntry>, SessionError> {
        if !self.is_alive() {
            return Err(SessionError::NotConnected);
        }

        let mut roster = self.roster.subscribe();
        let settled = match timeout(wait, roster.wait_for(RosterSlot::is_settled)).await {
            Ok(Ok(slot)) => slot.cache(),
            Ok(Err(_)) => return Err(SessionError::NotConnected),
            Err(_) => {
                warn!(target: "Client/Roster", "Roster not loaded after {wait:?}");
                return Err(SessionError::RosterTimeout(wait));
            }
        };
        settled
            .map(|cache| cache.entries())
            .ok_or(SessionError::RosterUnavailable)
    }
}
