use crate::client::{Client, SessionError, SubscriptionMode};
use influcore::jid::BareJid;
use influcore::types::events::{Event, SubscriptionRequest};
use influcore::types::presence::{Presence, PresenceType};
use log::{debug, info, warn};

impl Client {
    /// Broadcasts our presence. A no-op unless the session is alive.
    pub async fn send_presence(&self, presence: Presence) {
        if !self.is_alive() {
            debug!(target: "Client", "Not sending {} presence: session is not alive", presence.kind.as_str());
            return;
        }
        let Some(connection) = self.current_connection().await else {
            return;
        };
        if let Err(e) = connection.send_presence(&presence).await {
            warn!(target: "Client", "Failed to send {} presence: {e}", presence.kind.as_str());
        }
    }

    /// Best known presence of `jid`. Contacts with no presence on record are
    /// reported as unavailable.
    pub fn get_user_presence(&self, jid: &BareJid) -> Result<Presence, SessionError> {
        let roster = self.roster().ok_or(SessionError::RosterUnavailable)?;
        Ok(roster.presence_of(jid))
    }

    pub(crate) async fn handle_incoming_presence(&self, presence: Presence) {
        match presence.kind {
            PresenceType::Subscribe => {
                let Some(from) = presence.owner() else {
                    warn!(target: "Client", "Ignoring subscription request without sender");
                    return;
                };
                let approved = self.subscription_mode() == SubscriptionMode::AcceptAll;
                if approved {
                    info!(target: "Client", "Auto-accepting subscription request from {from}");
                    self.send_presence(Presence::subscribed(&from)).await;
                }
                self.context
                    .event_bus()
                    .dispatch(&Event::SubscriptionRequest(SubscriptionRequest {
                        from,
                        approved,
                    }));
            }
            PresenceType::Available | PresenceType::Unavailable => {
                self.record_presence(&presence);
                self.context.event_bus().dispatch(&Event::Presence(presence));
            }
            _ => self.context.event_bus().dispatch(&Event::Presence(presence)),
        }
    }
}
