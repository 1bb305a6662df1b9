use crate::client::Client;
use influcore::jid::{BareJid, Jid};
use influcore::types::message::{ChatMessage, MessageId};
use log::{debug, warn};
use std::sync::atomic::Ordering;

impl Client {
    pub fn generate_message_id(&self) -> MessageId {
        let count = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.unique_id, count)
    }

    /// Sends a chat message to `to`.
    ///
    /// Returns the id of the sent message, or `None` if the session is not
    /// alive or the transport refused it. Messages are never queued.
    pub async fn send_message(&self, to: &BareJid, body: &str) -> Option<MessageId> {
        if !self.is_alive() {
            warn!(target: "Client", "Not sending message to {to}: session is not alive");
            return None;
        }
        let connection = self.current_connection().await?;

        let mut message = ChatMessage::chat(self.generate_message_id(), Jid::from(to.clone()), body);
        message.from = self.context.own_jid().map(Jid::from);

        match connection.send_message(&message).await {
            Ok(()) => {
                debug!(target: "Client", "Sent message {} to {to}", message.id);
                Some(message.id)
            }
            Err(e) => {
                warn!(target: "Client", "Failed to send message to {to}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::create_test_client;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_message_ids_are_unique_and_prefixed() {
        let (client, _server) = create_test_client().await;
        let ids: HashSet<_> = (0..100).map(|_| client.generate_message_id()).collect();
        assert_eq!(ids.len(), 100);
        assert!(ids.iter().all(|id| id.starts_with(&client.unique_id)));
    }
}
