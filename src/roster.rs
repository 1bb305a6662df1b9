use crate::client::Client;
use crate::transport::XmppConnection;
use dashmap::DashMap;
use influcore::jid::BareJid;
use influcore::types::events::Event;
use influcore::types::presence::{Presence, PresenceType};
use influcore::types::roster::RosterEntry;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Load state of the current connection's roster.
#[derive(Debug, Clone, Default)]
pub(crate) enum RosterSlot {
    #[default]
    Pending,
    Loaded(Arc<RosterCache>),
    Failed,
}

impl RosterSlot {
    pub(crate) fn cache(&self) -> Option<Arc<RosterCache>> {
        match self {
            RosterSlot::Loaded(cache) => Some(cache.clone()),
            _ => None,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        !matches!(self, RosterSlot::Pending)
    }
}

/// Contacts of the current session plus the last presence seen per resource.
#[derive(Debug, Default)]
pub struct RosterCache {
    entries: DashMap<BareJid, RosterEntry>,
    presences: DashMap<BareJid, HashMap<String, Presence>>,
}

impl RosterCache {
    pub fn new(entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        let cache = Self::default();
        for entry in entries {
            cache.entries.insert(entry.jid.clone(), entry);
        }
        cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> HashSet<RosterEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    pub fn entry(&self, jid: &BareJid) -> Option<RosterEntry> {
        self.entries.get(jid).map(|e| e.value().clone())
    }

    /// Records an available or unavailable presence under its sender's
    /// resource. Other presence types are ignored.
    pub fn update_presence(&self, presence: &Presence) {
        if !matches!(presence.kind, PresenceType::Available | PresenceType::Unavailable) {
            return;
        }
        let Some(from) = presence.from.as_ref() else {
            return;
        };
        let resource = from.resource.clone().unwrap_or_default();
        self.presences
            .entry(from.to_bare())
            .or_default()
            .insert(resource, presence.clone());
    }

    /// The highest-priority available presence of `jid`, falling back to the
    /// last unavailable one and then to a synthesized unavailable presence.
    pub fn presence_of(&self, jid: &BareJid) -> Presence {
        let Some(resources) = self.presences.get(jid) else {
            return Presence::unavailable_from(jid);
        };
        let mut available: Vec<&Presence> =
            resources.values().filter(|p| p.is_available()).collect();
        available.sort_by_key(|p| std::cmp::Reverse(p.priority));
        available
            .first()
            .copied()
            .or_else(|| resources.values().next())
            .cloned()
            .unwrap_or_else(|| Presence::unavailable_from(jid))
    }
}

impl Client {
    /// Drops the previous roster and loads the new connection's in the background.
    pub(crate) fn bind_roster(self: &Arc<Self>, connection: Arc<dyn XmppConnection>, generation: u64) {
        self.reset_roster();

        let client = self.clone();
        tokio::spawn(async move {
            match connection.fetch_roster().await {
                Ok(entries) => client.publish_roster(entries, generation),
                Err(e) => client.fail_roster(e.to_string(), generation),
            }
        });
    }

    pub(crate) fn reset_roster(&self) {
        let mut pending = self
            .pending_presences
            .lock()
            .expect("Mutex should not be poisoned");
        pending.clear();
        self.roster.send_replace(RosterSlot::Pending);
    }

    fn publish_roster(&self, entries: Vec<RosterEntry>, generation: u64) {
        let cache = Arc::new(RosterCache::new(entries));
        {
            let mut pending = self
                .pending_presences
                .lock()
                .expect("Mutex should not be poisoned");
            if !self.is_current(generation) {
                debug!(target: "Client/Roster", "Discarding roster of superseded connection {generation}");
                return;
            }
            for presence in pending.drain(..) {
                cache.update_presence(&presence);
            }
            self.roster.send_replace(RosterSlot::Loaded(cache.clone()));
        }

        let count = cache.len();
        info!(target: "Client/Roster", "Roster loaded with {count} contacts");
        self.context
            .event_bus()
            .dispatch(&Event::RosterLoaded { entries: count });
    }

    fn fail_roster(&self, error: String, generation: u64) {
        warn!(target: "Client/Roster", "Failed to load roster: {error}");
        {
            let mut pending = self
                .pending_presences
                .lock()
                .expect("Mutex should not be poisoned");
            if !self.is_current(generation) {
                return;
            }
            pending.clear();
            self.roster.send_replace(RosterSlot::Failed);
        }
        self.context
            .event_bus()
            .dispatch(&Event::RosterLoadFailed { error });
    }

    /// Applies an available/unavailable presence to the roster, holding it
    /// back until the roster arrives if it is still loading.
    pub(crate) fn record_presence(&self, presence: &Presence) {
        let mut pending = self
            .pending_presences
            .lock()
            .expect("Mutex should not be poisoned");
        match &*self.roster.borrow() {
            RosterSlot::Loaded(cache) => cache.update_presence(presence),
            RosterSlot::Pending => pending.push(presence.clone()),
            RosterSlot::Failed => {}
        }
    }

    /// The roster of the current session, if it has been loaded.
    pub fn roster(&self) -> Option<Arc<RosterCache>> {
        self.roster.borrow().cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use influcore::jid::Jid;
    use influcore::types::roster::Subscription;

    fn bob() -> BareJid {
        "bob@example.org".parse().expect("valid jid")
    }

    fn presence_from(jid: &str, available: bool, priority: i8) -> Presence {
        let mut presence = if available {
            Presence::available()
        } else {
            Presence::unavailable()
        };
        presence.from = Some(jid.parse::<Jid>().expect("valid jid"));
        presence.priority = priority;
        presence
    }

    #[test]
    fn test_unknown_contact_is_unavailable() {
        let cache = RosterCache::new([RosterEntry::new(bob(), Subscription::Both)]);
        let presence = cache.presence_of(&bob());
        assert!(!presence.is_available());
        assert_eq!(presence.owner(), Some(bob()));
    }

    #[test]
    fn test_highest_priority_resource_wins() {
        let cache = RosterCache::default();
        cache.update_presence(&presence_from("bob@example.org/phone", true, 1));
        cache.update_presence(&presence_from("bob@example.org/desk", true, 5));

        let presence = cache.presence_of(&bob());
        assert!(presence.is_available());
        assert_eq!(presence.priority, 5);
    }

    #[test]
    fn test_unavailable_replaces_resource() {
        let cache = RosterCache::default();
        cache.update_presence(&presence_from("bob@example.org/phone", true, 1));
        cache.update_presence(&presence_from("bob@example.org/phone", false, 0));

        assert!(!cache.presence_of(&bob()).is_available());
    }

    #[test]
    fn test_entries_are_deduplicated_by_jid() {
        let cache = RosterCache::new([
            RosterEntry::new(bob(), Subscription::To),
            RosterEntry::new(bob(), Subscription::Both),
        ]);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.entry(&bob()).map(|e| e.subscription),
            Some(Subscription::Both)
        );
    }
}
