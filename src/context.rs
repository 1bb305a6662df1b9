use crate::credentials::CredentialStore;
use crate::store::error::Result;
use crate::store::keys::LOGGED_IN;
use crate::store::traits::PreferenceStore;
use influcore::jid::BareJid;
use influcore::types::events::CoreEventBus;
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Application-wide state shared by the session and its collaborators.
///
/// Built once by the composition root and handed around as `Arc<SessionContext>`.
pub struct SessionContext {
    prefs: Arc<dyn PreferenceStore>,
    credentials: CredentialStore,
    event_bus: CoreEventBus,
    own_jid: RwLock<Option<BareJid>>,
    foreground_torn_down: AtomicBool,
    current_chat: RwLock<Option<BareJid>>,
}

impl SessionContext {
    pub async fn new(prefs: Arc<dyn PreferenceStore>) -> Result<Self> {
        let credentials = CredentialStore::load(prefs.clone()).await?;
        let own_jid = credentials.current().jid();
        Ok(Self {
            prefs,
            credentials,
            event_bus: CoreEventBus::new(),
            own_jid: RwLock::new(own_jid),
            // A fresh process has no main screen until the UI reports one.
            foreground_torn_down: AtomicBool::new(true),
            current_chat: RwLock::new(None),
        })
    }

    pub fn prefs(&self) -> &Arc<dyn PreferenceStore> {
        &self.prefs
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn event_bus(&self) -> &CoreEventBus {
        &self.event_bus
    }

    pub fn own_jid(&self) -> Option<BareJid> {
        self.own_jid
            .read()
            .expect("RwLock should not be poisoned")
            .clone()
    }

    pub fn set_own_jid(&self, jid: Option<BareJid>) {
        *self.own_jid.write().expect("RwLock should not be poisoned") = jid;
    }

    pub async fn reload_credentials(&self) -> Result<()> {
        let creds = self.credentials.reload().await?;
        self.set_own_jid(creds.jid());
        Ok(())
    }

    pub async fn reset_credentials(&self) -> Result<()> {
        self.set_own_jid(None);
        self.credentials.reset().await
    }

    pub fn is_foreground_torn_down(&self) -> bool {
        self.foreground_torn_down.load(Ordering::Relaxed)
    }

    pub fn set_foreground_torn_down(&self, torn_down: bool) {
        self.foreground_torn_down.store(torn_down, Ordering::Relaxed);
    }

    pub fn current_chat(&self) -> Option<BareJid> {
        self.current_chat
            .read()
            .expect("RwLock should not be poisoned")
            .clone()
    }

    pub fn set_current_chat(&self, peer: Option<BareJid>) {
        *self.current_chat.write().expect("RwLock should not be poisoned") = peer;
    }

    /// Persisted mirror of the authenticated state. Write failures are logged.
    pub async fn set_logged_in(&self, logged_in: bool) {
        if let Err(e) = self.prefs.put(LOGGED_IN, logged_in.into()).await {
            warn!(target: "Prefs", "Failed to persist logged_in={logged_in}: {e}");
        }
    }

    pub async fn was_logged_in(&self) -> bool {
        match self.prefs.get_bool(LOGGED_IN).await {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) => {
                warn!(target: "Prefs", "Failed to read logged_in flag: {e}");
                false
            }
        }
    }
}
