use crate::store::error::{Result, StoreError};
use crate::store::keys::{PASSWORD, USER_NAME};
use crate::store::traits::PreferenceStore;
use influcore::credentials::{self, Credentials};
use log::{debug, info, warn};
use std::sync::{Arc, RwLock};

/// In-memory copy of the login triple, backed by the preference store.
pub struct CredentialStore {
    prefs: Arc<dyn PreferenceStore>,
    current: RwLock<Credentials>,
}

impl CredentialStore {
    /// Reads the stored identity and password. A malformed stored identity is
    /// logged and treated as no credentials, so the store can still be reset.
    pub async fn load(prefs: Arc<dyn PreferenceStore>) -> Result<Self> {
        let current = match Self::read(prefs.as_ref()).await {
            Ok(creds) => creds,
            Err(StoreError::Credentials(e)) => {
                warn!(target: "Credentials", "Ignoring stored credentials: {e}");
                Credentials::default()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            prefs,
            current: RwLock::new(current),
        })
    }

    async fn read(prefs: &dyn PreferenceStore) -> Result<Credentials> {
        let identity = prefs.get_string(USER_NAME).await?;
        let password = prefs.get_string(PASSWORD).await?;
        let creds = credentials::resolve(identity.as_deref(), password.as_deref())?;
        debug!(target: "Credentials", "Resolved credentials: {creds:?}");
        Ok(creds)
    }

    pub fn current(&self) -> Credentials {
        self.current
            .read()
            .expect("RwLock should not be poisoned")
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.current
            .read()
            .expect("RwLock should not be poisoned")
            .is_empty()
    }

    /// Re-reads the preference store and replaces the in-memory copy. A stored
    /// identity without an `@` is reported as [`StoreError::Credentials`] and
    /// leaves the in-memory copy untouched.
    pub async fn reload(&self) -> Result<Credentials> {
        let creds = Self::read(self.prefs.as_ref()).await?;
        *self.current.write().expect("RwLock should not be poisoned") = creds.clone();
        Ok(creds)
    }

    /// Persists a new identity and password and makes them current.
    pub async fn store(&self, creds: &Credentials) -> Result<()> {
        self.prefs.put(USER_NAME, creds.identity().into()).await?;
        self.prefs.put(PASSWORD, creds.password.clone().into()).await?;
        *self.current.write().expect("RwLock should not be poisoned") = creds.clone();
        Ok(())
    }

    /// Forgets the credentials and wipes the whole preference store,
    /// including settings that have nothing to do with authentication.
    pub async fn reset(&self) -> Result<()> {
        *self.current.write().expect("RwLock should not be poisoned") = Credentials::default();
        self.prefs.clear().await?;
        info!(target: "Credentials", "Credentials reset, preference store cleared");
        Ok(())
    }
}
