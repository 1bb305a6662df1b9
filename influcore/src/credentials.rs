use crate::jid::BareJid;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("stored identity `{0}` is not of the form user@host")]
    MalformedIdentity(String),
}

/// Login triple for one account.
///
/// A value is only usable when all three fields are non-empty; anything else
/// is treated as "no credentials".
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub host: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, host: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            host: host.to_string(),
            password: password.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() || self.host.is_empty() || self.password.is_empty()
    }

    /// True when some field holds only whitespace.
    pub fn is_blank(&self) -> bool {
        [&self.username, &self.host, &self.password]
            .iter()
            .any(|field| field.trim().is_empty())
    }

    /// `user@host`, the identity string kept in the preference store.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }

    pub fn jid(&self) -> Option<BareJid> {
        if self.is_empty() {
            return None;
        }
        Some(BareJid::new(&self.username, &self.host))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

/// Splits a stored `user@host` identity on its first `@`.
pub fn parse_identity(identity: &str, password: &str) -> Result<Credentials, CredentialError> {
    let (username, host) = identity
        .split_once('@')
        .ok_or_else(|| CredentialError::MalformedIdentity(identity.to_string()))?;
    Ok(Credentials::new(username, host, password))
}

/// Builds credentials from the two persisted values. Either one missing
/// yields empty credentials rather than an error.
pub fn resolve(
    identity: Option<&str>,
    password: Option<&str>,
) -> Result<Credentials, CredentialError> {
    match (identity, password) {
        (Some(identity), Some(password)) => parse_identity(identity, password),
        _ => Ok(Credentials::default()),
    }
}
