use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JidError {
    #[error("address `{0}` has no `@` separator")]
    MissingSeparator(String),
    #[error("address `{0}` has an empty local part")]
    EmptyUser(String),
    #[error("address `{0}` has an empty domain")]
    EmptyServer(String),
    #[error("address `{0}` has an empty resource")]
    EmptyResource(String),
}

/// A `user@host` address with no resource attached.
///
/// The domain part is case-insensitive on the wire and is stored lowercased,
/// so two bare addresses compare equal whenever the server would route them
/// to the same account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BareJid {
    pub user: String,
    pub server: String,
}

/// An address that may carry a bound resource (`user@host/resource`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub resource: Option<String>,
}

impl BareJid {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_ascii_lowercase(),
        }
    }
}

impl Jid {
    pub fn to_bare(&self) -> BareJid {
        BareJid {
            user: self.user.clone(),
            server: self.server.clone(),
        }
    }
}

impl From<BareJid> for Jid {
    fn from(bare: BareJid) -> Self {
        Self {
            user: bare.user,
            server: bare.server,
            resource: None,
        }
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, rest) = s
            .split_once('@')
            .ok_or_else(|| JidError::MissingSeparator(s.to_string()))?;
        if user.is_empty() {
            return Err(JidError::EmptyUser(s.to_string()));
        }
        let (server, resource) = match rest.split_once('/') {
            Some((_, "")) => return Err(JidError::EmptyResource(s.to_string())),
            Some((server, resource)) => (server, Some(resource.to_string())),
            None => (rest, None),
        };
        if server.is_empty() {
            return Err(JidError::EmptyServer(s.to_string()));
        }
        Ok(Self {
            user: user.to_string(),
            server: server.to_ascii_lowercase(),
            resource,
        })
    }
}

impl FromStr for BareJid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Jid::from_str(s).map(|jid| jid.to_bare())
    }
}

impl TryFrom<String> for Jid {
    type Error = JidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for BareJid {
    type Error = JidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

impl From<BareJid> for String {
    fn from(jid: BareJid) -> Self {
        jid.to_string()
    }
}

impl fmt::Display for BareJid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(resource) => write!(f, "{}@{}/{}", self.user, self.server, resource),
            None => write!(f, "{}@{}", self.user, self.server),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_jid() {
        let jid: Jid = "bob@Example.org/phone".parse().expect("valid jid");
        assert_eq!(jid.user, "bob");
        assert_eq!(jid.server, "example.org");
        assert_eq!(jid.resource.as_deref(), Some("phone"));
        assert_eq!(jid.to_string(), "bob@example.org/phone");
        assert_eq!(jid.to_bare(), BareJid::new("bob", "example.org"));
    }

    #[test]
    fn test_bare_jid_drops_resource() {
        let bare: BareJid = "bob@example.org/laptop".parse().expect("valid jid");
        assert_eq!(bare.to_string(), "bob@example.org");
    }

    #[test]
    fn test_resource_may_contain_slash_and_at() {
        let jid: Jid = "bob@example.org/a/b@c".parse().expect("valid jid");
        assert_eq!(jid.resource.as_deref(), Some("a/b@c"));
    }

    #[test]
    fn test_malformed_addresses_are_rejected() {
        assert_eq!(
            "example.org".parse::<BareJid>(),
            Err(JidError::MissingSeparator("example.org".into()))
        );
        assert_eq!(
            "@example.org".parse::<BareJid>(),
            Err(JidError::EmptyUser("@example.org".into()))
        );
        assert_eq!(
            "bob@".parse::<BareJid>(),
            Err(JidError::EmptyServer("bob@".into()))
        );
        assert_eq!(
            "bob@example.org/".parse::<Jid>(),
            Err(JidError::EmptyResource("bob@example.org/".into()))
        );
    }

    #[test]
    fn test_serde_uses_string_form() {
        let bare = BareJid::new("alice", "example.org");
        let json = serde_json::to_string(&bare).expect("serialize");
        assert_eq!(json, "\"alice@example.org\"");
        let back: BareJid = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, bare);
        assert!(serde_json::from_str::<BareJid>("\"nope\"").is_err());
    }
}
