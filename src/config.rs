use crate::store::keypair::DEFAULT_KEY_BITS;
use crate::transport::ConnectOptions;
use influcore::credentials::Credentials;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const APP_NAME: &str = "Influence";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Resource bound on login.
    pub resource: String,
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// How long `connect` waits for the authenticated callback after login.
    #[serde(with = "duration_ms")]
    pub auth_timeout: Duration,
    /// Upper bound for `get_contact_list` waiting on the first roster load.
    #[serde(with = "duration_ms")]
    pub roster_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub reconnect_initial_delay: Duration,
    #[serde(with = "duration_ms")]
    pub reconnect_max_delay: Duration,
    /// Fraction of the backoff delay that is randomised, in `[0, 1]`.
    pub reconnect_jitter: f64,
    pub require_tls: bool,
    pub compression: bool,
    pub key_pair_dir: String,
    /// RSA modulus size for newly generated key pairs.
    pub key_pair_bits: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resource: APP_NAME.to_string(),
            connect_timeout: Duration::from_secs(7),
            auth_timeout: Duration::from_secs(15),
            roster_timeout: Duration::from_secs(10),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(300),
            reconnect_jitter: 0.2,
            require_tls: true,
            compression: true,
            key_pair_dir: "keyPairs".to_string(),
            key_pair_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl SessionConfig {
    pub fn connect_options(&self, credentials: &Credentials) -> ConnectOptions {
        ConnectOptions {
            domain: credentials.host.clone(),
            host: credentials.host.clone(),
            resource: self.resource.clone(),
            require_tls: self.require_tls,
            compression: self.compression,
            connect_timeout: self.connect_timeout,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "roster_timeout": 250, "resource": "desk" }"#)
                .expect("valid config");
        assert_eq!(config.roster_timeout, Duration::from_millis(250));
        assert_eq!(config.resource, "desk");
        assert_eq!(config.connect_timeout, Duration::from_secs(7));
        assert!(config.require_tls);
        assert_eq!(config.key_pair_bits, 1024);
    }

    #[test]
    fn test_connect_options_use_host_as_domain() {
        let options = SessionConfig::default()
            .connect_options(&Credentials::new("alice", "example.org", "hunter2"));
        assert_eq!(options.domain, "example.org");
        assert_eq!(options.host, "example.org");
        assert_eq!(options.resource, APP_NAME);
        assert_eq!(options.connect_timeout, Duration::from_secs(7));
    }
}
