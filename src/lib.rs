// Domain types live in `influcore` and are re-exported here.
pub use influcore::jid;

pub mod types {
    pub use influcore::types::*;
}

pub mod archive;
pub mod client;
pub mod config;
pub mod contact;
pub mod context;
pub mod credentials;
pub mod presence;
pub mod reconnect;
pub mod roster;
pub mod send;
pub mod store;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{Client, SessionError};
pub use influcore::credentials::Credentials;
