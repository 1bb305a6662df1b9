pub mod credentials;
pub mod jid;
pub mod types;
