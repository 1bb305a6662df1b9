pub mod error;
pub mod filestore;
pub mod keypair;
pub mod memory;
pub mod traits;

pub use filestore::JsonPreferenceStore;
pub use keypair::{KeyPair, KeyPairManager};
pub use memory::MemoryPreferenceStore;
pub use traits::{PrefValue, PreferenceStore};

/// Keys under which the session core keeps its state in the preference store.
pub mod keys {
    /// `user@host` identity string.
    pub const USER_NAME: &str = "user_name";
    pub const PASSWORD: &str = "password";
    /// Mirrors the authenticated state so a restarted process knows whether
    /// the previous run ended logged in.
    pub const LOGGED_IN: &str = "logged_in";
}
