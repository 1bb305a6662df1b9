pub mod archive;
pub mod events;
pub mod message;
pub mod presence;
pub mod roster;
pub mod vcard;
