use influcore::credentials::CredentialError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization/deserialization error: {0}")]
    Serialization(String),

    #[error("Invalid key pair name: {0:?}")]
    InvalidName(String),

    #[error("Stored key pair {0:?} is corrupt")]
    Corrupt(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
