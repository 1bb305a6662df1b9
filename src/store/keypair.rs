use crate::store::error::{Result, StoreError};
use log::{debug, error, info};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Name of the key pair that identifies this installation.
pub const MAIN_KEY_PAIR: &str = "mainKeyPair";
pub const KEY_PAIR_EXTENSION: &str = "kp";
/// RSA modulus size used for newly generated pairs.
pub const DEFAULT_KEY_BITS: usize = 1024;
const KEY_PAIR_FORMAT_VERSION: u8 = 2;

/// An RSA key pair as stored on disk: the public half as SPKI DER and the
/// private half as PKCS#8 DER.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    version: u8,
    public_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl KeyPair {
    /// Generates a new pair with a `bits`-bit modulus. This is CPU bound;
    /// async callers should run it on a blocking thread.
    pub fn generate(bits: usize) -> Result<Self> {
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| StoreError::KeyGeneration(e.to_string()))?;
        Self::from_private_key(&key)
    }

    pub fn from_private_key(key: &RsaPrivateKey) -> Result<Self> {
        let private_key = key
            .to_pkcs8_der()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let public_key = key
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self {
            version: KEY_PAIR_FORMAT_VERSION,
            public_key: public_key.as_bytes().to_vec(),
            private_key: private_key.as_bytes().to_vec(),
        })
    }

    /// SPKI DER encoding of the public key.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// PKCS#8 DER encoding of the private key.
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }

    pub fn rsa_private_key(&self) -> Result<RsaPrivateKey> {
        RsaPrivateKey::from_pkcs8_der(&self.private_key)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn key_bits(&self) -> Result<usize> {
        let public = RsaPublicKey::from_public_key_der(&self.public_key)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(public.size() * 8)
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn from_bytes(name: &str, data: &[u8]) -> Result<Self> {
        let corrupt = || StoreError::Corrupt(name.to_string());
        let (pair, _): (KeyPair, usize) =
            bincode::serde::decode_from_slice(data, bincode::config::standard())
                .map_err(|_| corrupt())?;
        if pair.version != KEY_PAIR_FORMAT_VERSION {
            return Err(corrupt());
        }
        // The public half is derived, so a mismatch means the blob was damaged.
        let key = pair.rsa_private_key().map_err(|_| corrupt())?;
        key.validate().map_err(|_| corrupt())?;
        if Self::from_private_key(&key)?.public_key != pair.public_key {
            return Err(corrupt());
        }
        Ok(pair)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Owns the directory of `<name>.kp` files.
///
/// A key pair file is written once and never replaced: `open` only creates a
/// missing file and `save` skips names that already exist. All operations on
/// one manager run under a single lock, so concurrent callers cannot both
/// create the same file.
pub struct KeyPairManager {
    dir: PathBuf,
    key_bits: usize,
    lock: Mutex<()>,
}

impl KeyPairManager {
    /// Uses `dir` as the key pair directory, creating it if needed.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            key_bits: DEFAULT_KEY_BITS,
            lock: Mutex::new(()),
        })
    }

    /// Modulus size for pairs this manager generates. Existing files are
    /// loaded as they are.
    pub fn with_key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn open_main(&self) -> Option<KeyPair> {
        self.open(MAIN_KEY_PAIR).await
    }

    /// Returns the stored key pair, generating and persisting one first if
    /// none exists. Failures are logged and reported as `None`.
    pub async fn open(&self, name: &str) -> Option<KeyPair> {
        match self.try_open(name).await {
            Ok(pair) => Some(pair),
            Err(e) => {
                error!(target: "KeyPairManager", "Failed to open key pair {name:?}: {e}");
                None
            }
        }
    }

    pub async fn try_open(&self, name: &str) -> Result<KeyPair> {
        let path = self.path_for(name)?;
        let _guard = self.lock.lock().await;

        match fs::read(&path).await {
            Ok(data) => KeyPair::from_bytes(name, &data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let bits = self.key_bits;
                let pair = tokio::task::spawn_blocking(move || KeyPair::generate(bits))
                    .await
                    .map_err(|e| StoreError::KeyGeneration(e.to_string()))??;
                Self::write_new(&path, &pair).await?;
                info!(target: "KeyPairManager", "Generated {bits}-bit key pair {name:?}");
                Ok(pair)
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Stores `pair` under `name` unless a file for that name already exists.
    pub async fn save(&self, name: &str, pair: &KeyPair) {
        if let Err(e) = self.try_save(name, pair).await {
            error!(target: "KeyPairManager", "Failed to save key pair {name:?}: {e}");
        }
    }

    /// Returns whether the pair was written; `false` means an earlier one is kept.
    pub async fn try_save(&self, name: &str, pair: &KeyPair) -> Result<bool> {
        let path = self.path_for(name)?;
        let _guard = self.lock.lock().await;

        if fs::try_exists(&path).await? {
            debug!(target: "KeyPairManager", "Key pair {name:?} already exists, not overwriting");
            return Ok(false);
        }
        Self::write_new(&path, pair).await?;
        Ok(true)
    }

    /// Names of all stored key pairs, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(KEY_PAIR_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.{KEY_PAIR_EXTENSION}")))
    }

    async fn write_new(path: &Path, pair: &KeyPair) -> Result<()> {
        let data = pair.to_bytes()?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            // Leave no half-written blob behind for the next open to trip over.
            let _ = fs::remove_file(path).await;
            return Err(StoreError::Io(e));
        }
        Ok(())
    }
}
