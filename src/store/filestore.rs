use crate::store::error::{Result, StoreError};
use crate::store::traits::{PrefValue, PreferenceStore};
use async_trait::async_trait;
use log::debug;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

type PrefMap = BTreeMap<String, PrefValue>;

/// Preference store persisted as a single pretty-printed JSON object.
///
/// The whole map is rewritten on every change through a temporary file and a
/// rename, so a crash mid-write leaves the previous contents intact.
pub struct JsonPreferenceStore {
    path: PathBuf,
    values: Mutex<PrefMap>,
}

impl JsonPreferenceStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let values = Self::read_json(&path).await?.unwrap_or_default();
        debug!(target: "Prefs", "Loaded {} preference(s) from {}", values.len(), path.display());
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    async fn read_json(path: &Path) -> Result<Option<PrefMap>> {
        match fs::read(path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn write_json(&self, values: &PrefMap) -> Result<()> {
        let data = serde_json::to_vec_pretty(values)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for JsonPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<PrefValue>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: PrefValue) -> Result<()> {
        let mut values = self.values.lock().await;
        if values.get(key) == Some(&value) {
            return Ok(());
        }
        let mut updated = values.clone();
        updated.insert(key.to_string(), value);
        self.write_json(&updated).await?;
        *values = updated;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().await;
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut updated = values.clone();
        updated.remove(key);
        self.write_json(&updated).await?;
        *values = updated;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut values = self.values.lock().await;
        self.write_json(&PrefMap::new()).await?;
        values.clear();
        Ok(())
    }
}
