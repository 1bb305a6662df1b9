use crate::store::error::Result;
use crate::store::traits::{PrefValue, PreferenceStore};
use async_trait::async_trait;
use dashmap::DashMap;

/// Non-persistent preference store, for tests and embedders that keep their
/// own settings elsewhere.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: DashMap<String, PrefValue>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<PrefValue>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: PrefValue) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.values.clear();
        Ok(())
    }
}
