use crate::store::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrefValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        PrefValue::Bool(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        PrefValue::Int(value)
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        PrefValue::String(value.to_string())
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        PrefValue::String(value)
    }
}

/// Flat key/value settings store shared by the whole application.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PrefValue>>;
    async fn put(&self, key: &str, value: PrefValue) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    /// Drops every key, not only the ones owned by the session core.
    async fn clear(&self) -> Result<()>;

    /// Typed read; a value of another type reads as absent.
    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(match self.get(key).await? {
            Some(PrefValue::String(s)) => Some(s),
            _ => None,
        })
    }

    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(match self.get(key).await? {
            Some(PrefValue::Bool(b)) => Some(b),
            _ => None,
        })
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>> {
        Ok(match self.get(key).await? {
            Some(PrefValue::Int(i)) => Some(i),
            _ => None,
        })
    }
}
