//! External memory interface for agent crews

use super::Record;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Key/value memory store that outlives a single crew run
///
/// Values are arbitrary JSON; metadata is a free-form object that `search`
/// can match against.
#[async_trait]
pub trait ExternalMemory: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    ///
    /// Returns the stored row as reported by the backend.
    async fn save(&self, key: &str, value: Value, metadata: Option<Record>) -> Result<Record>;

    /// Load the value stored under `key`
    async fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Remove `key`; true if something was deleted
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Find rows matching every entry in `query`
    async fn search(&self, query: &Record, limit: usize) -> Result<Vec<Record>>;

    /// List stored keys, optionally restricted to a prefix
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>>;

    /// Remove everything
    async fn clear(&self) -> Result<bool>;
}
