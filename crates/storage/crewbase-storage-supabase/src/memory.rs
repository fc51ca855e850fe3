//! External memory for agent crews backed by one Supabase table
//!
//! Expected table layout (created through migrations, never by this crate):
//!
//! | column       | type          |
//! |--------------|---------------|
//! | `id`         | uuid, pk      |
//! | `key`        | text, unique  |
//! | `value`      | text          |
//! | `metadata`   | jsonb         |
//! | `created_at` | timestamptz   |
//! | `updated_at` | timestamptz   |

use crate::manager::{log_failure, rows_from, SupabaseManager};
use crate::request::{TableOperation, TableRequest};
use crate::supabase::{ServiceResponse, SupabaseConfig};
use async_trait::async_trait;
use chrono::Utc;
use crewbase_core::{ExternalMemory, Record, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Default page size for [`ExternalMemory::search`]
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Supabase-backed [`ExternalMemory`]
pub struct SupabaseStorage {
    manager: Arc<SupabaseManager>,
    table_name: String,
}

impl SupabaseStorage {
    /// Connect using `config.memory_table` as the backing table
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        let manager = SupabaseManager::new(config)?;
        Ok(Self::from_manager(Arc::new(manager)))
    }

    /// Share an existing manager's client handle
    pub fn from_manager(manager: Arc<SupabaseManager>) -> Self {
        let table_name = manager.config().memory_table.clone();
        Self {
            manager,
            table_name,
        }
    }

    /// Override the backing table
    pub fn with_table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Backing table name
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn now() -> Value {
        Value::String(Utc::now().to_rfc3339())
    }
}

fn first_row(response: &ServiceResponse) -> Record {
    response
        .rows()
        .first()
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Strings are stored verbatim, everything else as JSON text
fn encode_value(value: Value) -> Result<Value> {
    Ok(match value {
        Value::String(s) => Value::String(s),
        other => Value::String(serde_json::to_string(&other)?),
    })
}

/// Inverse of [`encode_value`]; non-JSON text comes back as a string
fn decode_value(value: Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        other => other,
    }
}

#[async_trait]
impl ExternalMemory for SupabaseStorage {
    async fn save(&self, key: &str, value: Value, metadata: Option<Record>) -> Result<Record> {
        let mut data = Record::new();
        data.insert("key".into(), Value::String(key.to_string()));
        data.insert("value".into(), encode_value(value)?);
        data.insert(
            "metadata".into(),
            Value::Object(metadata.unwrap_or_default()),
        );
        data.insert("updated_at".into(), Self::now());

        let updated = self
            .manager
            .execute(TableRequest::update(&self.table_name, data.clone()).eq("key", key))
            .await?;
        if !updated.is_empty() {
            return Ok(first_row(&updated));
        }

        debug!("No memory row for '{}', inserting", key);
        data.insert("created_at".into(), Self::now());
        let inserted = self
            .manager
            .execute(TableRequest::insert(&self.table_name, data))
            .await?;
        Ok(first_row(&inserted))
    }

    async fn load(&self, key: &str) -> Result<Option<Value>> {
        let response = self
            .manager
            .execute(
                TableRequest::select(&self.table_name)
                    .columns("value")
                    .eq("key", key),
            )
            .await?;

        Ok(first_row(&response).remove("value").map(decode_value))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let response = self
            .manager
            .execute(TableRequest::delete(&self.table_name).eq("key", key))
            .await?;
        Ok(!response.is_empty())
    }

    async fn search(&self, query: &Record, limit: usize) -> Result<Vec<Record>> {
        let mut request = TableRequest::select(&self.table_name);
        for (field, value) in query {
            match (field.as_str(), value) {
                ("metadata", Value::Object(entries)) => {
                    for (meta_key, meta_value) in entries {
                        request = request.eq(format!("metadata->>{}", meta_key), meta_value.clone());
                    }
                }
                _ => request = request.eq(field.clone(), value.clone()),
            }
        }

        let response = self.manager.execute(request.limit(limit)).await?;
        rows_from(TableOperation::Select, response.data).map_err(log_failure)
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut request = TableRequest::select(&self.table_name).columns("key");
        if let Some(prefix) = prefix {
            request = request.like("key", format!("{}*", prefix));
        }

        let response = self.manager.execute(request).await?;
        Ok(response
            .rows()
            .iter()
            .filter_map(|row| row.get("key").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn clear(&self) -> Result<bool> {
        // PostgREST refuses DELETE without a predicate
        self.manager
            .execute(TableRequest::delete(&self.table_name).neq("id", uuid::Uuid::nil().to_string()))
            .await?;
        Ok(true)
    }
}
