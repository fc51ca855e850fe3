//! Table-level CRUD over Supabase
//!
//! [`SupabaseManager`] forwards insert/query/update/delete to the hosted
//! service. Filters are plain maps applied as `AND`-ed equality predicates.
//! Failures are logged once here and returned unchanged; nothing is retried.

use crate::request::{TableOperation, TableRequest};
use crate::supabase::{HttpTransport, PostgrestTransport, ServiceResponse, SupabaseConfig};
use crewbase_core::{CrewbaseError, FilterSet, Record, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};

/// Manages the Supabase client handle and table operations
pub struct SupabaseManager {
    config: SupabaseConfig,
    client: Arc<dyn PostgrestTransport>,
}

impl SupabaseManager {
    /// Create a manager with the HTTP transport
    ///
    /// Fails with `ConfigurationMissing` before any network traffic when the
    /// URL or key is empty.
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        config.validate()?;
        let client = Arc::new(HttpTransport::new(config.clone())?);
        Ok(Self { config, client })
    }

    /// Read `SUPABASE_URL`/`SUPABASE_KEY` (and friends) and connect
    pub fn from_env() -> Result<Self> {
        Self::new(SupabaseConfig::from_env()?)
    }

    /// Create a manager around an existing transport
    pub fn with_transport(
        config: SupabaseConfig,
        client: Arc<dyn PostgrestTransport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, client })
    }

    /// The underlying client handle
    pub fn client(&self) -> Arc<dyn PostgrestTransport> {
        Arc::clone(&self.client)
    }

    /// Active configuration
    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// True when the REST endpoint answers
    pub async fn is_ready(&self) -> bool {
        self.client.is_ready().await
    }

    /// Insert one record into `table`
    pub async fn insert(&self, table: &str, record: Record) -> Result<ServiceResponse> {
        self.execute(TableRequest::insert(table, record)).await
    }

    /// Select all columns from `table`, optionally filtered
    ///
    /// Returns the row payload only.
    pub async fn query(&self, table: &str, filters: Option<&FilterSet>) -> Result<Vec<Record>> {
        let mut request = TableRequest::select(table);
        if let Some(filters) = filters {
            request = request.matching(filters);
        }
        let response = self.execute(request).await?;
        rows_from(TableOperation::Select, response.data).map_err(log_failure)
    }

    /// Set `record`'s fields on rows matching `filters`
    pub async fn update(
        &self,
        table: &str,
        record: Record,
        filters: &FilterSet,
    ) -> Result<ServiceResponse> {
        self.guard_unscoped(TableOperation::Update, table, filters)?;
        self.execute(TableRequest::update(table, record).matching(filters))
            .await
    }

    /// Delete rows matching `filters`
    pub async fn delete(&self, table: &str, filters: &FilterSet) -> Result<ServiceResponse> {
        self.guard_unscoped(TableOperation::Delete, table, filters)?;
        self.execute(TableRequest::delete(table).matching(filters))
            .await
    }

    /// Run an arbitrary request through the client handle
    pub async fn execute(&self, request: TableRequest) -> Result<ServiceResponse> {
        let operation = request.operation;
        debug!("Supabase {} on '{}'", operation, request.table);
        self.client.execute(request).await.map_err(|e| {
            let e = match e {
                failure @ CrewbaseError::ServiceOperation { .. } => failure,
                other => CrewbaseError::service_operation(operation.as_str(), None, other.to_string()),
            };
            log_failure(e)
        })
    }

    fn guard_unscoped(
        &self,
        operation: TableOperation,
        table: &str,
        filters: &FilterSet,
    ) -> Result<()> {
        if filters.is_empty() && !self.config.allow_unscoped_mutations {
            return Err(CrewbaseError::validation(format!(
                "Refusing {} on '{}' without filters; enable allow_unscoped_mutations to affect every row",
                operation, table
            )));
        }
        Ok(())
    }
}

pub(crate) fn log_failure(e: CrewbaseError) -> CrewbaseError {
    if let CrewbaseError::ServiceOperation {
        operation, message, ..
    } = &e
    {
        error!("Error {} data: {}", progressive(operation), message);
    }
    e
}

fn progressive(operation: &str) -> String {
    match operation {
        "query" => "querying".to_string(),
        "update" => "updating".to_string(),
        "delete" => "deleting".to_string(),
        "insert" => "inserting".to_string(),
        other => other.to_string(),
    }
}

/// Split a payload into records; anything but an array of objects is a failure
pub(crate) fn rows_from(operation: TableOperation, data: Value) -> Result<Vec<Record>> {
    let Value::Array(items) = data else {
        return Err(CrewbaseError::service_operation(
            operation.as_str(),
            None,
            format!("Expected an array of rows, got: {}", data),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            other => Err(CrewbaseError::service_operation(
                operation.as_str(),
                None,
                format!("Expected a row object, got: {}", other),
            )),
        })
        .collect()
}
