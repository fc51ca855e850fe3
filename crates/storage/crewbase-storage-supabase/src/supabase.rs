//! Supabase connection configuration and PostgREST transport
//!
//! [`HttpTransport`] is the one client handle a [`crate::SupabaseManager`]
//! holds. It turns a [`TableRequest`] into an HTTP call against
//! `{url}/rest/v1/{table}` and hands back the decoded body untouched.

use crate::request::{TableOperation, TableRequest};
use async_trait::async_trait;
use crewbase_core::{get_env_bool, get_env_or, get_required_env, CrewbaseError, Result};
use reqwest::{header, Client, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding the project URL
pub const SUPABASE_URL_VAR: &str = "SUPABASE_URL";
/// Environment variable holding the anon or service key
pub const SUPABASE_KEY_VAR: &str = "SUPABASE_KEY";
/// Optional request timeout in seconds
pub const SUPABASE_TIMEOUT_VAR: &str = "SUPABASE_TIMEOUT_SECS";
/// Optional Postgres schema exposed through PostgREST
pub const SUPABASE_SCHEMA_VAR: &str = "SUPABASE_SCHEMA";
/// Optional table name for the external memory store
pub const SUPABASE_MEMORY_TABLE_VAR: &str = "SUPABASE_MEMORY_TABLE";
/// Opt-in for update/delete without filters
pub const SUPABASE_ALLOW_UNSCOPED_VAR: &str = "SUPABASE_ALLOW_UNSCOPED_MUTATIONS";

/// Default table backing [`crate::SupabaseStorage`]
pub const DEFAULT_MEMORY_TABLE: &str = "crewai_memory";

/// Supabase configuration
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Supabase project URL (e.g., https://xxx.supabase.co)
    pub url: String,
    /// Supabase anon/service key
    pub api_key: String,
    /// Per-request timeout; none by default
    pub timeout: Option<Duration>,
    /// Non-default schema sent as Accept-Profile/Content-Profile
    pub schema: Option<String>,
    /// Permit update/delete calls with an empty filter set
    pub allow_unscoped_mutations: bool,
    /// Table used by the external memory store
    pub memory_table: String,
}

impl SupabaseConfig {
    /// Create a new Supabase configuration
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: None,
            schema: None,
            allow_unscoped_mutations: false,
            memory_table: DEFAULT_MEMORY_TABLE.to_string(),
        }
    }

    /// Read configuration from the process environment
    ///
    /// `SUPABASE_URL` and `SUPABASE_KEY` are required; everything else falls
    /// back to defaults. Blank schema or memory table values count as unset.
    pub fn from_env() -> Result<Self> {
        let url = get_required_env(SUPABASE_URL_VAR)?;
        let api_key = get_required_env(SUPABASE_KEY_VAR)?;
        let mut config = Self::new(url, api_key);

        if let Ok(raw) = std::env::var(SUPABASE_TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                CrewbaseError::config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    SUPABASE_TIMEOUT_VAR, raw
                ))
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        let schema = get_env_or(SUPABASE_SCHEMA_VAR, "");
        if !schema.trim().is_empty() {
            config = config.with_schema(schema.trim());
        }

        let memory_table = get_env_or(SUPABASE_MEMORY_TABLE_VAR, "");
        if !memory_table.trim().is_empty() {
            config = config.with_memory_table(memory_table.trim());
        }
        config.allow_unscoped_mutations = get_env_bool(SUPABASE_ALLOW_UNSCOPED_VAR, false);
        Ok(config)
    }

    /// Set a request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Target a non-public schema
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Use a different memory table
    pub fn with_memory_table(mut self, table: impl Into<String>) -> Self {
        self.memory_table = table.into();
        self
    }

    /// Allow update/delete with no filters (affects every row)
    pub fn allow_unscoped_mutations(mut self, allow: bool) -> Self {
        self.allow_unscoped_mutations = allow;
        self
    }

    /// Both URL and key must be non-empty
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.url.trim().is_empty() {
            missing.push(SUPABASE_URL_VAR);
        }
        if self.api_key.trim().is_empty() {
            missing.push(SUPABASE_KEY_VAR);
        }
        if !missing.is_empty() {
            return Err(CrewbaseError::configuration_missing(format!(
                "{} must be set",
                missing.join(" and ")
            )));
        }
        Ok(())
    }

    /// REST root, `{url}/rest/v1`
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }
}

/// Raw result of one round trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceResponse {
    /// HTTP status code
    pub status: u16,
    /// Decoded body; an empty body decodes to `[]`
    pub data: Value,
    /// Total row count when the service reported one in `Content-Range`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

impl ServiceResponse {
    /// Build a response around `data`
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            count: None,
        }
    }

    /// Rows in the payload; empty when the payload is not an array
    pub fn rows(&self) -> &[Value] {
        self.data.as_array().map(Vec::as_slice).unwrap_or(&[])
    }

    /// True when the payload holds no rows
    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

/// The client handle behind [`crate::SupabaseManager`]
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PostgrestTransport: Send + Sync {
    /// Execute one request and return the undecorated response
    async fn execute(&self, request: TableRequest) -> Result<ServiceResponse>;

    /// GET the REST root; true on a 2xx answer
    async fn is_ready(&self) -> bool;
}

/// PostgREST over HTTP
pub struct HttpTransport {
    config: SupabaseConfig,
    client: Client,
}

impl HttpTransport {
    /// Build the HTTP client; no request is sent
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            "apikey",
            header::HeaderValue::from_str(&config.api_key)
                .map_err(|e| CrewbaseError::config(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .map_err(|e| CrewbaseError::config(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "Prefer",
            header::HeaderValue::from_static("return=representation"),
        );

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| CrewbaseError::config(format!("Failed to create HTTP client: {}", e)))?;

        info!("Supabase client configured for {}", config.url);
        Ok(Self { config, client })
    }

    /// Get the REST API URL for a table
    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.config.rest_url(), urlencoding::encode(table))
    }

    async fn decode(operation: TableOperation, response: Response) -> Result<ServiceResponse> {
        let status = response.status();
        let count = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let body = response.text().await.map_err(|e| {
            CrewbaseError::service_operation(
                operation.as_str(),
                Some(status.as_u16()),
                format!("Failed to read response: {}", e),
            )
        })?;

        if !status.is_success() {
            return Err(CrewbaseError::service_operation(
                operation.as_str(),
                Some(status.as_u16()),
                error_message(&body),
            ));
        }

        let data = if body.trim().is_empty() {
            Value::Array(Vec::new())
        } else {
            serde_json::from_str(&body).map_err(|e| {
                CrewbaseError::service_operation(
                    operation.as_str(),
                    Some(status.as_u16()),
                    format!("Failed to parse response: {}", e),
                )
            })?
        };

        Ok(ServiceResponse {
            status: status.as_u16(),
            data,
            count,
        })
    }
}

#[async_trait]
impl PostgrestTransport for HttpTransport {
    async fn execute(&self, request: TableRequest) -> Result<ServiceResponse> {
        let operation = request.operation;
        let url = self.table_url(&request.table);
        debug!("{} {}?{}", operation, url, request.query_string());

        let mut builder = match operation {
            TableOperation::Select => self.client.get(&url),
            TableOperation::Insert => self.client.post(&url),
            TableOperation::Update => self.client.patch(&url),
            TableOperation::Delete => self.client.delete(&url),
        }
        .query(&request.query_pairs());

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(schema) = &self.config.schema {
            let profile = if operation.is_mutation() {
                "Content-Profile"
            } else {
                "Accept-Profile"
            };
            builder = builder.header(profile, schema.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            CrewbaseError::service_operation(
                operation.as_str(),
                e.status().map(|s| s.as_u16()),
                format!("Request failed: {}", e),
            )
        })?;

        Self::decode(operation, response).await
    }

    async fn is_ready(&self) -> bool {
        let url = format!("{}/", self.config.rest_url());
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Supabase health check failed: {}", e);
                false
            }
        }
    }
}

/// Total from a `Content-Range` value such as `0-9/42`; `*` means unknown
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// Prefer PostgREST's `message` field, fall back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let message = v.get("message")?.as_str()?.to_string();
            Some(match v.get("details").and_then(Value::as_str) {
                Some(details) => format!("{} ({})", message, details),
                None => message,
            })
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewbase_core::Record;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer a single HTTP request with a canned response
    ///
    /// Returns the base URL and a handle yielding the raw request text.
    /// `headers` is zero or more `name: value\r\n` lines.
    async fn serve_once(status: &str, headers: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n{}\r\n{}",
            status,
            body.len(),
            headers,
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let Some(end) = raw.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&raw[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if raw.len() >= end + 4 + length {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&raw).into_owned()
        });

        (url, handle)
    }

    fn request_line(raw: &str) -> &str {
        raw.lines().next().unwrap_or_default()
    }

    fn has_header(raw: &str, line: &str) -> bool {
        raw.to_lowercase().lines().any(|l| l.trim() == line)
    }

    #[test]
    fn test_supabase_config() {
        let config = SupabaseConfig::new("https://xxx.supabase.co/", "anon_key");
        assert_eq!(config.url, "https://xxx.supabase.co");
        assert_eq!(config.rest_url(), "https://xxx.supabase.co/rest/v1");
        assert_eq!(config.memory_table, DEFAULT_MEMORY_TABLE);
        assert!(!config.allow_unscoped_mutations);
        assert!(config.validate().is_ok());

        let config = config
            .with_timeout(Duration::from_secs(5))
            .with_schema("agents")
            .allow_unscoped_mutations(true);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.schema.as_deref(), Some("agents"));
        assert!(config.allow_unscoped_mutations);
    }

    #[test]
    fn test_validate_missing_values() {
        for (url, key) in [("", "k"), ("https://x.supabase.co", ""), ("", " ")] {
            let err = SupabaseConfig::new(url, key).validate().unwrap_err();
            assert!(matches!(err, CrewbaseError::ConfigurationMissing(_)), "{url:?}/{key:?}");
        }
        let err = SupabaseConfig::new("", "").validate().unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL and SUPABASE_KEY"));
    }

    const ENV_VARS: [&str; 6] = [
        SUPABASE_URL_VAR,
        SUPABASE_KEY_VAR,
        SUPABASE_TIMEOUT_VAR,
        SUPABASE_SCHEMA_VAR,
        SUPABASE_MEMORY_TABLE_VAR,
        SUPABASE_ALLOW_UNSCOPED_VAR,
    ];

    // Every variable from_env reads is set only inside this test
    #[test]
    fn test_from_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        assert!(matches!(
            SupabaseConfig::from_env(),
            Err(CrewbaseError::ConfigurationMissing(_))
        ));

        std::env::set_var(SUPABASE_URL_VAR, "https://xyz.supabase.co");
        assert!(matches!(
            SupabaseConfig::from_env(),
            Err(CrewbaseError::ConfigurationMissing(_))
        ));

        std::env::set_var(SUPABASE_KEY_VAR, "service-key");
        let config = SupabaseConfig::from_env().unwrap();
        assert_eq!(config.timeout, None);
        assert_eq!(config.schema, None);
        assert_eq!(config.memory_table, DEFAULT_MEMORY_TABLE);
        assert!(!config.allow_unscoped_mutations);

        std::env::set_var(SUPABASE_TIMEOUT_VAR, "30");
        std::env::set_var(SUPABASE_SCHEMA_VAR, " agents ");
        std::env::set_var(SUPABASE_MEMORY_TABLE_VAR, "agent_memory");
        std::env::set_var(SUPABASE_ALLOW_UNSCOPED_VAR, "true");
        let config = SupabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "https://xyz.supabase.co");
        assert_eq!(config.api_key, "service-key");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.schema.as_deref(), Some("agents"));
        assert_eq!(config.memory_table, "agent_memory");
        assert!(config.allow_unscoped_mutations);

        for blank in ["", "   "] {
            std::env::set_var(SUPABASE_MEMORY_TABLE_VAR, blank);
            std::env::set_var(SUPABASE_SCHEMA_VAR, blank);
            let config = SupabaseConfig::from_env().unwrap();
            assert_eq!(config.memory_table, DEFAULT_MEMORY_TABLE, "{blank:?}");
            assert_eq!(config.schema, None, "{blank:?}");
        }

        std::env::set_var(SUPABASE_TIMEOUT_VAR, "soon");
        assert!(matches!(
            SupabaseConfig::from_env(),
            Err(CrewbaseError::Config(_))
        ));

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_http_transport_requires_config() {
        assert!(matches!(
            HttpTransport::new(SupabaseConfig::new("", "")),
            Err(CrewbaseError::ConfigurationMissing(_))
        ));
        let transport = HttpTransport::new(SupabaseConfig::new("https://xyz.supabase.co", "k")).unwrap();
        assert_eq!(
            transport.table_url("agent outputs"),
            "https://xyz.supabase.co/rest/v1/agent%20outputs"
        );
    }

    #[test]
    fn test_content_range() {
        assert_eq!(parse_content_range_total("0-9/42"), Some(42));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"code":"42P01","details":null,"hint":null,"message":"relation \"public.nope\" does not exist"}"#;
        assert_eq!(error_message(body), "relation \"public.nope\" does not exist");
        let body = r#"{"code":"23505","details":"Key (key)=(a) already exists.","message":"duplicate key"}"#;
        assert_eq!(error_message(body), "duplicate key (Key (key)=(a) already exists.)");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_service_response_rows() {
        let response = ServiceResponse::new(201, json!([{"id": 1}]));
        assert_eq!(response.rows().len(), 1);
        assert!(!response.is_empty());
        assert!(ServiceResponse::new(200, json!({"ok": true})).is_empty());
    }

    #[tokio::test]
    async fn test_http_select_request_and_count() {
        let (url, server) = serve_once(
            "200 OK",
            "content-range: 0-0/1\r\n",
            r#"[{"a":1,"name":"Senior Analyst & co"}]"#,
        )
        .await;
        let transport =
            HttpTransport::new(SupabaseConfig::new(url, "anon-key").with_schema("agents")).unwrap();

        let response = transport
            .execute(TableRequest::select("t").eq("a", 1).eq("name", "Senior Analyst & co"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.count, Some(1));
        assert_eq!(response.data, json!([{"a": 1, "name": "Senior Analyst & co"}]));

        let raw = server.await.unwrap();
        assert_eq!(
            request_line(&raw),
            "GET /rest/v1/t?select=*&a=eq.1&name=eq.Senior+Analyst+%26+co HTTP/1.1"
        );
        assert!(has_header(&raw, "apikey: anon-key"));
        assert!(has_header(&raw, "authorization: bearer anon-key"));
        assert!(has_header(&raw, "accept-profile: agents"));
        assert!(!raw.to_lowercase().contains("content-profile"));
    }

    #[tokio::test]
    async fn test_http_empty_body_decodes_to_empty_array() {
        let (url, server) = serve_once("204 No Content", "", "").await;
        let transport = HttpTransport::new(SupabaseConfig::new(url, "k")).unwrap();

        let response = transport
            .execute(TableRequest::delete("t").eq("id", 5))
            .await
            .unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.data, json!([]));
        assert!(response.is_empty());
        assert_eq!(response.count, None);

        let raw = server.await.unwrap();
        assert_eq!(request_line(&raw), "DELETE /rest/v1/t?id=eq.5 HTTP/1.1");
        assert!(has_header(&raw, "prefer: return=representation"));
    }

    #[tokio::test]
    async fn test_http_error_status_becomes_service_operation() {
        let (url, server) = serve_once(
            "404 Not Found",
            "content-type: application/json\r\n",
            r#"{"code":"42P01","details":null,"hint":null,"message":"relation does not exist"}"#,
        )
        .await;
        let transport =
            HttpTransport::new(SupabaseConfig::new(url, "k").with_schema("agents")).unwrap();

        let mut record = Record::new();
        record.insert("agent_name".into(), json!("researcher"));
        let err = transport
            .execute(TableRequest::insert("missing", record))
            .await
            .unwrap_err();
        match &err {
            CrewbaseError::ServiceOperation {
                operation, status, ..
            } => {
                assert_eq!(operation, "insert");
                assert_eq!(*status, Some(404));
            }
            other => panic!("expected ServiceOperation, got {other:?}"),
        }
        assert_eq!(
            err.to_string(),
            "Service operation 'insert' failed (404): relation does not exist"
        );

        let raw = server.await.unwrap();
        assert_eq!(request_line(&raw), "POST /rest/v1/missing HTTP/1.1");
        assert!(has_header(&raw, "content-profile: agents"));
        assert!(!raw.to_lowercase().contains("accept-profile"));
        assert!(raw.ends_with(r#"{"agent_name":"researcher"}"#));
    }

    #[tokio::test]
    async fn test_http_update_uses_patch() {
        let (url, server) = serve_once("200 OK", "", r#"[{"id":5,"status":"done"}]"#).await;
        let transport = HttpTransport::new(SupabaseConfig::new(url, "k")).unwrap();

        let mut record = Record::new();
        record.insert("status".into(), json!("done"));
        let response = transport
            .execute(TableRequest::update("t", record).eq("id", 5))
            .await
            .unwrap();
        assert_eq!(response.rows().len(), 1);

        let raw = server.await.unwrap();
        assert_eq!(request_line(&raw), "PATCH /rest/v1/t?id=eq.5 HTTP/1.1");
        assert!(has_header(&raw, "content-type: application/json"));
        assert!(!raw.to_lowercase().contains("profile:"));
        assert!(raw.ends_with(r#"{"status":"done"}"#));
    }

    #[tokio::test]
    async fn test_http_json_path_and_like_encoding() {
        let (url, server) = serve_once("200 OK", "", "[]").await;
        let transport = HttpTransport::new(SupabaseConfig::new(url, "k")).unwrap();

        let request = TableRequest::select("crewai_memory")
            .eq("metadata->>agent_id", "a1")
            .like("key", "agent_*")
            .limit(10);
        assert!(transport.execute(request).await.unwrap().is_empty());

        let raw = server.await.unwrap();
        assert_eq!(
            request_line(&raw),
            "GET /rest/v1/crewai_memory?select=*&metadata-%3E%3Eagent_id=eq.a1&key=like.agent_*&limit=10 HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn test_http_malformed_body_is_service_failure() {
        let (url, _server) = serve_once("200 OK", "", "not json").await;
        let transport = HttpTransport::new(SupabaseConfig::new(url, "k")).unwrap();

        let err = transport.execute(TableRequest::select("t")).await.unwrap_err();
        assert!(matches!(
            err,
            CrewbaseError::ServiceOperation { status: Some(200), .. }
        ));
    }

    #[tokio::test]
    async fn test_http_is_ready() {
        let (url, server) = serve_once("200 OK", "", "{}").await;
        let transport = HttpTransport::new(SupabaseConfig::new(url, "k")).unwrap();
        assert!(transport.is_ready().await);
        assert_eq!(request_line(&server.await.unwrap()), "GET /rest/v1/ HTTP/1.1");

        let (url, _server) = serve_once("503 Service Unavailable", "", "").await;
        let transport = HttpTransport::new(SupabaseConfig::new(url, "k")).unwrap();
        assert!(!transport.is_ready().await);
    }
}
