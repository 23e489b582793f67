//! Pooled SQL client over the ClickHouse HTTP interface.
//!
//! Each statement is POSTed as the request body. Bound parameters travel as
//! `param_<name>` URL pairs, and rows stream back as `JSONCompactEachRow`
//! lines that are decoded one at a time as the body arrives.
//!
//! The pool is bounded twice: `reqwest` keeps at most `max_connections` idle
//! keep-alive connections, and a semaphore of the same size caps statements in
//! flight. A permit is held until the row stream is dropped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::row::Row;
use crate::wrapper::CompiledQuery;

/// Raw rows of one statement, in server order.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Anything that can run a compiled statement and stream its rows back.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Submit a statement. Failures surface either here or as an `Err` item
    /// on the returned stream.
    async fn submit(&self, query: &CompiledQuery) -> Result<RowStream>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for a ClickHouse HTTP endpoint.
///
/// The password is redacted in `Debug` output.
#[derive(Clone)]
pub struct ClickHouseConfig {
    /// Base URL, e.g. `http://localhost:8123`
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database unqualified names resolve against. Server default if unset.
    pub database: Option<String>,
    /// Upper bound on concurrently executing statements.
    pub max_connections: usize,
    /// Whole-request timeout, including streaming the result body.
    pub query_timeout_secs: u64,
}

impl std::fmt::Debug for ClickHouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .finish()
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            user: None,
            password: None,
            database: None,
            max_connections: 8,
            query_timeout_secs: 30,
        }
    }
}

impl ClickHouseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build from environment variables:
    ///   STRATA_CLICKHOUSE_URL, STRATA_CLICKHOUSE_USER, STRATA_CLICKHOUSE_PASSWORD,
    ///   STRATA_CLICKHOUSE_DATABASE, STRATA_POOL_SIZE, STRATA_QUERY_TIMEOUT_SECS
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            url: std::env::var("STRATA_CLICKHOUSE_URL").unwrap_or(defaults.url),
            user: std::env::var("STRATA_CLICKHOUSE_USER").ok(),
            password: std::env::var("STRATA_CLICKHOUSE_PASSWORD").ok(),
            database: std::env::var("STRATA_CLICKHOUSE_DATABASE").ok(),
            max_connections: std::env::var("STRATA_POOL_SIZE")
                .unwrap_or_else(|_| defaults.max_connections.to_string())
                .parse()
                .context("Invalid STRATA_POOL_SIZE")?,
            query_timeout_secs: std::env::var("STRATA_QUERY_TIMEOUT_SECS")
                .unwrap_or_else(|_| defaults.query_timeout_secs.to_string())
                .parse()
                .context("Invalid STRATA_QUERY_TIMEOUT_SECS")?,
        })
    }
}

// ---------------------------------------------------------------------------
// ClickHouseClient
// ---------------------------------------------------------------------------

pub struct ClickHouseClient {
    http: reqwest::Client,
    endpoint: Url,
    config: ClickHouseConfig,
    permits: Arc<Semaphore>,
}

impl ClickHouseClient {
    pub fn new(config: ClickHouseConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(StoreError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        let endpoint = Url::parse(&config.url)
            .map_err(|e| StoreError::Config(format!("invalid ClickHouse URL '{}': {}", config.url, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StoreError::Config(format!(
                "ClickHouse URL must be http:// or https://, got '{}'",
                config.url
            )));
        }

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_connections)
            .timeout(Duration::from_secs(config.query_timeout_secs))
            .build()?;

        info!(
            "ClickHouseClient: url={}, database={:?}, pool={}",
            endpoint, config.database, config.max_connections
        );

        Ok(Self {
            http,
            endpoint,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
        })
    }

    /// Statement slots not currently held by a live result stream.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    fn request_url(&self, query: &CompiledQuery, query_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("default_format", "JSONCompactEachRow");
            pairs.append_pair("output_format_json_quote_64bit_integers", "0");
            // Render DateTime values as UTC ISO 8601, whatever the server zone.
            pairs.append_pair("date_time_output_format", "iso");
            pairs.append_pair("query_id", query_id);
            if let Some(database) = &self.config.database {
                pairs.append_pair("database", database);
            }
            for (name, value) in &query.params {
                pairs.append_pair(&format!("param_{}", name), value);
            }
        }
        url
    }
}

#[async_trait]
impl SqlClient for ClickHouseClient {
    async fn submit(&self, query: &CompiledQuery) -> Result<RowStream> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Config("connection pool is closed".to_string()))?;

        let query_id = Uuid::new_v4().to_string();
        debug!(query_id = %query_id, params = query.params.len(), "Submitting statement");

        let mut request = self
            .http
            .post(self.request_url(query, &query_id))
            .body(query.sql.clone());
        if let Some(user) = &self.config.user {
            request = request.header("X-ClickHouse-User", user);
        }
        if let Some(password) = &self.config.password {
            request = request.header("X-ClickHouse-Key", password);
        }

        let response = request.send().await.map_err(|e| {
            warn!(query_id = %query_id, "ClickHouse request failed: {}", e);
            StoreError::Http(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match body.trim() {
                "" => format!("HTTP {}", status),
                text => text.to_string(),
            };
            warn!(query_id = %query_id, %status, "ClickHouse rejected query: {}", message);
            return Err(StoreError::Execution { query_id, message });
        }

        let rows = decode_rows(response.bytes_stream(), query_id).map(move |row| {
            let _held = &permit;
            row
        });
        Ok(rows.boxed())
    }
}

// ---------------------------------------------------------------------------
// Line decoding
// ---------------------------------------------------------------------------

struct LineState<S> {
    chunks: std::pin::Pin<Box<S>>,
    buf: Vec<u8>,
    eof: bool,
    failed: bool,
    query_id: String,
}

/// Split a chunked body into newline-delimited rows.
///
/// A `Code: ...` exception line, which the server writes into an already
/// started response when a statement fails mid-flight, becomes an
/// `Execution` error. The stream ends after the first error.
pub fn decode_rows<S, B>(chunks: S, query_id: String) -> impl Stream<Item = Result<Row>> + Send
where
    S: Stream<Item = std::result::Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = LineState {
        chunks: Box::pin(chunks),
        buf: Vec::new(),
        eof: false,
        failed: false,
        query_id,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.failed {
                return None;
            }
            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                if let Some(item) = parse_line(&line, &st.query_id) {
                    st.failed = item.is_err();
                    return Some((item, st));
                }
                continue;
            }
            if st.eof {
                let rest = std::mem::take(&mut st.buf);
                let item = parse_line(&rest, &st.query_id)?;
                st.failed = true;
                return Some((item, st));
            }
            match st.chunks.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.failed = true;
                    return Some((Err(StoreError::Http(e)), st));
                }
                None => st.eof = true,
            }
        }
    })
}

fn parse_line(raw: &[u8], query_id: &str) -> Option<Result<Row>> {
    let line = raw.trim_ascii();
    if line.is_empty() {
        return None;
    }
    // Data rows are always JSON arrays; only other lines can be exceptions.
    if line.starts_with(b"[") {
        return Some(Row::from_bytes(line));
    }
    let text = String::from_utf8_lossy(line);
    if text.starts_with("Code:") || text.starts_with('{') || text.contains("DB::Exception") {
        return Some(Err(StoreError::Execution {
            query_id: query_id.to_string(),
            message: text.into_owned(),
        }));
    }
    Some(Row::from_bytes(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn chunks(parts: &[&str]) -> impl Stream<Item = std::result::Result<Vec<u8>, reqwest::Error>> + Send + 'static {
        let owned: Vec<std::result::Result<Vec<u8>, reqwest::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        stream::iter(owned)
    }

    async fn decode(parts: &[&str]) -> Vec<Result<Row>> {
        decode_rows(chunks(parts), "q-test".to_string()).collect().await
    }

    #[tokio::test]
    async fn test_decode_rows_across_chunk_boundaries() {
        let rows = decode(&["[\"temper", "ature\",10485760]\n[\"hum", "idity\",42]\n"]).await;
        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.try_get::<String>(0).unwrap(), "temperature");
        assert_eq!(first.try_get::<i64>(1).unwrap(), 10_485_760);
        let second = rows[1].as_ref().unwrap();
        assert_eq!(second.try_get::<String>(0).unwrap(), "humidity");
    }

    #[tokio::test]
    async fn test_decode_rows_without_trailing_newline() {
        let rows = decode(&["[\"a\",1]\n[\"b\",2]"]).await;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_decode_rows_empty_body() {
        assert!(decode(&[]).await.is_empty());
        assert!(decode(&["", "\n"]).await.is_empty());
    }

    #[tokio::test]
    async fn test_decode_rows_stops_on_exception_line() {
        let rows = decode(&[
            "[\"a\",1]\n",
            "Code: 241. DB::Exception: Memory limit exceeded\n",
            "[\"b\",2]\n",
        ])
        .await;
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_ok());
        match &rows[1] {
            Err(StoreError::Execution { query_id, message }) => {
                assert_eq!(query_id, "q-test");
                assert!(message.contains("Memory limit exceeded"));
            }
            other => panic!("Expected Execution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decode_rows_keeps_rows_mentioning_exceptions() {
        let rows = decode(&["[\"DB::Exception-sensor\",10]\n[\"humidity\",20]\n"]).await;
        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.try_get::<String>(0).unwrap(), "DB::Exception-sensor");
        assert_eq!(rows[1].as_ref().unwrap().try_get::<i64>(1).unwrap(), 20);
    }

    #[tokio::test]
    async fn test_decode_rows_exception_object() {
        let rows = decode(&["[\"a\",1]\n{\"exception\": \"Code: 159. Timeout exceeded\"}\n"]).await;
        assert_eq!(rows.len(), 2);
        assert!(matches!(&rows[1], Err(e) if e.is_execution()));
    }

    #[tokio::test]
    async fn test_decode_rows_invalid_utf8_is_decode_error() {
        let body: Vec<std::result::Result<Vec<u8>, reqwest::Error>> =
            vec![Ok(b"[\"bad\xff\",1]\n[\"ok\",2]\n".to_vec())];
        let rows: Vec<Result<Row>> = decode_rows(stream::iter(body), "q-test".to_string())
            .collect()
            .await;
        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0], Err(StoreError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_decode_rows_stops_on_malformed_line() {
        let rows = decode(&["not json\n[\"a\",1]\n"]).await;
        assert_eq!(rows.len(), 1);
        assert!(matches!(rows[0], Err(StoreError::Decode { .. })));
    }

    #[test]
    fn test_client_rejects_bad_url() {
        assert!(matches!(
            ClickHouseClient::new(ClickHouseConfig::new("not a url")),
            Err(StoreError::Config(_))
        ));
        assert!(matches!(
            ClickHouseClient::new(ClickHouseConfig::new("ftp://localhost:8123")),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_client_rejects_empty_pool() {
        let config = ClickHouseConfig {
            max_connections: 0,
            ..ClickHouseConfig::default()
        };
        assert!(matches!(
            ClickHouseClient::new(config),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_request_url_carries_params() {
        let config = ClickHouseConfig {
            database: Some("iot".to_string()),
            ..ClickHouseConfig::new("http://ch.local:8123")
        };
        let client = ClickHouseClient::new(config).unwrap();
        let query = CompiledQuery::new("SELECT 1").with_param("datasets", "['a b']");
        let url = client.request_url(&query, "qid-1");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("default_format".to_string(), "JSONCompactEachRow".to_string())));
        assert!(pairs.contains(&("query_id".to_string(), "qid-1".to_string())));
        assert!(pairs.contains(&("date_time_output_format".to_string(), "iso".to_string())));
        assert!(pairs.contains(&("database".to_string(), "iot".to_string())));
        assert!(pairs.contains(&("param_datasets".to_string(), "['a b']".to_string())));
        assert_eq!(client.available_permits(), 8);
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = ClickHouseConfig {
            password: Some("hunter2".to_string()),
            ..ClickHouseConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    // Serialize env-mutating tests to avoid races.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "STRATA_CLICKHOUSE_URL",
            "STRATA_CLICKHOUSE_USER",
            "STRATA_CLICKHOUSE_PASSWORD",
            "STRATA_CLICKHOUSE_DATABASE",
            "STRATA_POOL_SIZE",
            "STRATA_QUERY_TIMEOUT_SECS",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = ClickHouseConfig::from_env().unwrap();
        assert_eq!(config.url, "http://localhost:8123");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.query_timeout_secs, 30);
        assert_eq!(config.database, None);

        clear_env();
    }

    #[test]
    fn from_env_invalid_pool_size() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env();

        unsafe {
            std::env::set_var("STRATA_POOL_SIZE", "lots");
        }
        assert!(ClickHouseConfig::from_env().is_err());

        clear_env();
    }
}
