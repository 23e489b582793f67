//! Typed errors for the ClickHouse query layer.

use thiserror::Error;

use crate::registry::QueryKind;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised while compiling, executing or mapping a query.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Transport-level failure talking to the server.
    #[error("connection failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server rejected or aborted the statement.
    #[error("query {query_id} failed: {message}")]
    Execution { query_id: String, message: String },

    /// A response line was not a JSON row.
    #[error("malformed row {line:?}: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// A column held a value of the wrong type.
    #[error("column {index}: expected {expected}, found {found}")]
    Column {
        index: usize,
        expected: &'static str,
        found: String,
    },

    /// A row had fewer columns than the wrapper's SELECT list.
    #[error("row has {found} columns, expected {expected}")]
    RowShape { expected: usize, found: usize },

    /// No wrapper is registered for the requested kind.
    #[error("no query registered for kind '{0}'")]
    UnknownQueryKind(QueryKind),

    /// The request is missing inputs its query kind requires.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    /// Whether the error came from the server or transport rather than from
    /// mapping a row.
    pub fn is_execution(&self) -> bool {
        matches!(self, StoreError::Http(_) | StoreError::Execution { .. })
    }
}
