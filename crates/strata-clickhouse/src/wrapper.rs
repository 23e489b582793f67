//! The query-wrapper contract: compile, execute, map.
//!
//! One wrapper exists per query shape. A wrapper captures everything it needs
//! at construction, turns that into a [`CompiledQuery`] without touching the
//! network, submits it exactly once through a [`SqlClient`], and maps every
//! returned [`Row`] into its typed output.
//!
//! ## Adding a new query
//!
//! 1. Define the output type and the wrapper struct in `queries/`.
//! 2. Implement [`QueryWrapper`] for it and `From<Output> for QueryRecord`.
//! 3. Add a [`QueryKind`] variant and one line to `QueryRegistry::builtin()`.

use std::fmt;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::client::SqlClient;
use crate::error::Result;
use crate::queries::{EventRecord, MetaRecord, StorageSize};
use crate::registry::QueryKind;
use crate::row::Row;

/// Lazily produced typed results. The first error ends the stream.
pub type ResultStream<T> = BoxStream<'static, Result<T>>;

/// SQL text plus the values bound to its `{name:Type}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<(String, String)>,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A single query shape.
pub trait QueryWrapper: Send + Sync + 'static {
    type Output: Send + 'static;

    const KIND: QueryKind;

    /// Column order `map_row` expects, mirroring the SELECT list.
    fn columns(&self) -> Vec<&'static str>;

    /// Build the statement. Pure; identical inputs give identical output.
    fn compile(&self) -> CompiledQuery;

    /// Convert one raw row into the typed output.
    fn map_row(&self, row: &Row) -> Result<Self::Output>;

    /// Submit the compiled statement and map each returned row.
    ///
    /// Submission happens on first poll. Dropping the stream abandons the
    /// statement.
    fn execute(self, client: Arc<dyn SqlClient>) -> ResultStream<Self::Output>
    where
        Self: Sized,
    {
        let compiled = <Self as QueryWrapper>::compile(&self);
        debug!(
            kind = %Self::KIND,
            params = compiled.params.len(),
            sql = %compiled.sql,
            "Executing query"
        );
        let rows = stream::once(async move { client.submit(&compiled).await }).try_flatten();
        stop_after_error(rows.map(move |row| {
            row.and_then(|row| <Self as QueryWrapper>::map_row(&self, &row))
        })).boxed()
    }
}

/// End a stream right after the first error it yields.
pub(crate) fn stop_after_error<S, T>(stream: S) -> impl Stream<Item = Result<T>> + Send
where
    S: Stream<Item = Result<T>> + Send,
    T: Send,
{
    stream.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    })
}

/// Output of any registered query kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRecord {
    StorageSize(StorageSize),
    Metadata(MetaRecord),
    Event(EventRecord),
}

/// Object-safe view of a [`QueryWrapper`], used by the registry.
pub trait DynQuery: Send + Sync {
    fn kind(&self) -> QueryKind;
    fn columns(&self) -> Vec<&'static str>;
    fn compile(&self) -> CompiledQuery;
    fn map_row(&self, row: &Row) -> Result<QueryRecord>;
    fn execute(self: Box<Self>, client: Arc<dyn SqlClient>) -> ResultStream<QueryRecord>;
}

impl<W> DynQuery for W
where
    W: QueryWrapper,
    W::Output: Into<QueryRecord>,
{
    fn kind(&self) -> QueryKind {
        W::KIND
    }

    fn columns(&self) -> Vec<&'static str> {
        QueryWrapper::columns(self)
    }

    fn compile(&self) -> CompiledQuery {
        QueryWrapper::compile(self)
    }

    fn map_row(&self, row: &Row) -> Result<QueryRecord> {
        QueryWrapper::map_row(self, row).map(Into::into)
    }

    fn execute(self: Box<Self>, client: Arc<dyn SqlClient>) -> ResultStream<QueryRecord> {
        QueryWrapper::execute(*self, client).map_ok(Into::into).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_compiled_query_params() {
        let q = CompiledQuery::new("SELECT 1")
            .with_param("datasets", "['a']")
            .with_param("from", "2024-01-01 00:00:00.000");
        assert_eq!(q.param("datasets"), Some("['a']"));
        assert_eq!(q.param("to"), None);
        assert_eq!(q.to_string(), "SELECT 1");
    }

    #[tokio::test]
    async fn test_stop_after_error() {
        let items: Vec<Result<u32>> = vec![
            Ok(1),
            Err(StoreError::InvalidRequest("boom".to_string())),
            Ok(2),
        ];
        let out: Vec<Result<u32>> = stop_after_error(stream::iter(items)).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Ok(1)));
        assert!(out[1].is_err());
    }
}
