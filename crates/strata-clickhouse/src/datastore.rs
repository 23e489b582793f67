//! Datastore facade — the typed query operations other services call.

use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use strata_core::{MetaQuery, StoreConfig, TimeRange};
use tracing::warn;

use crate::client::SqlClient;
use crate::error::Result;
use crate::metrics::QueryMetrics;
use crate::queries::{
    EventQuery, EventRecord, MetaRecord, MetadataQuery, StorageSize, StorageSizeQuery,
    DEFAULT_EVENT_LIMIT,
};
use crate::registry::{QueryKind, QueryRegistry, QueryRequest};
use crate::wrapper::{CompiledQuery, DynQuery, QueryRecord, QueryWrapper, ResultStream};

/// Entry point wiring store configuration, the pooled client and the query
/// registry together. Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct Datastore {
    config: Arc<StoreConfig>,
    client: Arc<dyn SqlClient>,
    registry: Arc<QueryRegistry>,
    metrics: QueryMetrics,
}

impl Datastore {
    pub fn new(
        config: Arc<StoreConfig>,
        client: Arc<dyn SqlClient>,
        registry: Arc<QueryRegistry>,
        metrics: QueryMetrics,
    ) -> Self {
        Self {
            config,
            client,
            registry,
            metrics,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &QueryMetrics {
        &self.metrics
    }

    /// On-disk size of the store's table, compressed or uncompressed.
    pub fn get_storage_size(&self, compressed: bool) -> ResultStream<StorageSize> {
        self.run_wrapper(StorageSizeQuery::for_store(&self.config, compressed))
    }

    pub fn get_metadata(&self, meta: MetaQuery) -> Result<ResultStream<MetaRecord>> {
        Ok(self.run_wrapper(MetadataQuery::new(meta, &self.config)?))
    }

    pub fn get_events(
        &self,
        meta: MetaQuery,
        range: TimeRange,
        limit: Option<u64>,
    ) -> ResultStream<EventRecord> {
        self.run_wrapper(EventQuery::new(
            meta,
            range,
            limit.unwrap_or(DEFAULT_EVENT_LIMIT),
            &self.config,
        ))
    }

    /// Run any registered query kind.
    pub fn run(&self, req: &QueryRequest) -> Result<ResultStream<QueryRecord>> {
        let query = self.registry.build(req, &self.config)?;
        let kind = query.kind();
        Ok(self.instrument(kind, query.execute(Arc::clone(&self.client))))
    }

    /// Compile a request without executing it.
    pub fn compile(&self, req: &QueryRequest) -> Result<CompiledQuery> {
        Ok(self.registry.build(req, &self.config)?.compile())
    }

    fn run_wrapper<W: QueryWrapper>(&self, wrapper: W) -> ResultStream<W::Output> {
        self.instrument(W::KIND, QueryWrapper::execute(wrapper, Arc::clone(&self.client)))
    }

    /// Counts the query on first poll, then every mapped row and failure.
    fn instrument<T: Send + 'static>(&self, kind: QueryKind, rows: ResultStream<T>) -> ResultStream<T> {
        let on_start = self.metrics.clone();
        let on_row = self.metrics.clone();
        let on_err = self.metrics.clone();
        stream::once(async move {
            on_start.record_query(kind);
            rows
        })
        .flatten()
        .inspect_ok(move |_| on_row.record_row(kind))
        .inspect_err(move |e| {
            warn!(%kind, "Query failed: {}", e);
            on_err.record_failure(kind);
        })
        .boxed()
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}
