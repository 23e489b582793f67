//! Prometheus counters for query execution.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use std::sync::Arc;

use crate::registry::QueryKind;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct QueryKindLabel(pub QueryKind);

impl prometheus_client::encoding::EncodeLabelSet for QueryKindLabel {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("kind", self.0.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct QueryMetrics {
    pub queries: Family<QueryKindLabel, Counter>,
    pub failures: Family<QueryKindLabel, Counter>,
    pub rows_mapped: Family<QueryKindLabel, Counter>,
    pub registry: Arc<Registry>,
}

impl QueryMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let queries = Family::<QueryKindLabel, Counter>::default();
        registry.register(
            "strata_queries",
            "Queries submitted by kind",
            queries.clone(),
        );

        let failures = Family::<QueryKindLabel, Counter>::default();
        registry.register(
            "strata_query_failures",
            "Queries that ended in an error, by kind",
            failures.clone(),
        );

        let rows_mapped = Family::<QueryKindLabel, Counter>::default();
        registry.register(
            "strata_rows_mapped",
            "Result rows mapped into typed records, by kind",
            rows_mapped.clone(),
        );

        Self {
            queries,
            failures,
            rows_mapped,
            registry: Arc::new(registry),
        }
    }

    pub fn record_query(&self, kind: QueryKind) {
        self.queries.get_or_create(&QueryKindLabel(kind)).inc();
    }

    pub fn record_failure(&self, kind: QueryKind) {
        self.failures.get_or_create(&QueryKindLabel(kind)).inc();
    }

    pub fn record_row(&self, kind: QueryKind) {
        self.rows_mapped.get_or_create(&QueryKindLabel(kind)).inc();
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for QueryMetrics {
    fn default() -> Self {
        Self::new()
    }
}
