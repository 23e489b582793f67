//! Query registry — a fixed lookup from query kind to wrapper builder.
//!
//! Built once at startup and shared read-only. Callers describe what they
//! want with a [`QueryRequest`]; the registry picks the builder for its kind
//! and hands back a type-erased wrapper ready to compile or execute.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strata_core::{MetaQuery, StoreConfig, TimeRange};

use crate::error::{Result, StoreError};
use crate::queries::{EventQuery, MetadataQuery, StorageSizeQuery, DEFAULT_EVENT_LIMIT};
use crate::wrapper::DynQuery;

/// The closed set of query shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    StorageSize,
    Metadata,
    Events,
}

impl QueryKind {
    pub const ALL: [QueryKind; 3] = [QueryKind::StorageSize, QueryKind::Metadata, QueryKind::Events];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::StorageSize => "storage_size",
            QueryKind::Metadata => "metadata",
            QueryKind::Events => "events",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.replace('-', "_");
        QueryKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| format!("unknown query kind '{}'", s))
    }
}

/// Everything a caller can say about a query.
///
/// Only the fields the chosen kind reads matter; the rest are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub kind: QueryKind,
    #[serde(default = "MetaQuery::sentinel")]
    pub meta: MetaQuery,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Overrides the store's default accounting mode for storage queries.
    #[serde(default)]
    pub compressed: Option<bool>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl QueryRequest {
    pub fn new(kind: QueryKind, meta: MetaQuery) -> Self {
        Self {
            kind,
            meta,
            time_range: None,
            compressed: None,
            limit: None,
        }
    }

    pub fn storage_size(compressed: bool) -> Self {
        Self {
            compressed: Some(compressed),
            ..Self::new(QueryKind::StorageSize, MetaQuery::sentinel())
        }
    }

    pub fn metadata(meta: MetaQuery) -> Self {
        Self::new(QueryKind::Metadata, meta)
    }

    pub fn events(meta: MetaQuery, time_range: TimeRange, limit: Option<u64>) -> Self {
        Self {
            time_range: Some(time_range),
            limit,
            ..Self::new(QueryKind::Events, meta)
        }
    }
}

/// Turns a request into a wrapper for one kind.
pub type QueryBuilder = fn(&QueryRequest, &StoreConfig) -> Result<Box<dyn DynQuery>>;

fn build_storage_size(req: &QueryRequest, config: &StoreConfig) -> Result<Box<dyn DynQuery>> {
    let compressed = req.compressed.unwrap_or(config.compressed);
    Ok(Box::new(StorageSizeQuery::new(req.meta.clone(), config, compressed)))
}

fn build_metadata(req: &QueryRequest, config: &StoreConfig) -> Result<Box<dyn DynQuery>> {
    Ok(Box::new(MetadataQuery::new(req.meta.clone(), config)?))
}

fn build_events(req: &QueryRequest, config: &StoreConfig) -> Result<Box<dyn DynQuery>> {
    let range = req
        .time_range
        .ok_or_else(|| StoreError::InvalidRequest("events query needs a time range".to_string()))?;
    Ok(Box::new(EventQuery::new(
        req.meta.clone(),
        range,
        req.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
        config,
    )))
}

pub struct QueryRegistry {
    builders: HashMap<QueryKind, QueryBuilder>,
}

impl QueryRegistry {
    pub fn new(builders: HashMap<QueryKind, QueryBuilder>) -> Self {
        Self { builders }
    }

    /// Registry with every built-in query kind.
    pub fn builtin() -> Self {
        let mut builders: HashMap<QueryKind, QueryBuilder> = HashMap::new();
        builders.insert(QueryKind::StorageSize, build_storage_size);
        builders.insert(QueryKind::Metadata, build_metadata);
        builders.insert(QueryKind::Events, build_events);
        Self::new(builders)
    }

    pub fn supports(&self, kind: QueryKind) -> bool {
        self.builders.contains_key(&kind)
    }

    pub fn build(&self, req: &QueryRequest, config: &StoreConfig) -> Result<Box<dyn DynQuery>> {
        let builder = self
            .builders
            .get(&req.kind)
            .ok_or(StoreError::UnknownQueryKind(req.kind))?;
        builder(req, config)
    }
}

impl fmt::Debug for QueryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.builders.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("QueryRegistry").field("kinds", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use strata_core::{DataRange, MetaField};

    fn config() -> StoreConfig {
        StoreConfig::new(true, Some("iot".to_string()), "default.metrics")
    }

    #[test]
    fn test_kind_parse_and_display() {
        assert_eq!("storage-size".parse::<QueryKind>().unwrap(), QueryKind::StorageSize);
        assert_eq!("events".parse::<QueryKind>().unwrap(), QueryKind::Events);
        assert!("aggregate".parse::<QueryKind>().is_err());
        assert_eq!(QueryKind::Metadata.to_string(), "metadata");
    }

    #[test]
    fn test_builtin_covers_every_kind() {
        let registry = QueryRegistry::builtin();
        for kind in QueryKind::ALL {
            assert!(registry.supports(kind));
        }
    }

    #[test]
    fn test_build_dispatches_by_kind() {
        let registry = QueryRegistry::builtin();
        let query = registry.build(&QueryRequest::storage_size(false), &config()).unwrap();
        assert_eq!(query.kind(), QueryKind::StorageSize);
        assert!(query.compile().sql.contains("data_uncompressed_bytes"));
    }

    #[test]
    fn test_storage_size_defaults_to_store_mode() {
        let registry = QueryRegistry::builtin();
        let req = QueryRequest::new(QueryKind::StorageSize, MetaQuery::sentinel());
        let query = registry.build(&req, &config()).unwrap();
        assert!(query.compile().sql.contains("data_compressed_bytes"));
    }

    #[test]
    fn test_events_require_time_range() {
        let registry = QueryRegistry::builtin();
        let req = QueryRequest::new(QueryKind::Events, MetaQuery::sentinel());
        assert!(matches!(
            registry.build(&req, &config()),
            Err(StoreError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_events_default_limit() {
        let registry = QueryRegistry::builtin();
        let range = strata_core::TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        );
        let req = QueryRequest::events(
            MetaQuery::new(DataRange::new(["a"]), vec![MetaField::Metric]),
            range,
            None,
        );
        let query = registry.build(&req, &config()).unwrap();
        assert!(query.compile().sql.ends_with("LIMIT 10000"));
        assert_eq!(query.columns(), vec!["dataset", "metric", "timestamp", "value"]);
    }

    #[test]
    fn test_unregistered_kind() {
        let registry = QueryRegistry::new(HashMap::new());
        let err = registry
            .build(&QueryRequest::storage_size(true), &config())
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::UnknownQueryKind(QueryKind::StorageSize)));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: QueryRequest = serde_json::from_str(r#"{"kind":"storage_size"}"#).unwrap();
        assert_eq!(req.meta, MetaQuery::sentinel());
        assert_eq!(req.compressed, None);
        assert_eq!(req.time_range, None);
    }
}
