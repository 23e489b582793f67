//! Storage accounting — on-disk bytes of the store's data table.

use strata_core::sql::quote_string;
use strata_core::{MetaQuery, StoreConfig, TableResolver};

use crate::error::Result;
use crate::registry::QueryKind;
use crate::row::Row;
use crate::wrapper::{CompiledQuery, QueryRecord, QueryWrapper};

pub const COMPRESSED_BYTES: &str = "data_compressed_bytes";
pub const UNCOMPRESSED_BYTES: &str = "data_uncompressed_bytes";

/// Byte size of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSize {
    pub name: String,
    pub bytes: i64,
}

impl StorageSize {
    pub fn into_pair(self) -> (String, i64) {
        (self.name, self.bytes)
    }
}

impl From<StorageSize> for QueryRecord {
    fn from(s: StorageSize) -> Self {
        QueryRecord::StorageSize(s)
    }
}

/// Sums part sizes from `system.parts` for the store's local table.
///
/// Carries a `MetaQuery` like every wrapper but never reads it; the
/// sentinel is the usual input.
#[derive(Debug, Clone)]
pub struct StorageSizeQuery {
    meta: MetaQuery,
    compressed: bool,
    catalog: String,
    table: String,
}

impl StorageSizeQuery {
    pub fn new(meta: MetaQuery, config: &StoreConfig, compressed: bool) -> Self {
        let resolver = TableResolver::new(config.cluster());
        Self {
            meta,
            compressed,
            catalog: resolver.parts_catalog(),
            table: resolver.catalog_name(&config.local_table).to_string(),
        }
    }

    /// Store-wide accounting built on the sentinel query.
    pub fn for_store(config: &StoreConfig, compressed: bool) -> Self {
        Self::new(MetaQuery::sentinel(), config, compressed)
    }

    pub fn meta(&self) -> &MetaQuery {
        &self.meta
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    fn bytes_column(&self) -> &'static str {
        if self.compressed {
            COMPRESSED_BYTES
        } else {
            UNCOMPRESSED_BYTES
        }
    }
}

impl QueryWrapper for StorageSizeQuery {
    type Output = StorageSize;

    const KIND: QueryKind = QueryKind::StorageSize;

    fn columns(&self) -> Vec<&'static str> {
        vec!["table", self.bytes_column()]
    }

    fn compile(&self) -> CompiledQuery {
        CompiledQuery::new(format!(
            "SELECT table, sum({bytes}) FROM {catalog} WHERE table = {table} GROUP BY table",
            bytes = self.bytes_column(),
            catalog = self.catalog,
            table = quote_string(&self.table),
        ))
    }

    fn map_row(&self, row: &Row) -> Result<StorageSize> {
        row.ensure_width(2)?;
        Ok(StorageSize {
            name: row.try_get(0)?,
            bytes: row.try_get(1)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use serde_json::json;
    use strata_core::{DataRange, MetaField};

    fn config(cluster: Option<&str>, table: &str) -> StoreConfig {
        StoreConfig::new(false, cluster.map(str::to_string), table)
    }

    fn sql(cluster: Option<&str>, table: &str, compressed: bool) -> String {
        StorageSizeQuery::for_store(&config(cluster, table), compressed)
            .compile()
            .sql
    }

    #[test]
    fn test_single_node_uncompressed() {
        assert_eq!(
            sql(None, "default.humidity", false),
            "SELECT table, sum(data_uncompressed_bytes) FROM system.parts \
             WHERE table = 'humidity' GROUP BY table"
        );
    }

    #[test]
    fn test_cluster_wraps_catalog() {
        assert_eq!(
            sql(Some("iot"), "default.metrics", true),
            "SELECT table, sum(data_compressed_bytes) FROM cluster('iot', system.parts) \
             WHERE table = 'metrics' GROUP BY table"
        );
    }

    #[test]
    fn test_empty_cluster_name_is_single_node() {
        let s = sql(Some(""), "default.humidity", false);
        assert!(!s.contains("cluster("));
        assert!(s.contains("FROM system.parts"));
    }

    #[test]
    fn test_compile_is_deterministic() {
        for cluster in [None, Some("a"), Some("prod_cluster")] {
            for compressed in [true, false] {
                let q = StorageSizeQuery::for_store(&config(cluster, "default.metrics"), compressed);
                assert_eq!(q.compile(), q.compile());
                assert_eq!(
                    q.compile(),
                    StorageSizeQuery::for_store(&config(cluster, "default.metrics"), compressed).compile()
                );
            }
        }
    }

    #[test]
    fn test_flag_changes_only_the_bytes_column() {
        let compressed = sql(Some("c1"), "default.metrics", true);
        let uncompressed = sql(Some("c1"), "default.metrics", false);
        assert_ne!(compressed, uncompressed);
        assert_eq!(
            compressed.replace(COMPRESSED_BYTES, UNCOMPRESSED_BYTES),
            uncompressed
        );
    }

    #[test]
    fn test_config_flag_is_not_consulted() {
        let mut cfg = config(None, "metrics");
        cfg.compressed = true;
        let q = StorageSizeQuery::for_store(&cfg, false);
        assert!(q.compile().sql.contains(UNCOMPRESSED_BYTES));
        assert!(!q.compressed());
    }

    #[test]
    fn test_meta_query_content_is_ignored() {
        let cfg = config(Some("c1"), "default.metrics");
        let sentinel = StorageSizeQuery::for_store(&cfg, true);
        let scoped = StorageSizeQuery::new(
            MetaQuery::new(
                DataRange::new(["sensor-1", "sensor-2"]),
                vec![MetaField::Dataset, MetaField::LastSeen],
            ),
            &cfg,
            true,
        );
        assert_eq!(sentinel.compile(), scoped.compile());
        assert!(sentinel.compile().params.is_empty());
        assert_eq!(sentinel.meta(), &MetaQuery::sentinel());
    }

    #[test]
    fn test_columns_follow_select_list() {
        let q = StorageSizeQuery::for_store(&config(None, "metrics"), true);
        assert_eq!(q.columns(), vec!["table", "data_compressed_bytes"]);
    }

    #[test]
    fn test_map_row_roundtrip() {
        let q = StorageSizeQuery::for_store(&config(None, "metrics"), false);
        let row = Row::new(vec![json!("temperature"), json!(10485760)]);
        let size = q.map_row(&row).unwrap();
        assert_eq!(size.into_pair(), ("temperature".to_string(), 10_485_760_i64));
    }

    #[test]
    fn test_map_row_keeps_64_bit_values() {
        let q = StorageSizeQuery::for_store(&config(None, "metrics"), false);
        let row = Row::new(vec![json!("metrics"), json!(5_000_000_000_000_i64)]);
        assert_eq!(q.map_row(&row).unwrap().bytes, 5_000_000_000_000);
    }

    #[test]
    fn test_map_row_rejects_wrong_shape() {
        let q = StorageSizeQuery::for_store(&config(None, "metrics"), false);
        let short = Row::new(vec![json!("metrics")]);
        assert!(matches!(
            q.map_row(&short),
            Err(StoreError::RowShape { expected: 2, found: 1 })
        ));
        let swapped = Row::new(vec![json!(1), json!("metrics")]);
        assert!(matches!(
            q.map_row(&swapped),
            Err(StoreError::Column { index: 0, .. })
        ));
    }
}
