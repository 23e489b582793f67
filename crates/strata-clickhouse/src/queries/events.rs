//! Raw time-series points for a set of datasets over a time window.

use chrono::{DateTime, Utc};
use strata_core::sql::{format_param_array, format_param_datetime};
use strata_core::{MetaQuery, StoreConfig, TableResolver, TimeRange};

use crate::error::Result;
use crate::registry::QueryKind;
use crate::row::Row;
use crate::wrapper::{CompiledQuery, QueryRecord, QueryWrapper};

pub const DEFAULT_EVENT_LIMIT: u64 = 10_000;

/// One stored point.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub dataset: String,
    pub metric: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl From<EventRecord> for QueryRecord {
    fn from(r: EventRecord) -> Self {
        QueryRecord::Event(r)
    }
}

/// Points in `[from, to)` for the datasets in the query's range, oldest
/// first, capped at `limit` rows. The projection is not consulted.
#[derive(Debug, Clone)]
pub struct EventQuery {
    meta: MetaQuery,
    range: TimeRange,
    limit: u64,
    table: String,
}

impl EventQuery {
    pub fn new(meta: MetaQuery, range: TimeRange, limit: u64, config: &StoreConfig) -> Self {
        let resolver = TableResolver::new(config.cluster());
        Self {
            meta,
            range,
            limit,
            table: resolver.physical(&config.local_table),
        }
    }

    pub fn meta(&self) -> &MetaQuery {
        &self.meta
    }

    pub fn range(&self) -> &TimeRange {
        &self.range
    }
}

impl QueryWrapper for EventQuery {
    type Output = EventRecord;

    const KIND: QueryKind = QueryKind::Events;

    fn columns(&self) -> Vec<&'static str> {
        vec!["dataset", "metric", "timestamp", "value"]
    }

    fn compile(&self) -> CompiledQuery {
        let sql = format!(
            "SELECT dataset, metric, timestamp, value FROM {table} \
             WHERE dataset IN {{datasets:Array(String)}} \
             AND timestamp >= toDateTime64({{from:String}}, 3, 'UTC') \
             AND timestamp < toDateTime64({{to:String}}, 3, 'UTC') \
             ORDER BY timestamp LIMIT {limit}",
            table = self.table,
            limit = self.limit,
        );
        CompiledQuery::new(sql)
            .with_param("datasets", format_param_array(self.meta.range().iter()))
            .with_param("from", format_param_datetime(&self.range.from))
            .with_param("to", format_param_datetime(&self.range.to))
    }

    fn map_row(&self, row: &Row) -> Result<EventRecord> {
        row.ensure_width(4)?;
        Ok(EventRecord {
            dataset: row.try_get(0)?,
            metric: row.try_get(1)?,
            timestamp: row.try_get(2)?,
            value: row.try_get(3)?,
        })
    }
}
