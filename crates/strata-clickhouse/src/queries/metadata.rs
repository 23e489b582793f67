//! Metadata listing — distinct datasets/metrics and their time extents.

use chrono::{DateTime, Utc};
use strata_core::sql::format_param_array;
use strata_core::{MetaField, MetaQuery, StoreConfig, TableResolver};

use crate::error::{Result, StoreError};
use crate::registry::QueryKind;
use crate::row::Row;
use crate::wrapper::{CompiledQuery, QueryRecord, QueryWrapper};

/// Value of one projected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    Text(String),
    Time(DateTime<Utc>),
}

/// One metadata row, in projection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub values: Vec<(MetaField, MetaValue)>,
}

impl MetaRecord {
    pub fn get(&self, field: MetaField) -> Option<&MetaValue> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v)
    }

    pub fn text(&self, field: MetaField) -> Option<&str> {
        match self.get(field)? {
            MetaValue::Text(s) => Some(s),
            MetaValue::Time(_) => None,
        }
    }

    pub fn time(&self, field: MetaField) -> Option<DateTime<Utc>> {
        match self.get(field)? {
            MetaValue::Time(t) => Some(*t),
            MetaValue::Text(_) => None,
        }
    }
}

impl From<MetaRecord> for QueryRecord {
    fn from(r: MetaRecord) -> Self {
        QueryRecord::Metadata(r)
    }
}

fn select_expr(field: MetaField) -> &'static str {
    match field {
        MetaField::Dataset => "dataset",
        MetaField::Metric => "metric",
        MetaField::FirstSeen => "min(timestamp)",
        MetaField::LastSeen => "max(timestamp)",
    }
}

/// Lists the projected metadata fields for every dataset in the range.
///
/// Grouping keys (`dataset`, `metric`) are deduplicated with `GROUP BY` and
/// ordered; time extents are aggregated per group. Dataset identifiers are
/// bound as an `Array(String)` parameter.
#[derive(Debug, Clone)]
pub struct MetadataQuery {
    meta: MetaQuery,
    table: String,
}

impl MetadataQuery {
    pub fn new(meta: MetaQuery, config: &StoreConfig) -> Result<Self> {
        if meta.fields().is_empty() {
            return Err(StoreError::InvalidRequest(
                "metadata query needs at least one field".to_string(),
            ));
        }
        let resolver = TableResolver::new(config.cluster());
        Ok(Self {
            meta,
            table: resolver.physical(&config.local_table),
        })
    }

    pub fn meta(&self) -> &MetaQuery {
        &self.meta
    }
}

impl QueryWrapper for MetadataQuery {
    type Output = MetaRecord;

    const KIND: QueryKind = QueryKind::Metadata;

    fn columns(&self) -> Vec<&'static str> {
        self.meta.fields().iter().map(|f| f.as_str()).collect()
    }

    fn compile(&self) -> CompiledQuery {
        let fields = self.meta.fields();
        let select = fields
            .iter()
            .map(|f| select_expr(*f))
            .collect::<Vec<_>>()
            .join(", ");
        let keys = fields
            .iter()
            .filter(|f| !f.is_aggregate())
            .map(|f| select_expr(*f))
            .collect::<Vec<_>>();

        let mut sql = format!(
            "SELECT {} FROM {} WHERE dataset IN {{datasets:Array(String)}}",
            select, self.table
        );
        if !keys.is_empty() {
            let keys = keys.join(", ");
            sql.push_str(&format!(" GROUP BY {keys} ORDER BY {keys}"));
        }

        CompiledQuery::new(sql).with_param("datasets", format_param_array(self.meta.range().iter()))
    }

    fn map_row(&self, row: &Row) -> Result<MetaRecord> {
        let fields = self.meta.fields();
        row.ensure_width(fields.len())?;
        let values = fields
            .iter()
            .enumerate()
            .map(|(i, field)| -> Result<(MetaField, MetaValue)> {
                let value = if field.is_aggregate() {
                    MetaValue::Time(row.try_get(i)?)
                } else {
                    MetaValue::Text(row.try_get(i)?)
                };
                Ok((*field, value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MetaRecord { values })
    }
}
