//! Physical table-reference resolution.
//!
//! A logical table name becomes either the local reference itself (single
//! node) or a `cluster('<name>', <table>)` table-function call that spans
//! every shard of the named cluster.

use crate::sql::quote_string;

/// Schema the server falls back to for unqualified names.
pub const DEFAULT_SCHEMA: &str = "default";

/// System view listing data parts with their on-disk sizes.
pub const PARTS_CATALOG: &str = "system.parts";

/// Remove a leading `default.` qualifier.
///
/// The system catalogs store bare table names, so this form is what a
/// `table = '...'` filter against them must use. Other schemas are left
/// untouched.
pub fn strip_default_schema(table: &str) -> &str {
    table
        .strip_prefix(DEFAULT_SCHEMA)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|bare| !bare.is_empty())
        .unwrap_or(table)
}

/// Resolve `table` to the reference a statement should read from.
///
/// Malformed cluster names are not validated here; the server rejects them
/// when the statement runs.
pub fn resolve_table(table: &str, cluster: Option<&str>) -> String {
    match cluster.filter(|c| !c.is_empty()) {
        Some(cluster) => format!(
            "cluster({}, {})",
            quote_string(cluster),
            strip_default_schema(table)
        ),
        None => table.to_string(),
    }
}

/// Resolver bound to one cluster setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableResolver {
    cluster: Option<String>,
}

impl TableResolver {
    pub fn new(cluster: Option<&str>) -> Self {
        Self {
            cluster: cluster.filter(|c| !c.is_empty()).map(str::to_string),
        }
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn physical(&self, table: &str) -> String {
        resolve_table(table, self.cluster())
    }

    /// Reference to the parts catalog, cluster-wrapped when needed.
    pub fn parts_catalog(&self) -> String {
        self.physical(PARTS_CATALOG)
    }

    /// Name to compare against the `table` column of a system catalog.
    pub fn catalog_name<'a>(&self, table: &'a str) -> &'a str {
        strip_default_schema(table)
    }
}
