//! Strata Core - query model and store plumbing
//!
//! This crate holds the backend-agnostic pieces of the column-store query
//! layer: the query model handed in by callers, the store configuration read
//! at startup, table-reference resolution, and SQL literal helpers.

pub mod config;
pub mod model;
pub mod sql;
pub mod table;

pub use config::StoreConfig;
pub use model::{DataRange, MetaField, MetaQuery, TimeRange};
pub use table::{resolve_table, strip_default_schema, TableResolver, DEFAULT_SCHEMA, PARTS_CATALOG};
