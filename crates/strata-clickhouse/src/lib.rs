//! Strata ClickHouse - query wrappers over a pooled SQL client
//!
//! This crate compiles typed query descriptions into ClickHouse SQL, runs
//! them through a bounded HTTP connection pool, and maps result rows back
//! into typed records:
//! - Storage accounting (`system.parts` byte sizes)
//! - Dataset/metric metadata listings
//! - Raw time-series event retrieval

pub mod client;
pub mod datastore;
pub mod error;
pub mod metrics;
pub mod queries;
pub mod registry;
pub mod row;
pub mod wrapper;

pub use client::{ClickHouseClient, ClickHouseConfig, RowStream, SqlClient};
pub use datastore::Datastore;
pub use error::{Result, StoreError};
pub use metrics::QueryMetrics;
pub use queries::{
    EventQuery, EventRecord, MetaRecord, MetaValue, MetadataQuery, StorageSize, StorageSizeQuery,
};
pub use registry::{QueryBuilder, QueryKind, QueryRegistry, QueryRequest};
pub use row::{FromColumn, Row};
pub use wrapper::{CompiledQuery, DynQuery, QueryRecord, QueryWrapper, ResultStream};
