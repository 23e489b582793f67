//! Store configuration from environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Read-only store settings, built once at startup and shared by every
/// query wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Count compressed rather than uncompressed on-disk bytes by default.
    pub compressed: bool,
    /// Cluster to fan queries out over. `None` = single node.
    pub cluster_name: Option<String>,
    /// The store's own data table, optionally schema-qualified.
    pub local_table: String,
}

impl StoreConfig {
    pub fn new(compressed: bool, cluster_name: Option<String>, local_table: impl Into<String>) -> Self {
        Self {
            compressed,
            cluster_name: cluster_name.filter(|c| !c.trim().is_empty()),
            local_table: local_table.into(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let compressed = match std::env::var("STRATA_COMPRESSED") {
            Ok(v) => parse_flag(&v).context("Invalid STRATA_COMPRESSED")?,
            Err(_) => false,
        };
        Ok(Self::new(
            compressed,
            std::env::var("STRATA_CLUSTER").ok(),
            std::env::var("STRATA_TABLE").unwrap_or_else(|_| "default.metrics".to_string()),
        ))
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }
}

fn parse_flag(v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{}'", other),
    }
}
