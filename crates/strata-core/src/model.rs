//! Query model — immutable descriptions of what a caller wants.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The set of dataset identifiers a query is scoped to.
///
/// An empty range is legal and means "no datasets". Identifiers are kept
/// sorted so anything derived from the range is stable across calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRange {
    datasets: BTreeSet<String>,
}

impl DataRange {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new<I, S>(datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            datasets: datasets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.datasets.contains(dataset)
    }

    /// Dataset identifiers in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.datasets.iter().map(String::as_str)
    }
}

/// A selectable metadata attribute of a dataset/metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaField {
    Dataset,
    Metric,
    FirstSeen,
    LastSeen,
}

impl MetaField {
    pub const ALL: [MetaField; 4] = [
        MetaField::Dataset,
        MetaField::Metric,
        MetaField::FirstSeen,
        MetaField::LastSeen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetaField::Dataset => "dataset",
            MetaField::Metric => "metric",
            MetaField::FirstSeen => "first_seen",
            MetaField::LastSeen => "last_seen",
        }
    }

    /// Whether the attribute is an aggregate over the matching rows rather
    /// than a grouping key.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, MetaField::FirstSeen | MetaField::LastSeen)
    }
}

impl fmt::Display for MetaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetaField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetaField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown meta field '{}'", s))
    }
}

/// A data range plus a field projection: the generic query intent.
///
/// Construction never fails; wrappers decide at compile time what a given
/// shape means for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaQuery {
    range: DataRange,
    fields: Vec<MetaField>,
}

impl MetaQuery {
    pub fn new(range: DataRange, fields: Vec<MetaField>) -> Self {
        Self { range, fields }
    }

    /// The vacuous query: no datasets, a single-field projection.
    ///
    /// Used by store-wide queries that need a `MetaQuery` but do not filter
    /// by dataset.
    pub fn sentinel() -> Self {
        Self {
            range: DataRange::empty(),
            fields: vec![MetaField::Metric],
        }
    }

    pub fn range(&self) -> &DataRange {
        &self.range
    }

    pub fn fields(&self) -> &[MetaField] {
        &self.fields
    }
}

/// A half-open `[from, to)` time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }
}
