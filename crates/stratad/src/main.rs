//! stratad - run Strata queries against a ClickHouse endpoint from the shell.
//!
//! Settings come from `STRATA_*` environment variables; any flag given on the
//! command line overrides its variable.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use futures::TryStreamExt;
use strata_clickhouse::{
    ClickHouseClient, ClickHouseConfig, Datastore, MetaValue, QueryKind, QueryMetrics,
    QueryRegistry, QueryRequest,
};
use strata_core::{DataRange, MetaField, MetaQuery, StoreConfig, TimeRange};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stratad", about = "Strata column-store query layer")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// ClickHouse HTTP endpoint
    #[arg(long, global = true)]
    url: Option<String>,

    /// Database for unqualified names
    #[arg(long, global = true)]
    database: Option<String>,

    /// Cluster to fan queries out over (empty for single node)
    #[arg(long, global = true)]
    cluster: Option<String>,

    /// The store's data table, e.g. default.metrics
    #[arg(long, global = true)]
    table: Option<String>,

    /// Maximum concurrent statements
    #[arg(long, global = true)]
    pool_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct Selection {
    /// Dataset identifier (repeatable)
    #[arg(long = "dataset")]
    datasets: Vec<String>,

    /// Metadata field to project (repeatable): dataset, metric, first_seen, last_seen
    #[arg(long = "field")]
    fields: Vec<MetaField>,
}

impl Selection {
    fn meta_query(&self) -> MetaQuery {
        let fields = if self.fields.is_empty() {
            vec![MetaField::Dataset, MetaField::Metric]
        } else {
            self.fields.clone()
        };
        MetaQuery::new(DataRange::new(self.datasets.iter().map(String::as_str)), fields)
    }
}

#[derive(Args, Clone)]
struct Window {
    /// Inclusive start, RFC 3339
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Exclusive end, RFC 3339
    #[arg(long)]
    to: Option<DateTime<Utc>>,

    /// Maximum events to return
    #[arg(long)]
    limit: Option<u64>,
}

impl Window {
    fn time_range(&self) -> Result<TimeRange> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Ok(TimeRange::new(from, to)),
            _ => anyhow::bail!("--from and --to are both required"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Report the on-disk size of the store's table
    StorageSize {
        /// Count compressed bytes
        #[arg(long, conflicts_with = "uncompressed")]
        compressed: bool,

        /// Count uncompressed bytes
        #[arg(long)]
        uncompressed: bool,
    },

    /// List datasets and metrics
    Metadata {
        #[command(flatten)]
        selection: Selection,
    },

    /// Fetch raw events in a time window
    Events {
        #[command(flatten)]
        selection: Selection,

        #[command(flatten)]
        window: Window,
    },

    /// Print the SQL a query would run, without running it
    Compile {
        /// storage-size, metadata or events
        kind: QueryKind,

        /// Count compressed bytes (storage-size)
        #[arg(long)]
        compressed: Option<bool>,

        #[command(flatten)]
        selection: Selection,

        #[command(flatten)]
        window: Window,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut store_config = StoreConfig::from_env()?;
    if let Some(cluster) = &cli.cluster {
        store_config = StoreConfig::new(store_config.compressed, Some(cluster.clone()), store_config.local_table);
    }
    if let Some(table) = &cli.table {
        store_config.local_table = table.clone();
    }

    let mut ch_config = ClickHouseConfig::from_env()?;
    if let Some(url) = cli.url.clone() {
        ch_config.url = url;
    }
    if let Some(database) = cli.database.clone() {
        ch_config.database = Some(database);
    }
    if let Some(pool_size) = cli.pool_size {
        ch_config.max_connections = pool_size;
    }
    debug!(?store_config, ?ch_config, "Resolved configuration");

    let client = ClickHouseClient::new(ch_config).context("Failed to create ClickHouse client")?;
    let store = Datastore::new(
        Arc::new(store_config),
        Arc::new(client),
        Arc::new(QueryRegistry::builtin()),
        QueryMetrics::new(),
    );
    info!(
        table = %store.config().local_table,
        cluster = ?store.config().cluster(),
        "Datastore ready"
    );

    match cli.command {
        Commands::StorageSize {
            compressed,
            uncompressed,
        } => {
            let compressed = compressed || (!uncompressed && store.config().compressed);
            let mut sizes = store.get_storage_size(compressed);
            while let Some(size) = sizes.try_next().await? {
                println!("{}\t{}", size.name, size.bytes);
            }
        }
        Commands::Metadata { selection } => {
            let mut records = store.get_metadata(selection.meta_query())?;
            while let Some(record) = records.try_next().await? {
                let cells: Vec<String> = record.values.iter().map(|(_, v)| format_value(v)).collect();
                println!("{}", cells.join("\t"));
            }
        }
        Commands::Events { selection, window } => {
            let range = window.time_range()?;
            let mut events = store.get_events(selection.meta_query(), range, window.limit);
            while let Some(event) = events.try_next().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    event.timestamp.to_rfc3339(),
                    event.dataset,
                    event.metric,
                    event.value
                );
            }
        }
        Commands::Compile {
            kind,
            compressed,
            selection,
            window,
        } => {
            let req = build_request(kind, compressed, &selection, &window)?;
            let compiled = store.compile(&req)?;
            println!("{}", compiled.sql);
            for (name, value) in &compiled.params {
                println!("-- {} = {}", name, value);
            }
            return Ok(());
        }
    }

    debug!("Query metrics:\n{}", store.metrics().encode()?);
    Ok(())
}

fn build_request(
    kind: QueryKind,
    compressed: Option<bool>,
    selection: &Selection,
    window: &Window,
) -> Result<QueryRequest> {
    let req = match kind {
        QueryKind::StorageSize => QueryRequest {
            compressed,
            ..QueryRequest::new(kind, MetaQuery::sentinel())
        },
        QueryKind::Metadata => QueryRequest::metadata(selection.meta_query()),
        QueryKind::Events => {
            QueryRequest::events(selection.meta_query(), window.time_range()?, window.limit)
        }
    };
    Ok(req)
}

fn format_value(value: &MetaValue) -> String {
    match value {
        MetaValue::Text(s) => s.clone(),
        MetaValue::Time(t) => t.to_rfc3339(),
    }
}

