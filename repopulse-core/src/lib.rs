//! # repopulse-core
//!
//! Core library for repopulse - community health metrics for code repositories.
//!
//! This library provides:
//! - Domain types for event records, datasets, buckets and points
//! - A dataset cache fed by background producers and read by polling consumers
//! - Pure aggregations (bucket counts, open-item counts, ratios, joins)
//! - The dashboard charts built on top of them
//! - A SQLite event snapshot, configuration and logging
//!
//! ## Architecture
//!
//! Data flows through three stages:
//! - **Producers:** materialize a [`Dataset`] for a domain and repository set
//! - **Cache:** runs each producer once per key in the background and serves
//!   the immutable result to every consumer
//! - **Charts:** poll the cache, aggregate, and hand [`ChartData`] to a renderer
//!
//! ## Example
//!
//! ```rust,no_run
//! use repopulse_core::{render_chart, ChartRequest, Config, DatasetCache};
//! use repopulse_core::{Granularity, SqliteProducer, Visualization};
//! use std::sync::Arc;
//!
//! # async fn run() -> repopulse_core::Result<()> {
//! let config = Config::load()?;
//! let producer = SqliteProducer::open(&config.event_database_path())?;
//! let cache = DatasetCache::on_current_runtime(Arc::new(producer))?;
//!
//! let request = ChartRequest::new(vec![1, 2], Granularity::Month);
//! let policy = config.cache.poll_policy();
//! let chart = render_chart(&cache, Visualization::ClosureRatio, &request, &policy).await;
//! println!("{}", serde_json::to_string_pretty(&chart)?);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use analytics::{ChartData, Series, SeriesPoint};
pub use cache::{
    fetch, fetch_all, CacheEntry, CacheId, CacheKey, CacheStats, CacheStatus, DatasetCache,
    NoDataReason, PollPolicy, Retrieval,
};
pub use config::Config;
pub use db::{Database, SqliteProducer};
pub use error::{Error, Result};
pub use producer::{MemoryProducer, Producer};
pub use types::*;
pub use visualizations::{render_chart, ChartRequest, Visualization};

// Public modules
pub mod analytics;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod producer;
pub mod types;
pub mod visualizations;
