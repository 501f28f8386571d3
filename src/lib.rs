//! TSDB Federation - a storage federation layer for a Prometheus-like
//! monitoring server.
//!
//! A query engine reads series through one [`storage::Querier`] contract
//! whether they come from the embedded local engine or from a remote read
//! backend.
//!
//! # Architecture
//!
//! - [`local::LocalStorage`] adapts the embedded [`engine::Db`]: it translates
//!   matchers and labels at the boundary ([`convert`]) and maps engine write
//!   errors onto the stable [`Error`] taxonomy.
//! - [`remote`] builds queriers over a [`remote::ReadClient`]. External labels
//!   are injected as matchers and stripped from results, and
//!   [`remote::PreferLocalFilter`] keeps remote reads to ranges older than the
//!   local data.
//! - [`admin`] exposes reload, snapshot and series deletion over HTTP.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tsdb_federation::{LocalStorage, MemoryDb, Matcher, Storage, QuerierFactory};
//! use tsdb_federation::config::StorageOptions;
//! use tsdb_federation::logging::TracingSink;
//!
//! let db = MemoryDb::open(&StorageOptions::default(), Arc::new(TracingSink));
//! let storage = LocalStorage::new(db);
//! let querier = storage.querier(ctx, 0, i64::MAX).await?;
//! let mut set = querier.select(&[Matcher::equal("job", "api")]).await;
//! while set.next() {
//!     println!("{}", set.at().labels());
//! }
//! ```

pub mod admin;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod local;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod remote;
pub mod storage;

pub use engine::memory::MemoryDb;
pub use error::{Error, Result};
pub use local::{LocalStorage, map_engine_error};
pub use model::{Label, Labels, MatchType, Matcher, Sample, SeriesRef};
pub use storage::{
    Appender, Querier, QuerierFactory, Series, SeriesIterator, SeriesSet, Storage,
};
