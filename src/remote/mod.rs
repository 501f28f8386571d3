//! Remote read federation.
//!
//! Queriers in this module read from remote backends speaking the remote
//! read protocol ([`proto`]). The transport is supplied by the caller as a
//! [`client::ReadClient`].

pub mod client;
pub mod codec;
pub mod filter;
pub mod proto;
pub mod read;

pub use client::{ReadClient, TimeoutClient};
pub use filter::{SeriesFilter, SeriesSetFilter};
pub use read::{
    PreferLocalFilter, RemoteQuerier, RemoteQuerierFactory, StartTimeFn, add_external_labels,
    querier_factory,
};
