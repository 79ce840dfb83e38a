//! # Node data collection
//!
//! Collection of a single record set is split into three independent data sources,
//! orchestrated by the [`Collector`] pipeline:
//!
//! - [`resolver`] maps node identifiers to on-chain account addresses with a single
//!   batched contract call;
//! - [`peer`] retrieves liveness and score counters from the peer status service;
//! - [`prober`] determines how long ago an address was last active using
//!   blockchain explorer transaction listings.
//!
//! The monitored node roster is loaded with [`roster::load`].
//!
//! [`Collector`]: pipeline::Collector

/// HTTP client construction.
pub mod http;

/// Peer status service client.
pub mod peer;

/// Collection pipeline.
pub mod pipeline;

/// Transaction activity prober.
pub mod prober;

/// Node identifier to address resolution.
pub mod resolver;

/// Node roster loading.
pub mod roster;

#[cfg(test)]
mod testing;

pub use pipeline::{Collection, Collector};
