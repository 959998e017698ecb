//! # Guild Pulse Stats Gatherer
//!
//! Takes snapshots of a guild's activity and keeps them as time series on disk.
//!
//! - **`metrics`**: the snapshot types and the series they belong to
//! - **`collectors`**: turn the live state of the guild into snapshots, tolerating unreadable channels
//! - **`store`**: append-only JSON array files written atomically

#[macro_use]
extern crate tracing;

pub mod collectors;
mod error;
pub mod metrics;
pub mod store;

pub use collectors::*;
pub use error::CollectError;
pub use metrics::*;
pub use store::{
    RecordStore,
    StoreError,
};
