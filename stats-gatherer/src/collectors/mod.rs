//! # Collectors
//!
//! - **`Collector` trait**: one kind of snapshot taken from a resolved guild
//! - **`MembershipCollector`**: roster size and online members
//! - **`MessageVolumeCollector`**: messages posted during the lookback window, channel by channel
//! - **`MetricsCollector`**: resolves the guild and drives the collectors with one shared timestamp

pub mod collector;
pub mod membership_collector;
pub mod message_volume_collector;
pub mod orchestrator;

pub use collector::{
    CollectFuture,
    Collector,
};
pub use membership_collector::MembershipCollector;
pub use message_volume_collector::MessageVolumeCollector;
pub use orchestrator::MetricsCollector;
