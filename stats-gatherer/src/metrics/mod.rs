mod membership;
mod message_volume;
pub(crate) mod timestamp;

pub use membership::MembershipSnapshot;
pub use message_volume::MessageVolumeSnapshot;

use chrono::{
    DateTime,
    Utc,
};
use serde::{
    de::DeserializeOwned,
    Serialize,
};

/// The persisted time series. Each one is backed by its own file in the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum SeriesId {
    Membership,
    MessageVolume,
}

impl SeriesId {
    pub fn file_name(&self) -> &'static str {
        match self {
            SeriesId::Membership => "member_count.json",
            SeriesId::MessageVolume => "messages.json",
        }
    }
}

/// An entry of a series.
pub trait Snapshot: Serialize + DeserializeOwned {
    const SERIES: SeriesId;

    fn timestamp(&self) -> DateTime<Utc>;
}

/// The result of one collection: one snapshot per series sharing the same timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedSnapshots {
    pub membership: MembershipSnapshot,
    pub message_volume: MessageVolumeSnapshot,
    pub channels: ChannelScan,
}

/// How the text channels of the guild fared during a message volume collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelScan {
    pub scanned: usize,
    /// Channels skipped because the bot may not read their history.
    pub skipped: usize,
    /// Channels whose enumeration failed and contributed nothing.
    pub failed: usize,
}
