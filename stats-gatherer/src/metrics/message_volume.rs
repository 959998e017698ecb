use super::{
    timestamp,
    SeriesId,
    Snapshot,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Number of messages posted in the guild's readable text channels during the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageVolumeSnapshot {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "messages_last_10min")]
    pub messages_last_window: u64,
}

impl Snapshot for MessageVolumeSnapshot {
    const SERIES: SeriesId = SeriesId::MessageVolume;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
