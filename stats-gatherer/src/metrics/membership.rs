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

/// Roster size and the number of members with a presence other than offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    pub total_members: u64,
    pub online_members: u64,
}

impl MembershipSnapshot {
    /// Presence data is eventually consistent, so this can briefly be violated.
    pub fn is_consistent(&self) -> bool {
        self.online_members <= self.total_members
    }
}

impl Snapshot for MembershipSnapshot {
    const SERIES: SeriesId = SeriesId::Membership;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
