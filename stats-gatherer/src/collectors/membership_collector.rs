use crate::{
    collectors::{
        CollectFuture,
        Collector,
    },
    metrics::MembershipSnapshot,
    CollectError,
};
use chrono::{
    DateTime,
    Utc,
};
use guild_pulse_platform::{
    Guild,
    Platform,
};
use std::sync::Arc;

/// Counts the roster of the guild and the members that are not offline.
pub struct MembershipCollector<P: ?Sized> {
    platform: Arc<P>,
}

impl<P: Platform + ?Sized> MembershipCollector<P> {
    pub fn new(platform: Arc<P>) -> Self {
        Self { platform }
    }
}

impl<P: Platform + ?Sized> Collector for MembershipCollector<P> {
    type Output = MembershipSnapshot;

    fn collect<'a>(&'a self, guild: &'a Guild, at: DateTime<Utc>) -> CollectFuture<'a, MembershipSnapshot> {
        Box::pin(async move {
            let members = self
                .platform
                .list_guild_members(guild.id)
                .await
                .map_err(|source| CollectError::Roster {
                    guild_id: guild.id,
                    source,
                })?;

            let snapshot = MembershipSnapshot {
                timestamp: at,
                total_members: members.len() as u64,
                online_members: members.iter().filter(|member| member.presence.is_online()).count() as u64,
            };
            if !snapshot.is_consistent() {
                warn!(
                    total_members = snapshot.total_members,
                    online_members = snapshot.online_members,
                    "More members online than in the roster, presence data is lagging"
                );
            }
            Ok(snapshot)
        })
    }

    fn name(&self) -> &'static str {
        "MembershipCollector"
    }
}
