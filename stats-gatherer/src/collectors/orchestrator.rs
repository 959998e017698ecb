use crate::{
    collectors::{
        Collector,
        MembershipCollector,
        MessageVolumeCollector,
    },
    metrics::CollectedSnapshots,
    CollectError,
};
use chrono::{
    DateTime,
    Utc,
};
use guild_pulse_platform::{
    Guild,
    GuildId,
    Platform,
    PlatformError,
};
use std::{
    sync::Arc,
    time::Duration,
};

/// Resolves the monitored guild and runs every collector against it with a shared timestamp.
pub struct MetricsCollector<P: ?Sized> {
    platform: Arc<P>,
    guild_id: GuildId,
    membership: MembershipCollector<P>,
    message_volume: MessageVolumeCollector<P>,
}

impl<P: Platform + ?Sized> MetricsCollector<P> {
    pub fn new(platform: Arc<P>, guild_id: GuildId, message_window: Duration) -> Self {
        Self {
            membership: MembershipCollector::new(platform.clone()),
            message_volume: MessageVolumeCollector::new(platform.clone(), message_window),
            platform,
            guild_id,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Take one snapshot of every series.
    ///
    /// Fails as a whole if the guild cannot be resolved or its roster cannot be listed, in which case nothing
    /// should be recorded for this cycle.
    pub async fn collect(&self) -> Result<CollectedSnapshots, CollectError> {
        let at = Utc::now();
        let guild = self.resolve().await?;
        self.collect_guild(&guild, at).await
    }

    async fn resolve(&self) -> Result<Guild, CollectError> {
        let guild_id = self.guild_id;
        self.platform.resolve_guild(guild_id).await.map_err(|err| match err {
            PlatformError::GuildNotFound(id) => CollectError::GuildNotFound(id),
            source => CollectError::Guild { guild_id, source },
        })
    }

    async fn collect_guild(&self, guild: &Guild, at: DateTime<Utc>) -> Result<CollectedSnapshots, CollectError> {
        debug!(guild = %guild.name, collector = self.membership.name(), "Collecting");
        let membership = self.membership.collect(guild, at).await?;

        debug!(guild = %guild.name, collector = self.message_volume.name(), "Collecting");
        let (message_volume, channels) = self.message_volume.collect(guild, at).await?;

        Ok(CollectedSnapshots {
            membership,
            message_volume,
            channels,
        })
    }
}
