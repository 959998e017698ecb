#![allow(dead_code)]

use chrono::{
    DateTime,
    Duration as TimeDelta,
    Utc,
};
use futures::{
    stream,
    StreamExt,
};
use guild_pulse::SamplingCycle;
use guild_pulse_platform::{
    Channel,
    ChannelId,
    ChannelKind,
    ChannelMessage,
    Guild,
    GuildId,
    Member,
    MessageStream,
    Platform,
    PlatformError,
    PlatformFuture,
    PresenceStatus,
    Snowflake,
};
use guild_pulse_stats_gatherer::{
    MetricsCollector,
    RecordStore,
};
use guild_pulse_sync::Publisher;
use std::{
    path::Path,
    sync::{
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

pub const GUILD: GuildId = Snowflake::new(1);
pub const WINDOW: Duration = Duration::from_secs(10 * 60);

/// A guild with a readable channel holding three recent messages, a channel the bot may not read and a roster of
/// 50 members with 12 online.
///
/// Resolving the guild takes `delay`, which lets tests stretch a cycle under paused time.
pub struct FakePlatform {
    pub delay: Duration,
    pub guild_missing: AtomicBool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakePlatform {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            guild_missing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Number of collections that were started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn guild() -> Guild {
        let channel = |id: u64, can_read_history: bool| Channel {
            id: Snowflake::new(id),
            name: format!("channel-{id}"),
            kind: ChannelKind::Text,
            can_read_history,
        };
        Guild {
            id: GUILD,
            name: "pulse".to_string(),
            channels: vec![channel(10, true), channel(11, false)],
        }
    }
}

/// Decrements the in-flight counter even when the collection is dropped midway.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Platform for FakePlatform {
    fn resolve_guild(&self, guild_id: GuildId) -> PlatformFuture<'_, Guild> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            tokio::time::sleep(self.delay).await;
            if self.guild_missing.load(Ordering::SeqCst) {
                return Err(PlatformError::GuildNotFound(guild_id));
            }
            Ok(Self::guild())
        })
    }

    fn list_guild_members(&self, _guild_id: GuildId) -> PlatformFuture<'_, Vec<Member>> {
        Box::pin(async {
            Ok((0..50)
                .map(|i| Member {
                    user_id: Snowflake::new(100 + i),
                    presence: if i < 12 { PresenceStatus::Online } else { PresenceStatus::Offline },
                })
                .collect())
        })
    }

    fn stream_channel_history_since(&self, channel_id: ChannelId, _since: DateTime<Utc>) -> MessageStream<'_> {
        let now = Utc::now();
        let messages: Vec<_> = [1, 2, 3, 30]
            .into_iter()
            .map(|age| {
                Ok(ChannelMessage {
                    id: Snowflake::new(1000 + age as u64),
                    channel_id,
                    timestamp: now - TimeDelta::minutes(age),
                })
            })
            .collect();
        stream::iter(messages).boxed()
    }
}

pub fn sampling_cycle(platform: Arc<FakePlatform>, data_dir: &Path, publisher: Publisher) -> SamplingCycle<FakePlatform> {
    let store = RecordStore::new(data_dir);
    store.prepare().unwrap();
    SamplingCycle::new(MetricsCollector::new(platform, GUILD, WINDOW), store, publisher)
}
