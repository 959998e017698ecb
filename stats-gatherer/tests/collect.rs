use chrono::{
    DateTime,
    Duration as TimeDelta,
    Utc,
};
use futures::{
    stream,
    StreamExt,
};
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
    ChannelScan,
    CollectError,
    MembershipSnapshot,
    MessageVolumeSnapshot,
    MetricsCollector,
    RecordStore,
};
use pretty_assertions::assert_eq;
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use temp_dir::TempDir;

const GUILD: GuildId = Snowflake::new(1);
const WINDOW: Duration = Duration::from_secs(10 * 60);

enum History {
    /// Ages of the messages in minutes.
    Messages(Vec<i64>),
    Forbidden,
    /// Yields the messages, then fails.
    BreaksAfter(Vec<i64>),
}

#[derive(Default)]
struct FakePlatform {
    guild: Option<Guild>,
    members: Option<Vec<Member>>,
    histories: HashMap<ChannelId, History>,
}

impl FakePlatform {
    fn channel(mut self, id: u64, kind: ChannelKind, can_read_history: bool, history: History) -> Self {
        let guild = self.guild.get_or_insert_with(|| Guild {
            id: GUILD,
            name: "pulse".to_string(),
            channels: Vec::new(),
        });
        guild.channels.push(Channel {
            id: Snowflake::new(id),
            name: format!("channel-{id}"),
            kind,
            can_read_history,
        });
        self.histories.insert(Snowflake::new(id), history);
        self
    }

    fn roster(mut self, total: usize, online: usize) -> Self {
        let statuses = [PresenceStatus::Online, PresenceStatus::Idle, PresenceStatus::DoNotDisturb];
        self.members = Some(
            (0..total)
                .map(|i| Member {
                    user_id: Snowflake::new(100 + i as u64),
                    presence: if i < online { statuses[i % statuses.len()] } else { PresenceStatus::Offline },
                })
                .collect(),
        );
        self
    }
}

fn messages(channel_id: ChannelId, ages: &[i64]) -> Vec<Result<ChannelMessage, PlatformError>> {
    let now = Utc::now();
    ages.iter()
        .enumerate()
        .map(|(i, age)| {
            Ok(ChannelMessage {
                id: Snowflake::new(1000 + i as u64),
                channel_id,
                timestamp: now - TimeDelta::minutes(*age),
            })
        })
        .collect()
}

impl Platform for FakePlatform {
    fn resolve_guild(&self, guild_id: GuildId) -> PlatformFuture<'_, Guild> {
        let guild = self.guild.clone().filter(|guild| guild.id == guild_id);
        Box::pin(async move { guild.ok_or(PlatformError::GuildNotFound(guild_id)) })
    }

    fn list_guild_members(&self, _guild_id: GuildId) -> PlatformFuture<'_, Vec<Member>> {
        let members = self.members.clone();
        Box::pin(async move {
            members.ok_or(PlatformError::Status {
                status: 500,
                endpoint: "/guilds/1/members".to_string(),
                body: String::new(),
            })
        })
    }

    fn stream_channel_history_since(&self, channel_id: ChannelId, _since: DateTime<Utc>) -> MessageStream<'_> {
        match self.histories.get(&channel_id) {
            Some(History::Messages(ages)) => stream::iter(messages(channel_id, ages)).boxed(),
            Some(History::BreaksAfter(ages)) => {
                let mut items = messages(channel_id, ages);
                items.push(Err(PlatformError::Status {
                    status: 502,
                    endpoint: format!("/channels/{channel_id}/messages"),
                    body: String::new(),
                }));
                stream::iter(items).boxed()
            }
            Some(History::Forbidden) | None => stream::iter([Err(PlatformError::Forbidden {
                endpoint: format!("/channels/{channel_id}/messages"),
                body: r#"{"message": "Missing Access"}"#.to_string(),
            })])
            .boxed(),
        }
    }
}

fn collector(platform: FakePlatform) -> MetricsCollector<dyn Platform> {
    let platform: Arc<dyn Platform> = Arc::new(platform);
    MetricsCollector::new(platform, GUILD, WINDOW)
}

#[tokio::test]
async fn counts_readable_channels_within_the_window() {
    let platform = FakePlatform::default()
        .channel(10, ChannelKind::Text, true, History::Messages(vec![1, 4, 9, 11, 60]))
        .channel(11, ChannelKind::Text, false, History::Messages(vec![1]))
        .roster(50, 12);

    let snapshots = collector(platform).collect().await.unwrap();

    assert_eq!(snapshots.message_volume.messages_last_window, 3);
    assert_eq!(
        snapshots.channels,
        ChannelScan {
            scanned: 1,
            skipped: 1,
            failed: 0,
        }
    );
    assert_eq!(snapshots.membership.total_members, 50);
    assert_eq!(snapshots.membership.online_members, 12);
    assert_eq!(snapshots.membership.timestamp, snapshots.message_volume.timestamp);
}

#[tokio::test]
async fn failing_channels_contribute_nothing() {
    let platform = FakePlatform::default()
        .channel(10, ChannelKind::Text, true, History::Messages(vec![1, 2]))
        .channel(11, ChannelKind::Text, true, History::Forbidden)
        .channel(12, ChannelKind::Announcement, true, History::BreaksAfter(vec![1, 2, 3]))
        .channel(13, ChannelKind::Announcement, true, History::Messages(vec![5]))
        .roster(3, 0);

    let snapshots = collector(platform).collect().await.unwrap();

    assert_eq!(snapshots.message_volume.messages_last_window, 3);
    assert_eq!(
        snapshots.channels,
        ChannelScan {
            scanned: 2,
            skipped: 1,
            failed: 1,
        }
    );
}

#[tokio::test]
async fn only_text_bearing_channels_are_scanned() {
    let platform = FakePlatform::default()
        .channel(10, ChannelKind::Voice, true, History::Messages(vec![1, 2]))
        .channel(11, ChannelKind::Category, true, History::Forbidden)
        .channel(12, ChannelKind::Forum, true, History::Messages(vec![1]))
        .roster(1, 1);

    let snapshots = collector(platform).collect().await.unwrap();

    assert_eq!(snapshots.message_volume.messages_last_window, 0);
    assert_eq!(snapshots.channels, ChannelScan::default());
}

#[tokio::test]
async fn unknown_guild_fails_the_collection() {
    let platform = FakePlatform::default().roster(5, 1);

    let err = collector(platform).collect().await.unwrap_err();
    assert!(matches!(err, CollectError::GuildNotFound(id) if id == GUILD), "{err}");
}

#[tokio::test]
async fn roster_failure_fails_the_collection() {
    let platform = FakePlatform::default().channel(10, ChannelKind::Text, true, History::Messages(vec![1]));

    let err = collector(platform).collect().await.unwrap_err();
    assert!(matches!(err, CollectError::Roster { .. }), "{err}");
}

#[tokio::test]
async fn one_entry_per_series_with_matching_timestamps() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::new(dir.path());
    store.prepare().unwrap();

    let platform = FakePlatform::default()
        .channel(10, ChannelKind::Text, true, History::Messages(vec![1, 2, 3]))
        .channel(11, ChannelKind::Text, false, History::Messages(vec![1]))
        .roster(50, 12);
    let snapshots = collector(platform).collect().await.unwrap();

    store.append(&snapshots.membership).unwrap();
    store.append(&snapshots.message_volume).unwrap();

    let membership = store.load::<MembershipSnapshot>();
    let message_volume = store.load::<MessageVolumeSnapshot>();
    assert_eq!(membership.len(), 1);
    assert_eq!(message_volume.len(), 1);
    assert_eq!(membership[0].total_members, 50);
    assert_eq!(membership[0].online_members, 12);
    assert_eq!(message_volume[0].messages_last_window, 3);
    // Timestamps are persisted with microsecond precision.
    assert_eq!(membership[0].timestamp, message_volume[0].timestamp);
    assert_eq!((membership[0].timestamp - snapshots.membership.timestamp).num_microseconds(), Some(0));
}
