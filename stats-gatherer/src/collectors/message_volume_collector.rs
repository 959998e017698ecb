use crate::{
    collectors::{
        CollectFuture,
        Collector,
    },
    metrics::{
        ChannelScan,
        MessageVolumeSnapshot,
    },
};
use chrono::{
    DateTime,
    TimeDelta,
    Utc,
};
use futures::TryStreamExt;
use guild_pulse_platform::{
    Channel,
    Guild,
    Platform,
    PlatformError,
};
use std::{
    sync::Arc,
    time::Duration,
};

/// Counts the messages posted during the lookback window across the readable text channels of the guild.
///
/// Channels are scanned one after another. A channel that cannot be read contributes nothing and never
/// stops the scan of the others.
pub struct MessageVolumeCollector<P: ?Sized> {
    platform: Arc<P>,
    window: TimeDelta,
}

impl<P: Platform + ?Sized> MessageVolumeCollector<P> {
    pub fn new(platform: Arc<P>, window: Duration) -> Self {
        Self {
            platform,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
        }
    }

    async fn count_channel(&self, channel: &Channel, since: DateTime<Utc>) -> Result<u64, PlatformError> {
        self.platform
            .stream_channel_history_since(channel.id, since)
            .try_fold(0u64, |count, message| async move {
                Ok(if message.timestamp > since { count + 1 } else { count })
            })
            .await
    }
}

impl<P: Platform + ?Sized> Collector for MessageVolumeCollector<P> {
    type Output = (MessageVolumeSnapshot, ChannelScan);

    fn collect<'a>(
        &'a self,
        guild: &'a Guild,
        at: DateTime<Utc>,
    ) -> CollectFuture<'a, (MessageVolumeSnapshot, ChannelScan)> {
        Box::pin(async move {
            let since = at.checked_sub_signed(self.window).unwrap_or(DateTime::<Utc>::MIN_UTC);
            let mut scan = ChannelScan::default();
            let mut total = 0;

            for channel in guild.text_channels() {
                if !channel.can_read_history {
                    warn!(channel = %channel.name, channel_id = %channel.id, "No permission to read the message history, skipping channel");
                    scan.skipped += 1;
                    continue;
                }

                match self.count_channel(channel, since).await {
                    Ok(count) => {
                        debug!(channel = %channel.name, count, "Counted messages");
                        scan.scanned += 1;
                        total += count;
                    }
                    Err(err) if err.is_permission_denied() => {
                        warn!(channel = %channel.name, channel_id = %channel.id, %err, "Reading the message history was denied, skipping channel");
                        scan.skipped += 1;
                    }
                    Err(err) => {
                        warn!(channel = %channel.name, channel_id = %channel.id, %err, "Failed to count messages, channel contributes nothing");
                        scan.failed += 1;
                    }
                }
            }

            let snapshot = MessageVolumeSnapshot {
                timestamp: at,
                messages_last_window: total,
            };
            Ok((snapshot, scan))
        })
    }

    fn name(&self) -> &'static str {
        "MessageVolumeCollector"
    }
}
