use chrono::{
    DateTime,
    Utc,
};
use guild_pulse_platform::Platform;
use guild_pulse_stats_gatherer::{
    CollectError,
    CollectedSnapshots,
    MetricsCollector,
    RecordStore,
    SeriesId,
    Snapshot,
    StoreError,
};
use guild_pulse_sync::{
    PublishOutcome,
    Publisher,
};
use std::time::Duration;
use tokio::time::Instant;

/// One sampling cycle: collect, append to every series, publish.
pub struct SamplingCycle<P: ?Sized> {
    collector: MetricsCollector<P>,
    store: RecordStore,
    publisher: Publisher,
}

impl<P: Platform + ?Sized> SamplingCycle<P> {
    pub fn new(collector: MetricsCollector<P>, store: RecordStore, publisher: Publisher) -> Self {
        Self {
            collector,
            store,
            publisher,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Run the cycle to completion. Nothing is recorded when the collection fails.
    pub async fn run(&self) -> CycleReport {
        let started_at = Utc::now();
        let clock = Instant::now();

        let collection = self.collector.collect().await;
        let (appends, publish) = match &collection {
            Ok(snapshots) => {
                let appends = vec![
                    append(&self.store, &snapshots.membership),
                    append(&self.store, &snapshots.message_volume),
                ];
                (appends, Some(self.publisher.publish().await))
            }
            Err(_) => (Vec::new(), None),
        };

        CycleReport {
            started_at,
            elapsed: clock.elapsed(),
            collection,
            appends,
            publish,
        }
    }
}

fn append<S: Snapshot>(store: &RecordStore, snapshot: &S) -> (SeriesId, Result<(), StoreError>) {
    (S::SERIES, store.append(snapshot))
}

/// What happened during one cycle, step by step.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub collection: Result<CollectedSnapshots, CollectError>,
    pub appends: Vec<(SeriesId, Result<(), StoreError>)>,
    /// Not attempted when the collection failed.
    pub publish: Option<PublishOutcome>,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.collection.is_ok()
            && self.appends.iter().all(|(_, result)| result.is_ok())
            && !self.publish.as_ref().is_some_and(PublishOutcome::is_failure)
    }

    pub fn log(&self, cycle: u64) {
        match &self.collection {
            Ok(snapshots) => info!(
                cycle,
                total_members = snapshots.membership.total_members,
                online_members = snapshots.membership.online_members,
                messages_last_window = snapshots.message_volume.messages_last_window,
                channels_scanned = snapshots.channels.scanned,
                channels_skipped = snapshots.channels.skipped,
                channels_failed = snapshots.channels.failed,
                "Collected snapshots"
            ),
            Err(err) => error!(cycle, %err, "Collection failed, no snapshots recorded"),
        }

        for (series, result) in &self.appends {
            if let Err(err) = result {
                error!(cycle, %series, %err, "Failed to append snapshot");
            }
        }

        match &self.publish {
            Some(outcome @ PublishOutcome::Failed { .. }) => error!(cycle, %outcome, "Publishing failed"),
            Some(PublishOutcome::Disabled) | None => {}
            Some(outcome) => info!(cycle, %outcome, "Published"),
        }

        let elapsed = humantime::format_duration(self.elapsed);
        if self.is_success() {
            info!(cycle, %elapsed, "Cycle finished");
        } else {
            warn!(cycle, %elapsed, "Cycle finished with errors");
        }
    }
}
