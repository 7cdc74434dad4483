//! Periodic synchronization of every iCal subscription.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::Fetcher;
use crate::source::{CalendarSource, SourceId, SourceKind};
use crate::store::Store;
use crate::sync::Synchronizer;

/// How often subscriptions are refreshed unless configured otherwise.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A source whose refresh failed during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source_id: Option<SourceId>,
    pub label: String,
    pub message: String,
}

/// Outcome of one pass over all subscriptions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    /// Already being synchronized elsewhere, or deleted mid-pass
    pub skipped: usize,
    pub failures: Vec<SourceFailure>,
}

impl SyncReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} synced, {} failed, {} skipped",
            self.synced,
            self.failed(),
            self.skipped
        )
    }
}

impl<F: Fetcher, S: Store> Synchronizer<F, S> {
    /// Refresh every iCal source in turn.
    ///
    /// A failing source is logged and recorded in the report; the pass goes on
    /// with the next one. A changed display name is written back to the source.
    pub async fn synchronize_all(&self) -> SyncReport {
        let mut report = SyncReport::default();

        let sources = match self.store().sources(Some(SourceKind::Ical)) {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "Could not list calendar sources");
                report.failures.push(SourceFailure {
                    source_id: None,
                    label: "(all sources)".to_string(),
                    message: e.to_string(),
                });
                return report;
            }
        };

        for source in sources {
            let result = match self.synchronize_one(&source).await {
                Ok(name) => self.record_name(&source, &name),
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => report.synced += 1,
                Err(SyncError::InProgress(id)) => {
                    debug!(source_id = id, "Sync already in progress, skipping");
                    report.skipped += 1;
                }
                Err(SyncError::SourceNotFound(id)) => {
                    debug!(source_id = id, "Source deleted during the pass, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(
                        source_id = source.id,
                        url = source.url.as_deref().unwrap_or("-"),
                        error = %e,
                        "Failed to synchronize calendar source"
                    );
                    report.failures.push(SourceFailure {
                        source_id: source.id,
                        label: source.label().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        report
    }

    fn record_name(&self, source: &CalendarSource, name: &str) -> SyncResult<()> {
        if let Some(id) = source.id
            && source.name.as_deref() != Some(name)
        {
            self.store().rename_source(id, name)?;
        }
        Ok(())
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the timer and any pass in progress, then wait for the task to end.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.await;
    }
}

/// Runs [`Synchronizer::synchronize_all`] at startup and then on an interval.
pub struct SyncScheduler<F, S> {
    synchronizer: Arc<Synchronizer<F, S>>,
    interval: Duration,
}

impl<F, S> SyncScheduler<F, S>
where
    F: Fetcher + 'static,
    S: Store + 'static,
{
    pub fn new(synchronizer: Arc<Synchronizer<F, S>>) -> Self {
        SyncScheduler {
            synchronizer,
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
        let SyncScheduler {
            synchronizer,
            interval,
        } = self;

        let handle = tokio::spawn(async move {
            info!(interval = %humantime::format_duration(interval), "Sync scheduler started");

            // The first tick completes immediately
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            report = synchronizer.synchronize_all() => {
                                info!(
                                    synced = report.synced,
                                    failed = report.failed(),
                                    skipped = report.skipped,
                                    "Sync pass finished"
                                );
                            }
                            _ = shutdown_rx.recv() => break,
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }

            info!("Sync scheduler stopped");
        });

        SchedulerHandle {
            shutdown_tx,
            handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NewSource;
    use crate::store::LocalStore;
    use crate::test_support::{FakeFetcher, feed, soon};
    use tokio::sync::Notify;

    const GOOD: &str = "https://example.com/family.ics";
    const BAD: &str = "https://example.com/broken.ics";

    fn synchronizer(fetcher: FakeFetcher) -> Arc<Synchronizer<FakeFetcher, LocalStore>> {
        let store = Arc::new(LocalStore::in_memory());
        store.add_source(NewSource::ical(BAD, 1)).unwrap();
        store.add_source(NewSource::ical(GOOD, 2)).unwrap();
        store
            .add_source(NewSource {
                kind: SourceKind::Outlook,
                url: Some("https://outlook.example.com".to_string()),
                account_email: None,
                member_id: 2,
            })
            .unwrap();
        Arc::new(Synchronizer::new(fetcher, store))
    }

    fn fetcher() -> FakeFetcher {
        let fetcher = FakeFetcher::new();
        fetcher.fail(BAD, 503);
        fetcher.serve(GOOD, feed("Family", &[("Picnic", &soon(2))]));
        fetcher
    }

    #[tokio::test]
    async fn test_failing_source_does_not_stop_the_pass() {
        let sync = synchronizer(fetcher());

        let report = sync.synchronize_all().await;

        assert_eq!(report.synced, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].source_id, Some(1));
        assert!(report.failures[0].message.contains("503"));
        assert_eq!(report.to_string(), "1 synced, 1 failed, 0 skipped");

        // Only iCal sources are fetched
        assert_eq!(sync.fetcher_calls(), vec![BAD.to_string(), GOOD.to_string()]);
        assert_eq!(
            sync.store().source(2).unwrap().unwrap().name.as_deref(),
            Some("Family")
        );
        assert_eq!(sync.store().events_for_source(2).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_source_deleted_mid_pass_is_skipped() {
        let gate = Arc::new(Notify::new());
        let fetcher = FakeFetcher::gated(gate.clone());
        fetcher.fail(BAD, 503);
        fetcher.serve(GOOD, feed("Family", &[("Picnic", &soon(2))]));
        let sync = synchronizer(fetcher);

        let pass = sync.synchronize_all();
        let delete_while_fetching = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sync.delete_subscription(2).unwrap();
            for _ in 0..2 {
                gate.notify_one();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        let (report, ()) = tokio::join!(pass, delete_while_fetching);

        assert_eq!(report.synced, 0);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped, 1);
        assert!(sync.store().events_for_source(2).unwrap().is_empty());
        assert_eq!(sync.store().count_events().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scheduler_runs_at_startup_and_repeats() {
        let sync = synchronizer(fetcher());
        let handle = SyncScheduler::new(sync.clone())
            .with_interval(Duration::from_millis(50))
            .start();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while sync.fetcher_calls().len() < 6 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;

        // The broken source is retried on every pass
        let calls = sync.fetcher_calls();
        assert!(calls.iter().filter(|url| *url == BAD).count() >= 3);
        assert_eq!(sync.store().events_for_source(2).unwrap().len(), 1);

        let after_stop = sync.fetcher_calls().len();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sync.fetcher_calls().len(), after_stop);
    }

    #[tokio::test]
    async fn test_stop_interrupts_a_pass_in_progress() {
        // The gate is never opened, so the first fetch hangs
        let fetcher = FakeFetcher::gated(Arc::new(Notify::new()));
        let sync = synchronizer(fetcher);
        let handle = SyncScheduler::new(sync).start();

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("Scheduler should stop while a fetch is pending");
    }

    impl Synchronizer<FakeFetcher, LocalStore> {
        fn fetcher_calls(&self) -> Vec<String> {
            self.fetcher().calls()
        }
    }
}
