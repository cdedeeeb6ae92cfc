//! The snapshot scheduler: the event loop, poll pass, chase pass and
//! retention sweep described in spec.md §4.6. Grounded on the teacher's
//! `scanner::background::BackgroundScanner` (a long-running consumer task
//! fanning out `tokio::spawn` work per tick, joined before the next tick)
//! and `scan::orchestration::scheduler::WeightedFairScheduler` (state behind
//! a single `tokio::sync::Mutex`, `Arc`-shared so task handles can clone
//! it), generalised to the simpler "one pass at a time, fixed concurrency"
//! model spec.md calls for instead of weighted-fair multi-library leasing.

mod config;
mod worker;

pub use config::SchedulerConfig;
pub use worker::PollOutcome;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::{Clock, ClockEvent};
use crate::domain::PollableSubscription;
use crate::fetch::Fetcher;
use crate::metrics::{PassMetrics, PassMetricsSnapshot};
use crate::sender::SenderRegistry;
use crate::store::Store;

use worker::{chase_one, poll_one};

fn to_chrono_duration(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Drives poll passes and chase passes from clock events, enforcing a
/// single process-wide exclusion lock between passes (spec.md §5) and
/// bounded concurrency within a pass.
pub struct Scheduler {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    senders: Arc<SenderRegistry>,
    config: SchedulerConfig,
    /// Held for the duration of any pass; at most one pass runs at a time.
    pass_lock: Mutex<()>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher>,
        senders: Arc<SenderRegistry>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            senders,
            config,
            pass_lock: Mutex::new(()),
        }
    }

    /// Consume clock events until the stream closes (the clock was
    /// cancelled), running exactly one pass at a time. On exit, acquires
    /// the exclusion lock once more so the caller knows all in-flight work
    /// has drained before returning (spec.md §5).
    pub async fn run(self: Arc<Self>, clock: Arc<dyn Clock>, cancel: CancellationToken) {
        let mut events = clock.start(cancel.clone());

        while let Some(event) = events.next().await {
            let _guard = self.pass_lock.lock().await;
            self.handle_event(event).await;
        }

        // Shutdown: block until any pass still holding the lock (there
        // shouldn't be one, since passes only run inside the loop above,
        // but this makes the "wait for drain" guarantee explicit) finishes.
        let _final_guard = self.pass_lock.lock().await;
        info!("scheduler event stream closed, shut down");
    }

    async fn handle_event(&self, event: ClockEvent) {
        let pass_cancel = CancellationToken::new();
        match event {
            ClockEvent::PollWakeup(ts) => {
                if tokio::time::timeout(
                    self.config.per_pass_timeout,
                    self.poll_pass(ts, &pass_cancel),
                )
                .await
                .is_err()
                {
                    warn!(pass = "poll", timestamp = %ts, "pass exceeded per-pass timeout, cancelling in-flight work");
                    pass_cancel.cancel();
                }

                if tokio::time::timeout(self.config.per_pass_timeout, self.retention_sweep(ts))
                    .await
                    .is_err()
                {
                    warn!(pass = "retention", timestamp = %ts, "retention sweep exceeded per-pass timeout");
                }
            }
            ClockEvent::ChaseWakeup(ts) => {
                if tokio::time::timeout(
                    self.config.per_pass_timeout,
                    self.chase_pass(ts, &pass_cancel),
                )
                .await
                .is_err()
                {
                    warn!(pass = "chase", timestamp = %ts, "pass exceeded per-pass timeout, cancelling in-flight work");
                    pass_cancel.cancel();
                }
            }
        }
    }

    /// One traversal of `select_pollable`, batch by batch: stamp
    /// `last_poll_time` before any network work, fan out one worker per
    /// subscription bounded by `concurrency`, join before the next batch.
    pub async fn poll_pass(
        &self,
        ts: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> PassMetricsSnapshot {
        let metrics = Arc::new(PassMetrics::default());
        let mut batches = self.store.select_pollable(
            ts,
            self.config.poll_interval,
            self.config.no_content_ttl,
            self.config.concurrency as i64,
        );

        while let Some(batch) = batches.next().await {
            let batch = match batch {
                Ok(batch) => batch,
                Err(error) => {
                    warn!(%error, "poll batch iteration failed, continuing to next batch");
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }

            metrics
                .total_selected
                .fetch_add(batch.len() as u64, Ordering::Relaxed);

            // Stamped before any network I/O so a crash or slow batch never
            // causes the same subscriptions to be re-selected next tick.
            let ids: Vec<i64> = batch.iter().map(|p| p.subscription.id).collect();
            if let Err(error) = self.store.update_last_poll(&ids, ts).await {
                warn!(%error, "failed to stamp last_poll_time for batch, skipping");
                continue;
            }

            self.fan_out_poll_batch(batch, &metrics, cancel).await;
        }

        let snapshot = metrics.snapshot();
        if snapshot.total_selected > 0 {
            info!(
                total_selected = snapshot.total_selected,
                updated = snapshot.updated,
                unchanged = snapshot.unchanged,
                errored = snapshot.errored,
                "poll pass complete"
            );
        }
        snapshot
    }

    async fn fan_out_poll_batch(
        &self,
        batch: Vec<PollableSubscription>,
        metrics: &Arc<PassMetrics>,
        cancel: &CancellationToken,
    ) {
        let chase_delay = to_chrono_duration(self.config.chase_delay);
        let mut joinset = JoinSet::new();

        for pollable in batch {
            let store = self.store.clone();
            let fetcher = self.fetcher.clone();
            let senders = self.senders.clone();
            let metrics = metrics.clone();
            let cancel = cancel.clone();
            let PollableSubscription {
                subscription,
                notifier,
            } = pollable;

            joinset.spawn(async move {
                let outcome = poll_one(
                    &store,
                    &fetcher,
                    &senders,
                    chase_delay,
                    subscription,
                    notifier,
                    cancel,
                )
                .await;
                record_outcome(&metrics, outcome);
            });
        }

        while joinset.join_next().await.is_some() {}
    }

    /// One traversal of `select_due_chasers`: fan out, then consume the
    /// batch's chaser rows immediately after dispatch rather than after
    /// join (spec.md §4.6 step 2: "whether or not workers have finished —
    /// the chaser row is consumed optimistically").
    pub async fn chase_pass(&self, ts: DateTime<Utc>, cancel: &CancellationToken) {
        let chase_delay = to_chrono_duration(self.config.chase_delay);
        let mut batches = self
            .store
            .select_due_chasers(ts, self.config.concurrency as i64);

        while let Some(batch) = batches.next().await {
            let batch = match batch {
                Ok(batch) => batch,
                Err(error) => {
                    warn!(%error, "chase batch iteration failed, continuing to next batch");
                    continue;
                }
            };
            if batch.is_empty() {
                continue;
            }

            let mut joinset = JoinSet::new();
            for due in batch {
                let store = self.store.clone();
                let fetcher = self.fetcher.clone();
                let senders = self.senders.clone();
                let cancel = cancel.clone();
                joinset.spawn(async move {
                    chase_one(
                        store,
                        fetcher,
                        senders,
                        chase_delay,
                        due.subscription,
                        due.notifier,
                        cancel,
                    )
                    .await
                });
            }

            if let Err(error) = self.store.delete_chasers_before(ts).await {
                warn!(%error, "failed to consume dispatched chaser batch");
            }

            while joinset.join_next().await.is_some() {}
        }
    }

    /// `delete_snapshots_before(ts - snapshot_ttl)`, run after every poll
    /// pass. Subscriptions in `no_content` back-off are left alone; they
    /// re-enter the pollable set once `no_content_since` ages out.
    pub async fn retention_sweep(&self, ts: DateTime<Utc>) {
        let cutoff = ts - to_chrono_duration(self.config.snapshot_ttl);
        match self.store.delete_snapshots_before(cutoff).await {
            Ok(removed) if removed > 0 => {
                info!(removed, cutoff = %cutoff, "retention sweep removed snapshots");
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "retention sweep failed"),
        }
    }
}

fn record_outcome(metrics: &PassMetrics, outcome: PollOutcome) {
    match outcome {
        PollOutcome::Updated => metrics.updated.fetch_add(1, Ordering::Relaxed),
        PollOutcome::Unchanged => metrics.unchanged.fetch_add(1, Ordering::Relaxed),
        PollOutcome::Errored => metrics.errored.fetch_add(1, Ordering::Relaxed),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use crate::fetch::FakeFetcher;
    use crate::sender::RecordingSender;
    use crate::store::FakeStore;

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            wakeup_interval: StdDuration::from_secs(3600),
            chase_interval: StdDuration::from_secs(300),
            poll_interval: StdDuration::from_secs(3600),
            chase_delay: StdDuration::from_secs(600),
            no_content_ttl: StdDuration::from_secs(7 * 24 * 3600),
            snapshot_ttl: StdDuration::from_secs(14 * 24 * 3600),
            concurrency: 5,
            per_pass_timeout: StdDuration::from_secs(20),
        }
    }

    struct Harness {
        scheduler: Scheduler,
        store: Arc<FakeStore>,
        fetcher: Arc<FakeFetcher>,
        sender: Arc<RecordingSender>,
    }

    fn harness() -> Harness {
        let store = Arc::new(FakeStore::new());
        let fetcher = Arc::new(FakeFetcher::new());
        let sender = Arc::new(RecordingSender::new());
        let mut registry = SenderRegistry::new();
        registry.register("email", sender.clone());
        let scheduler = Scheduler::new(
            store.clone() as Arc<dyn Store>,
            fetcher.clone() as Arc<dyn Fetcher>,
            Arc::new(registry),
            test_config(),
        );
        Harness {
            scheduler,
            store,
            fetcher,
            sender,
        }
    }

    // S1 - first seen.
    #[tokio::test]
    async fn first_seen_inserts_snapshot_and_notifies() {
        let h = harness();
        let user = h.store.seed_user("alice");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/s1");
        h.fetcher.push_text(&sub.endpoint, "Hello  world");

        let ts = Utc::now();
        h.scheduler.poll_pass(ts, &CancellationToken::new()).await;

        assert_eq!(h.store.snapshot_count(sub.id), 1);
        let calls = h.sender.calls();
        assert_eq!(calls.len(), 1);
        let (previous, current) = &calls[0];
        assert!(previous.is_none());
        assert_eq!(current.content, "Hello world");
        assert_eq!(current.content_digest, crate::digest::digest("Hello world"));
    }

    // S2 - unchanged: dedup by digest, timestamp touched, no new row/notify.
    #[tokio::test]
    async fn unchanged_content_touches_timestamp_without_new_row_or_notify() {
        let h = harness();
        let user = h.store.seed_user("bob");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/s2");

        h.fetcher.push_text(&sub.endpoint, "Hello world");
        h.scheduler.poll_pass(Utc::now(), &CancellationToken::new()).await;
        assert_eq!(h.store.snapshot_count(sub.id), 1);

        // Make the subscription pollable again and repeat with identical text.
        h.store.set_last_poll_time(sub.id, Utc::now() - chrono::Duration::hours(2));
        h.fetcher.push_text(&sub.endpoint, "Hello world");
        let metrics = h.scheduler.poll_pass(Utc::now(), &CancellationToken::new()).await;

        assert_eq!(h.store.snapshot_count(sub.id), 1, "no new row on unchanged content");
        assert_eq!(h.sender.calls().len(), 1, "no additional notification sent");
        assert_eq!(metrics.unchanged, 1);
    }

    // S3 - changed: new row, notify with previous value, chaser enqueued.
    #[tokio::test]
    async fn changed_content_inserts_row_notifies_with_previous_and_enqueues_chaser() {
        let h = harness();
        let user = h.store.seed_user("carol");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/s3");

        h.fetcher.push_text(&sub.endpoint, "Hello world");
        h.scheduler.poll_pass(Utc::now(), &CancellationToken::new()).await;

        h.store.set_last_poll_time(sub.id, Utc::now() - chrono::Duration::hours(2));
        h.fetcher.push_text(&sub.endpoint, "Hello earth");
        let metrics = h.scheduler.poll_pass(Utc::now(), &CancellationToken::new()).await;

        assert_eq!(h.store.snapshot_count(sub.id), 2);
        assert_eq!(metrics.updated, 1);
        let calls = h.sender.calls();
        assert_eq!(calls.len(), 2);
        let (previous, current) = &calls[1];
        assert_eq!(previous.as_ref().unwrap().content, "Hello world");
        assert_eq!(current.content, "Hello earth");
        assert_eq!(h.store.chaser_count(), 1);
    }

    // S4 - empty content: no_content_since set, no snapshot, no notify.
    #[tokio::test]
    async fn empty_content_sets_no_content_since_without_snapshot_or_notify() {
        let h = harness();
        let user = h.store.seed_user("dave");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/s4");
        h.fetcher.push_text(&sub.endpoint, "");

        h.scheduler.poll_pass(Utc::now(), &CancellationToken::new()).await;

        assert_eq!(h.store.snapshot_count(sub.id), 0);
        assert_eq!(h.sender.calls().len(), 0);
        assert!(h.store.get_subscription(sub.id).no_content_since.is_some());
    }

    // S5 - back-off exclusion.
    #[tokio::test]
    async fn subscription_past_no_content_ttl_is_excluded_from_pollable() {
        let h = harness();
        let user = h.store.seed_user("erin");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/s5");
        let now = Utc::now();
        h.store.set_no_content_since_raw(sub.id, now - chrono::Duration::days(8));

        // If selected, the fetcher call would panic (no script pushed).
        h.scheduler.poll_pass(now, &CancellationToken::new()).await;
    }

    // S6 - pacing.
    #[tokio::test]
    async fn subscription_within_poll_interval_is_excluded_until_it_elapses() {
        let h = harness();
        let user = h.store.seed_user("frank");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/s6");
        let t0 = Utc::now();
        h.store.set_last_poll_time(sub.id, t0 - chrono::Duration::minutes(30));

        // Not yet due at t0 + nothing extra (last poll 30m ago, interval 1h).
        h.scheduler.poll_pass(t0, &CancellationToken::new()).await;
        assert_eq!(h.store.snapshot_count(sub.id), 0);

        // Due at t0 + 31m.
        h.fetcher.push_text(&sub.endpoint, "content");
        h.scheduler
            .poll_pass(t0 + chrono::Duration::minutes(31), &CancellationToken::new())
            .await;
        assert_eq!(h.store.snapshot_count(sub.id), 1);
    }

    #[tokio::test]
    async fn retention_sweep_removes_snapshots_older_than_ttl() {
        let h = harness();
        let user = h.store.seed_user("grace");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/retention");
        h.fetcher.push_text(&sub.endpoint, "content");
        let old_ts = Utc::now() - chrono::Duration::days(20);
        h.scheduler.poll_pass(old_ts, &CancellationToken::new()).await;
        assert_eq!(h.store.snapshot_count(sub.id), 1);

        h.scheduler.retention_sweep(Utc::now()).await;
        assert_eq!(h.store.snapshot_count(sub.id), 0);
    }

    #[tokio::test]
    async fn unsupported_platform_is_errored_not_panicked() {
        let store = Arc::new(FakeStore::new());
        let fetcher = Arc::new(FakeFetcher::new());
        let scheduler = Scheduler::new(
            store.clone() as Arc<dyn Store>,
            fetcher.clone() as Arc<dyn Fetcher>,
            Arc::new(SenderRegistry::new()),
            test_config(),
        );
        let user = store.seed_user("heidi");
        let notifier = store.seed_notifier(user.id, "sms");
        let sub = store.seed_subscription(user.id, notifier.id, "https://example.com/unsupported");
        fetcher.push_text(&sub.endpoint, "content");

        let metrics = scheduler.poll_pass(Utc::now(), &CancellationToken::new()).await;

        // The snapshot is still inserted (insert happens before dispatch);
        // only the delivery attempt fails, logged rather than rolled back.
        assert_eq!(store.snapshot_count(sub.id), 1);
        assert_eq!(metrics.updated, 1);
    }

    #[tokio::test]
    async fn chase_pass_reruns_a_due_chaser_and_stamps_last_poll_time() {
        let h = harness();
        let user = h.store.seed_user("ivan");
        let notifier = h.store.seed_notifier(user.id, "email");
        let sub = h.store.seed_subscription(user.id, notifier.id, "https://example.com/chase");

        h.fetcher.push_text(&sub.endpoint, "Hello world");
        h.scheduler.poll_pass(Utc::now(), &CancellationToken::new()).await;
        assert_eq!(h.store.chaser_count(), 1, "update enqueues a chaser");

        h.store.set_last_poll_time(sub.id, Utc::now() - chrono::Duration::hours(2));
        h.fetcher.push_text(&sub.endpoint, "Hello earth");
        let due_at = Utc::now() + chrono::Duration::minutes(11);
        h.scheduler.chase_pass(due_at, &CancellationToken::new()).await;

        assert_eq!(h.store.snapshot_count(sub.id), 2, "chase pass reran the subscription");
        assert!(h.store.get_subscription(sub.id).last_poll_time.is_some());
        // The original chaser row is consumed on dispatch; the rerun's own
        // update enqueues a fresh one, so the count returns to 1 rather
        // than 0 (see DESIGN.md on chaser consumption semantics).
        assert_eq!(h.store.chaser_count(), 1);
    }
}
