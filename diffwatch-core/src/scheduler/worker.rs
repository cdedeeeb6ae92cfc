//! The per-subscription procedure shared by the poll pass and the chase
//! pass (spec.md §4.6: "run the same per-subscription procedure as
//! `poll_one`"). Free functions rather than `Scheduler` methods so a
//! `tokio::task::JoinSet` can spawn them without needing an `Arc<Self>`
//! handle back to the scheduler — each call captures only the Arcs it
//! needs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::digest::digest;
use crate::domain::{Notifier, Subscription};
use crate::fetch::{EndpointContent, Fetcher};
use crate::sender::SenderRegistry;
use crate::store::{NewSnapshot, Store};

/// Outcome of running the per-subscription procedure once, used both to
/// drive per-pass metrics and to decide whether the chase pass should
/// enqueue a follow-up chaser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Updated,
    Unchanged,
    Errored,
}

/// `Fetcher::get_endpoint_content`, but racing the pass-level cancellation
/// token so a worker abandons in-flight I/O rather than outliving the
/// per-pass timeout (spec.md §5: "workers must observe cancellation and
/// abandon in-flight I/O").
async fn fetch_with_cancel(
    fetcher: &dyn Fetcher,
    url: &str,
    xpath: &str,
    cancel: &CancellationToken,
) -> crate::error::Result<EndpointContent> {
    tokio::select! {
        result = fetcher.get_endpoint_content(url, xpath) => result,
        _ = cancel.cancelled() => Err(crate::error::CoreError::Internal(
            "fetch cancelled: per-pass timeout or shutdown".to_string(),
        )),
    }
}

/// Steps 1-2 of spec.md §4.6's per-subscription worker, plus the
/// empty-content gate (step 4), which short-circuits the digest/notify
/// procedure (step 3) entirely: an empty extraction never produces a
/// snapshot row, per scenario S4.
pub async fn poll_one(
    store: &Arc<dyn Store>,
    fetcher: &Arc<dyn Fetcher>,
    senders: &Arc<SenderRegistry>,
    chase_delay: chrono::Duration,
    subscription: Subscription,
    notifier: Notifier,
    cancel: CancellationToken,
) -> PollOutcome {
    let content = match fetch_with_cancel(
        fetcher.as_ref(),
        &subscription.endpoint,
        &subscription.xpath,
        &cancel,
    )
    .await
    {
        Ok(content) => content,
        Err(error) => {
            warn!(subscription_id = subscription.id, %error, "fetch failed, skipping subscription this pass");
            return PollOutcome::Errored;
        }
    };

    let now = Utc::now();

    if content.text.is_empty() {
        if subscription.no_content_since.is_none() {
            if let Err(error) = store.set_no_content_since(subscription.id, now).await {
                warn!(subscription_id = subscription.id, %error, "failed to record no_content_since");
                return PollOutcome::Errored;
            }
        }
        return PollOutcome::Unchanged;
    }

    handle_content(store, senders, chase_delay, &subscription, &notifier, now, content).await
}

/// Step 3 of spec.md §4.6: digest comparison against the latest snapshot,
/// dedup-by-touch on a match, insert-and-notify on a change.
async fn handle_content(
    store: &Arc<dyn Store>,
    senders: &Arc<SenderRegistry>,
    chase_delay: chrono::Duration,
    subscription: &Subscription,
    notifier: &Notifier,
    now: DateTime<Utc>,
    content: EndpointContent,
) -> PollOutcome {
    let curr_digest = digest(&content.text);

    let previous = match store.latest_snapshot(subscription.id).await {
        Ok(previous) => previous,
        Err(error) => {
            warn!(subscription_id = subscription.id, %error, "failed to load latest snapshot");
            return PollOutcome::Errored;
        }
    };

    if let Some(previous) = &previous {
        if previous.content_digest == curr_digest {
            if let Err(error) = store.touch_snapshot_timestamp(previous.id, now).await {
                warn!(subscription_id = subscription.id, %error, "failed to touch snapshot timestamp");
                return PollOutcome::Errored;
            }
            return PollOutcome::Unchanged;
        }
    }

    // Capture `previous` as a value before inserting: the sender must see a
    // consistent before/after pair even though, in a future multi-process
    // deployment, the row could be mutated concurrently (spec.md §9).
    let new_snapshot = match store
        .insert_snapshot(NewSnapshot {
            timestamp: now,
            user_id: subscription.user_id,
            subscription_id: subscription.id,
            content: content.text,
            content_digest: curr_digest,
        })
        .await
    {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(subscription_id = subscription.id, %error, "failed to insert snapshot");
            return PollOutcome::Errored;
        }
    };

    let delivery = match senders.get(&notifier.platform) {
        Ok(sender) => {
            sender
                .send_snapshot(notifier, subscription, previous.as_ref(), &new_snapshot)
                .await
        }
        Err(error) => Err(error),
    };

    match delivery {
        Ok(_delivery_id) => {
            if let Err(error) = store
                .upsert_chaser(subscription.id, notifier.id, now + chase_delay)
                .await
            {
                warn!(subscription_id = subscription.id, %error, "failed to enqueue chaser");
            }
        }
        Err(error) => {
            // Delivery failure does not roll back the snapshot insert
            // (spec.md §4.6) — the row stands, retried only if content
            // changes again.
            warn!(subscription_id = subscription.id, %error, "delivery failed, snapshot retained");
        }
    }

    PollOutcome::Updated
}

/// Chase pass variant of the worker: runs the same procedure, then stamps
/// `last_poll_time` for the rechecked subscription (spec.md §4.6, chase
/// pass step 3). The procedure above already enqueues the next chaser on a
/// real update, so this does not enqueue a second one (see DESIGN.md, Open
/// Question 3).
pub async fn chase_one(
    store: Arc<dyn Store>,
    fetcher: Arc<dyn Fetcher>,
    senders: Arc<SenderRegistry>,
    chase_delay: chrono::Duration,
    subscription: Subscription,
    notifier: Notifier,
    cancel: CancellationToken,
) -> PollOutcome {
    let subscription_id = subscription.id;
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

    if let Err(error) = store.mark_last_poll_time(subscription_id, Utc::now()).await {
        warn!(subscription_id, %error, "failed to stamp last_poll_time after chase");
    }

    outcome
}
