//! Persistence contracts the scheduler relies on.
//!
//! Modeled as a set of focused async traits ("repository ports") composed
//! behind a single [`Store`] facade — the same shape the teacher uses under
//! `database::ports` (see `ports::users::UsersRepository`) — so the
//! scheduler depends on narrow trait objects rather than one god-trait. One
//! concrete implementation, [`sqlite::SqliteStore`], backs all of them
//! against a single `sqlx::SqlitePool`.

mod sqlite;

#[cfg(test)]
pub mod fake;

pub use sqlite::SqliteStore;

#[cfg(test)]
pub use fake::FakeStore;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use crate::domain::{DueChaser, Notifier, NotifierConfirmation, PollableSubscription, Snapshot, Subscription, User};
use crate::error::Result;

/// A batch of rows fetched and committed independently of the next batch,
/// matching the `FindInBatches`-style iteration contract in spec.md §9:
/// transactional boundaries are the store's business, not the scheduler's.
pub type BatchStream<'a, T> = Pin<Box<dyn Stream<Item = Result<Vec<T>>> + Send + 'a>>;

/// Fields needed to onboard a new subscription (the rest are derived).
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: i64,
    pub notifier_id: i64,
    pub endpoint: String,
    pub xpath: String,
    pub title: String,
    pub image_url: String,
}

/// Fields needed to insert a new snapshot row (id and dedup are store-owned).
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub subscription_id: i64,
    pub content: String,
    pub content_digest: String,
}

#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.per_page.max(1)
    }
}

#[async_trait]
pub trait SubscriptionsRepo: Send + Sync {
    /// Subscriptions eligible for this poll pass, eagerly loaded with their
    /// notifier. See spec.md §4.4 for the exact selection predicate.
    fn select_pollable<'a>(
        &'a self,
        batch_start: DateTime<Utc>,
        poll_interval: Duration,
        no_content_ttl: Duration,
        batch_size: i64,
    ) -> BatchStream<'a, PollableSubscription>;

    async fn update_last_poll(&self, subscription_ids: &[i64], batch_start: DateTime<Utc>) -> Result<()>;

    /// Single-subscription variant used by the chase pass, which updates one
    /// subscription's `last_poll_time` per `chase_one` rather than a batch.
    async fn mark_last_poll_time(&self, subscription_id: i64, ts: DateTime<Utc>) -> Result<()>;

    /// Only takes effect when the current value is null, per invariant 3.
    async fn set_no_content_since(&self, subscription_id: i64, ts: DateTime<Utc>) -> Result<()>;

    async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription>;
    async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>>;
    async fn get_pollable_subscription(&self, id: i64) -> Result<Option<PollableSubscription>>;
    async fn list_subscriptions_for_user(&self, user_id: i64, page: Pagination) -> Result<Vec<Subscription>>;
}

#[async_trait]
pub trait SnapshotsRepo: Send + Sync {
    async fn latest_snapshot(&self, subscription_id: i64) -> Result<Option<Snapshot>>;
    /// The snapshot immediately before the latest one, if any — what
    /// `POST .../push` reports back as `previous`.
    async fn previous_snapshot(&self, subscription_id: i64) -> Result<Option<Snapshot>>;
    async fn touch_snapshot_timestamp(&self, snapshot_id: i64, new_ts: DateTime<Utc>) -> Result<()>;
    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot>;
    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait ChasersRepo: Send + Sync {
    fn select_due_chasers<'a>(&'a self, now: DateTime<Utc>, batch_size: i64) -> BatchStream<'a, DueChaser>;
    async fn upsert_chaser(&self, subscription_id: i64, notifier_id: i64, not_before: DateTime<Utc>) -> Result<()>;
    async fn delete_chasers_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, username: &str, password_credential: &str) -> Result<User>;
    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn touch_last_login(&self, user_id: i64, ts: DateTime<Utc>) -> Result<()>;
}

#[async_trait]
pub trait NotifiersRepo: Send + Sync {
    async fn create_notifier(&self, user_id: i64, platform: &str, platform_identifier: &str) -> Result<Notifier>;
    async fn get_notifier(&self, id: i64) -> Result<Option<Notifier>>;
    /// The notifier provisioned for a user at account creation — exactly
    /// one per user, so no disambiguating id is needed.
    async fn get_notifier_for_user(&self, user_id: i64) -> Result<Option<Notifier>>;
    async fn mark_verified(&self, notifier_id: i64) -> Result<()>;
    async fn create_confirmation(&self, notifier_id: i64, nonce: Uuid, expiry: DateTime<Utc>) -> Result<()>;
    /// Consumes (deletes) the confirmation row if present and unexpired,
    /// returning it so the caller can mark the notifier verified.
    async fn consume_confirmation(&self, nonce: Uuid) -> Result<Option<NotifierConfirmation>>;
}

/// Composite facade the scheduler and API layer depend on. Blanket-implemented
/// for anything that implements all five ports, so a single `SqliteStore` (or
/// test fake) satisfies it without a manual marker impl.
pub trait Store: SubscriptionsRepo + SnapshotsRepo + ChasersRepo + UsersRepo + NotifiersRepo {}

impl<T> Store for T where T: SubscriptionsRepo + SnapshotsRepo + ChasersRepo + UsersRepo + NotifiersRepo {}
