//! In-memory [`Store`] double used by the scheduler's test suite in place
//! of [`super::SqliteStore`], matching the "fake in-memory Store
//! implementation standing in for `SqliteStore`" test-tooling note.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Chaser, DueChaser, Notifier, NotifierConfirmation, PollableSubscription, Snapshot,
    Subscription, User,
};
use crate::error::Result;

use super::{
    BatchStream, ChasersRepo, NewSnapshot, NewSubscription, NotifiersRepo, Pagination,
    SnapshotsRepo, SubscriptionsRepo, UsersRepo,
};

#[derive(Default)]
struct Tables {
    users: HashMap<i64, User>,
    notifiers: HashMap<i64, Notifier>,
    confirmations: HashMap<Uuid, NotifierConfirmation>,
    subscriptions: HashMap<i64, Subscription>,
    snapshots: HashMap<i64, Snapshot>,
    chasers: HashMap<i64, Chaser>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A single-process, mutex-guarded stand-in for `SqliteStore`. Batch
/// iteration yields the whole eligible set as one batch capped at
/// `batch_size`, good enough to exercise the scheduler's fan-out and
/// cross-batch commit visibility without a real database.
#[derive(Default)]
pub struct FakeStore {
    tables: Mutex<Tables>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, username: &str) -> User {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let user = User {
            id,
            username: username.to_string(),
            password_credential: "hash".to_string(),
            last_login_at: None,
            deleted_at: None,
        };
        tables.users.insert(id, user.clone());
        user
    }

    pub fn seed_notifier(&self, user_id: i64, platform: &str) -> Notifier {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let notifier = Notifier {
            id,
            user_id,
            platform: platform.to_string(),
            platform_identifier: "dest".to_string(),
            verified: true,
            deleted_at: None,
        };
        tables.notifiers.insert(id, notifier.clone());
        notifier
    }

    pub fn seed_subscription(&self, user_id: i64, notifier_id: i64, endpoint: &str) -> Subscription {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let subscription = Subscription {
            id,
            user_id,
            notifier_id,
            endpoint: endpoint.to_string(),
            xpath: "//h1".to_string(),
            title: String::new(),
            image_url: String::new(),
            last_poll_time: None,
            no_content_since: None,
            deleted_at: None,
        };
        tables.subscriptions.insert(id, subscription.clone());
        subscription
    }

    pub fn set_last_poll_time(&self, subscription_id: i64, ts: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(sub) = tables.subscriptions.get_mut(&subscription_id) {
            sub.last_poll_time = Some(ts);
        }
    }

    pub fn set_no_content_since_raw(&self, subscription_id: i64, ts: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(sub) = tables.subscriptions.get_mut(&subscription_id) {
            sub.no_content_since = Some(ts);
        }
    }

    pub fn snapshot_count(&self, subscription_id: i64) -> usize {
        self.tables
            .lock()
            .unwrap()
            .snapshots
            .values()
            .filter(|s| s.subscription_id == subscription_id)
            .count()
    }

    pub fn chaser_count(&self) -> usize {
        self.tables.lock().unwrap().chasers.len()
    }

    pub fn get_subscription(&self, id: i64) -> Subscription {
        self.tables.lock().unwrap().subscriptions.get(&id).unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionsRepo for FakeStore {
    fn select_pollable<'a>(
        &'a self,
        batch_start: DateTime<Utc>,
        poll_interval: std::time::Duration,
        no_content_ttl: std::time::Duration,
        batch_size: i64,
    ) -> BatchStream<'a, PollableSubscription> {
        let poll_interval = chrono::Duration::from_std(poll_interval).unwrap_or_else(|_| chrono::Duration::zero());
        let no_content_ttl = chrono::Duration::from_std(no_content_ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Box::pin(stream! {
            let tables = self.tables.lock().unwrap();
            let no_content_cutoff = batch_start - no_content_ttl;
            let last_poll_cutoff = batch_start - poll_interval;
            let mut out = Vec::new();
            for sub in tables.subscriptions.values() {
                if sub.deleted_at.is_some() {
                    continue;
                }
                let no_content_ok = sub.no_content_since.is_none_or(|since| since > no_content_cutoff);
                let last_poll_ok = sub.last_poll_time.is_none_or(|last| last <= last_poll_cutoff);
                if no_content_ok && last_poll_ok {
                    if let Some(notifier) = tables.notifiers.get(&sub.notifier_id) {
                        out.push(PollableSubscription {
                            subscription: sub.clone(),
                            notifier: notifier.clone(),
                        });
                    }
                }
            }
            drop(tables);
            out.sort_by_key(|p| p.subscription.id);
            for chunk in out.chunks(batch_size.max(1) as usize) {
                yield Ok(chunk.to_vec());
            }
        })
    }

    async fn update_last_poll(&self, subscription_ids: &[i64], batch_start: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        for id in subscription_ids {
            if let Some(sub) = tables.subscriptions.get_mut(id) {
                sub.last_poll_time = Some(batch_start);
            }
        }
        Ok(())
    }

    async fn mark_last_poll_time(&self, subscription_id: i64, ts: DateTime<Utc>) -> Result<()> {
        self.set_last_poll_time(subscription_id, ts);
        Ok(())
    }

    async fn set_no_content_since(&self, subscription_id: i64, ts: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(sub) = tables.subscriptions.get_mut(&subscription_id) {
            if sub.no_content_since.is_none() {
                sub.no_content_since = Some(ts);
            }
        }
        Ok(())
    }

    async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let subscription = Subscription {
            id,
            user_id: new.user_id,
            notifier_id: new.notifier_id,
            endpoint: new.endpoint,
            xpath: new.xpath,
            title: new.title,
            image_url: new.image_url,
            last_poll_time: None,
            no_content_since: None,
            deleted_at: None,
        };
        tables.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>> {
        Ok(self.tables.lock().unwrap().subscriptions.get(&id).cloned())
    }

    async fn get_pollable_subscription(&self, id: i64) -> Result<Option<PollableSubscription>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.subscriptions.get(&id).and_then(|sub| {
            tables.notifiers.get(&sub.notifier_id).map(|notifier| PollableSubscription {
                subscription: sub.clone(),
                notifier: notifier.clone(),
            })
        }))
    }

    async fn list_subscriptions_for_user(&self, user_id: i64, page: Pagination) -> Result<Vec<Subscription>> {
        let tables = self.tables.lock().unwrap();
        let mut subs: Vec<Subscription> = tables
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.deleted_at.is_none())
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.id);
        let offset = page.offset().max(0) as usize;
        let per_page = page.per_page.max(1) as usize;
        Ok(subs.into_iter().skip(offset).take(per_page).collect())
    }
}

#[async_trait]
impl SnapshotsRepo for FakeStore {
    async fn latest_snapshot(&self, subscription_id: i64) -> Result<Option<Snapshot>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .snapshots
            .values()
            .filter(|s| s.subscription_id == subscription_id)
            .max_by_key(|s| (s.timestamp, s.id))
            .cloned())
    }

    async fn previous_snapshot(&self, subscription_id: i64) -> Result<Option<Snapshot>> {
        let tables = self.tables.lock().unwrap();
        let mut matching: Vec<Snapshot> = tables
            .snapshots
            .values()
            .filter(|s| s.subscription_id == subscription_id)
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.timestamp, s.id));
        matching.reverse();
        Ok(matching.into_iter().nth(1))
    }

    async fn touch_snapshot_timestamp(&self, snapshot_id: i64, new_ts: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(snap) = tables.snapshots.get_mut(&snapshot_id) {
            snap.timestamp = new_ts;
        }
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let snap = Snapshot {
            id,
            timestamp: snapshot.timestamp,
            user_id: snapshot.user_id,
            subscription_id: snapshot.subscription_id,
            content: snapshot.content,
            content_digest: snapshot.content_digest,
        };
        tables.snapshots.insert(id, snap.clone());
        Ok(snap)
    }

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.snapshots.len();
        tables.snapshots.retain(|_, s| s.timestamp >= cutoff);
        Ok((before - tables.snapshots.len()) as u64)
    }
}

#[async_trait]
impl ChasersRepo for FakeStore {
    fn select_due_chasers<'a>(&'a self, now: DateTime<Utc>, batch_size: i64) -> BatchStream<'a, DueChaser> {
        Box::pin(stream! {
            let tables = self.tables.lock().unwrap();
            let mut due: Vec<Chaser> = tables
                .chasers
                .values()
                .filter(|c| c.not_before <= now)
                .cloned()
                .collect();
            due.sort_by_key(|c| c.id);
            let mut out = Vec::new();
            for chaser in due {
                let subscription = tables.subscriptions.get(&chaser.subscription_id).cloned();
                let notifier = tables.notifiers.get(&chaser.notifier_id).cloned();
                if let (Some(subscription), Some(notifier)) = (subscription, notifier) {
                    out.push(DueChaser { chaser, subscription, notifier });
                }
            }
            drop(tables);
            for chunk in out.chunks(batch_size.max(1) as usize) {
                yield Ok(chunk.to_vec());
            }
        })
    }

    async fn upsert_chaser(&self, subscription_id: i64, notifier_id: i64, not_before: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        tables.chasers.insert(
            id,
            Chaser {
                id,
                subscription_id,
                notifier_id,
                not_before,
            },
        );
        Ok(())
    }

    async fn delete_chasers_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.chasers.len();
        tables.chasers.retain(|_, c| c.not_before > cutoff);
        Ok((before - tables.chasers.len()) as u64)
    }
}

#[async_trait]
impl UsersRepo for FakeStore {
    async fn create_user(&self, username: &str, password_credential: &str) -> Result<User> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let user = User {
            id,
            username: username.to_string(),
            password_credential: password_credential.to_string(),
            last_login_at: None,
            deleted_at: None,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.tables.lock().unwrap().users.get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn touch_last_login(&self, user_id: i64, ts: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.get_mut(&user_id) {
            user.last_login_at = Some(ts);
        }
        Ok(())
    }
}

#[async_trait]
impl NotifiersRepo for FakeStore {
    async fn create_notifier(&self, user_id: i64, platform: &str, platform_identifier: &str) -> Result<Notifier> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_id();
        let notifier = Notifier {
            id,
            user_id,
            platform: platform.to_string(),
            platform_identifier: platform_identifier.to_string(),
            verified: false,
            deleted_at: None,
        };
        tables.notifiers.insert(id, notifier.clone());
        Ok(notifier)
    }

    async fn get_notifier(&self, id: i64) -> Result<Option<Notifier>> {
        Ok(self.tables.lock().unwrap().notifiers.get(&id).cloned())
    }

    async fn get_notifier_for_user(&self, user_id: i64) -> Result<Option<Notifier>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .notifiers
            .values()
            .filter(|n| n.user_id == user_id && n.deleted_at.is_none())
            .min_by_key(|n| n.id)
            .cloned())
    }

    async fn mark_verified(&self, notifier_id: i64) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(notifier) = tables.notifiers.get_mut(&notifier_id) {
            notifier.verified = true;
        }
        Ok(())
    }

    async fn create_confirmation(&self, notifier_id: i64, nonce: Uuid, expiry: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.confirmations.insert(
            nonce,
            NotifierConfirmation {
                notifier_id,
                nonce,
                expiry,
            },
        );
        Ok(())
    }

    async fn consume_confirmation(&self, nonce: Uuid) -> Result<Option<NotifierConfirmation>> {
        let mut tables = self.tables.lock().unwrap();
        match tables.confirmations.get(&nonce) {
            Some(confirmation) if confirmation.expiry > Utc::now() => {
                Ok(tables.confirmations.remove(&nonce))
            }
            _ => Ok(None),
        }
    }
}
