//! SQLite-backed implementation of every repository port, behind a single
//! `sqlx::SqlitePool`. Queries are built with `sqlx::query_as`/`query`
//! bind-parameter calls (the dynamic style the teacher also uses for
//! schema-sensitive queries in `orchestration::persistence`), rather than the
//! `query!` compile-time-checked macros, since those require a live database
//! or committed offline query cache at build time.

use std::str::FromStr;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{Chaser, DueChaser, Notifier, NotifierConfirmation, PollableSubscription, Snapshot, Subscription, User};
use crate::error::{CoreError, Result};

use super::{
    BatchStream, ChasersRepo, NewSnapshot, NewSubscription, NotifiersRepo, Pagination,
    SnapshotsRepo, SubscriptionsRepo, UsersRepo,
};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| CoreError::Internal(format!("invalid database url: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let store = Self::connect("sqlite::memory:").await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Run embedded migrations. Called once at startup; failure here is
    /// fatal to the process per spec.md §7 ("cannot open store at startup").
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CoreError::Internal(format!("migration failed: {e}")))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct PollableRow {
    sub_id: i64,
    sub_user_id: i64,
    sub_notifier_id: i64,
    endpoint: String,
    xpath: String,
    title: String,
    image_url: String,
    last_poll_time: Option<DateTime<Utc>>,
    no_content_since: Option<DateTime<Utc>>,
    sub_deleted_at: Option<DateTime<Utc>>,
    notifier_id: i64,
    notifier_user_id: i64,
    platform: String,
    platform_identifier: String,
    verified: bool,
    notifier_deleted_at: Option<DateTime<Utc>>,
}

impl From<PollableRow> for PollableSubscription {
    fn from(r: PollableRow) -> Self {
        PollableSubscription {
            subscription: Subscription {
                id: r.sub_id,
                user_id: r.sub_user_id,
                notifier_id: r.sub_notifier_id,
                endpoint: r.endpoint,
                xpath: r.xpath,
                title: r.title,
                image_url: r.image_url,
                last_poll_time: r.last_poll_time,
                no_content_since: r.no_content_since,
                deleted_at: r.sub_deleted_at,
            },
            notifier: Notifier {
                id: r.notifier_id,
                user_id: r.notifier_user_id,
                platform: r.platform,
                platform_identifier: r.platform_identifier,
                verified: r.verified,
                deleted_at: r.notifier_deleted_at,
            },
        }
    }
}

const POLLABLE_SELECT: &str = r#"
SELECT
    s.id AS sub_id, s.user_id AS sub_user_id, s.notifier_id AS sub_notifier_id,
    s.endpoint, s.xpath, s.title, s.image_url,
    s.last_poll_time, s.no_content_since, s.deleted_at AS sub_deleted_at,
    n.id AS notifier_id, n.user_id AS notifier_user_id,
    n.platform, n.platform_identifier, n.verified, n.deleted_at AS notifier_deleted_at
FROM subscriptions s
JOIN notifiers n ON n.id = s.notifier_id
WHERE s.deleted_at IS NULL
  AND n.deleted_at IS NULL
  AND (s.no_content_since IS NULL OR s.no_content_since > ?1)
  AND (s.last_poll_time IS NULL OR s.last_poll_time <= ?2)
ORDER BY s.id
LIMIT ?3 OFFSET ?4
"#;

#[async_trait]
impl SubscriptionsRepo for SqliteStore {
    fn select_pollable<'a>(
        &'a self,
        batch_start: DateTime<Utc>,
        poll_interval: Duration,
        no_content_ttl: Duration,
        batch_size: i64,
    ) -> BatchStream<'a, PollableSubscription> {
        let pool = self.pool.clone();
        Box::pin(try_stream! {
            let no_content_cutoff = batch_start
                - chrono::Duration::from_std(no_content_ttl).unwrap_or(chrono::Duration::zero());
            let last_poll_cutoff = batch_start
                - chrono::Duration::from_std(poll_interval).unwrap_or(chrono::Duration::zero());
            let mut offset: i64 = 0;
            loop {
                let rows: Vec<PollableRow> = sqlx::query_as(POLLABLE_SELECT)
                    .bind(no_content_cutoff)
                    .bind(last_poll_cutoff)
                    .bind(batch_size)
                    .bind(offset)
                    .fetch_all(&pool)
                    .await?;

                let n = rows.len();
                if n == 0 {
                    break;
                }
                yield rows.into_iter().map(PollableSubscription::from).collect();
                if (n as i64) < batch_size {
                    break;
                }
                offset += batch_size;
            }
        })
    }

    async fn update_last_poll(&self, subscription_ids: &[i64], batch_start: DateTime<Utc>) -> Result<()> {
        if subscription_ids.is_empty() {
            return Ok(());
        }
        let placeholders = subscription_ids
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE subscriptions SET last_poll_time = ? WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(batch_start);
        for id in subscription_ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_last_poll_time(&self, subscription_id: i64, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET last_poll_time = ? WHERE id = ?")
            .bind(ts)
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_no_content_since(&self, subscription_id: i64, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE subscriptions SET no_content_since = ? WHERE id = ? AND no_content_since IS NULL",
        )
        .bind(ts)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_subscription(&self, new: NewSubscription) -> Result<Subscription> {
        let sub = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (user_id, notifier_id, endpoint, xpath, title, image_url)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, user_id, notifier_id, endpoint, xpath, title, image_url,
                      last_poll_time, no_content_since, deleted_at
            "#,
        )
        .bind(new.user_id)
        .bind(new.notifier_id)
        .bind(new.endpoint)
        .bind(new.xpath)
        .bind(new.title)
        .bind(new.image_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn get_subscription(&self, id: i64) -> Result<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(
            "SELECT id, user_id, notifier_id, endpoint, xpath, title, image_url, last_poll_time, no_content_since, deleted_at FROM subscriptions WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    async fn get_pollable_subscription(&self, id: i64) -> Result<Option<PollableSubscription>> {
        let row: Option<PollableRow> = sqlx::query_as(
            r#"
            SELECT
                s.id AS sub_id, s.user_id AS sub_user_id, s.notifier_id AS sub_notifier_id,
                s.endpoint, s.xpath, s.title, s.image_url,
                s.last_poll_time, s.no_content_since, s.deleted_at AS sub_deleted_at,
                n.id AS notifier_id, n.user_id AS notifier_user_id,
                n.platform, n.platform_identifier, n.verified, n.deleted_at AS notifier_deleted_at
            FROM subscriptions s
            JOIN notifiers n ON n.id = s.notifier_id
            WHERE s.id = ? AND s.deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PollableSubscription::from))
    }

    async fn list_subscriptions_for_user(&self, user_id: i64, page: Pagination) -> Result<Vec<Subscription>> {
        let subs = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, user_id, notifier_id, endpoint, xpath, title, image_url, last_poll_time, no_content_since, deleted_at
            FROM subscriptions
            WHERE user_id = ? AND deleted_at IS NULL
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(page.per_page)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }
}

#[async_trait]
impl SnapshotsRepo for SqliteStore {
    async fn latest_snapshot(&self, subscription_id: i64) -> Result<Option<Snapshot>> {
        let snap = sqlx::query_as::<_, Snapshot>(
            r#"
            SELECT id, timestamp, user_id, subscription_id, content, content_digest
            FROM snapshots
            WHERE subscription_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(snap)
    }

    async fn previous_snapshot(&self, subscription_id: i64) -> Result<Option<Snapshot>> {
        let snap = sqlx::query_as::<_, Snapshot>(
            r#"
            SELECT id, timestamp, user_id, subscription_id, content, content_digest
            FROM snapshots
            WHERE subscription_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT 1 OFFSET 1
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(snap)
    }

    async fn touch_snapshot_timestamp(&self, snapshot_id: i64, new_ts: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE snapshots SET timestamp = ? WHERE id = ?")
            .bind(new_ts)
            .bind(snapshot_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Snapshot> {
        let snap = sqlx::query_as::<_, Snapshot>(
            r#"
            INSERT INTO snapshots (timestamp, user_id, subscription_id, content, content_digest)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, timestamp, user_id, subscription_id, content, content_digest
            "#,
        )
        .bind(snapshot.timestamp)
        .bind(snapshot.user_id)
        .bind(snapshot.subscription_id)
        .bind(snapshot.content)
        .bind(snapshot.content_digest)
        .fetch_one(&self.pool)
        .await?;
        Ok(snap)
    }

    async fn delete_snapshots_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM snapshots WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct DueChaserRow {
    chaser_id: i64,
    chaser_subscription_id: i64,
    chaser_notifier_id: i64,
    not_before: DateTime<Utc>,
    sub_id: i64,
    sub_user_id: i64,
    sub_notifier_id: i64,
    endpoint: String,
    xpath: String,
    title: String,
    image_url: String,
    last_poll_time: Option<DateTime<Utc>>,
    no_content_since: Option<DateTime<Utc>>,
    sub_deleted_at: Option<DateTime<Utc>>,
    notifier_id: i64,
    notifier_user_id: i64,
    platform: String,
    platform_identifier: String,
    verified: bool,
    notifier_deleted_at: Option<DateTime<Utc>>,
}

impl From<DueChaserRow> for DueChaser {
    fn from(r: DueChaserRow) -> Self {
        DueChaser {
            chaser: Chaser {
                id: r.chaser_id,
                subscription_id: r.chaser_subscription_id,
                notifier_id: r.chaser_notifier_id,
                not_before: r.not_before,
            },
            subscription: Subscription {
                id: r.sub_id,
                user_id: r.sub_user_id,
                notifier_id: r.sub_notifier_id,
                endpoint: r.endpoint,
                xpath: r.xpath,
                title: r.title,
                image_url: r.image_url,
                last_poll_time: r.last_poll_time,
                no_content_since: r.no_content_since,
                deleted_at: r.sub_deleted_at,
            },
            notifier: Notifier {
                id: r.notifier_id,
                user_id: r.notifier_user_id,
                platform: r.platform,
                platform_identifier: r.platform_identifier,
                verified: r.verified,
                deleted_at: r.notifier_deleted_at,
            },
        }
    }
}

#[async_trait]
impl ChasersRepo for SqliteStore {
    fn select_due_chasers<'a>(&'a self, now: DateTime<Utc>, batch_size: i64) -> BatchStream<'a, DueChaser> {
        let pool = self.pool.clone();
        Box::pin(try_stream! {
            let mut offset: i64 = 0;
            loop {
                let rows: Vec<DueChaserRow> = sqlx::query_as(
                    r#"
                    SELECT
                        c.id AS chaser_id, c.subscription_id AS chaser_subscription_id,
                        c.notifier_id AS chaser_notifier_id, c.not_before,
                        s.id AS sub_id, s.user_id AS sub_user_id, s.notifier_id AS sub_notifier_id,
                        s.endpoint, s.xpath, s.title, s.image_url,
                        s.last_poll_time, s.no_content_since, s.deleted_at AS sub_deleted_at,
                        n.id AS notifier_id, n.user_id AS notifier_user_id,
                        n.platform, n.platform_identifier, n.verified, n.deleted_at AS notifier_deleted_at
                    FROM chasers c
                    JOIN subscriptions s ON s.id = c.subscription_id
                    JOIN notifiers n ON n.id = c.notifier_id
                    WHERE c.not_before <= ?1
                    ORDER BY c.id
                    LIMIT ?2 OFFSET ?3
                    "#,
                )
                .bind(now)
                .bind(batch_size)
                .bind(offset)
                .fetch_all(&pool)
                .await?;

                let n = rows.len();
                if n == 0 {
                    break;
                }
                yield rows.into_iter().map(DueChaser::from).collect();
                if (n as i64) < batch_size {
                    break;
                }
                offset += batch_size;
            }
        })
    }

    async fn upsert_chaser(&self, subscription_id: i64, notifier_id: i64, not_before: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO chasers (subscription_id, notifier_id, not_before) VALUES (?, ?, ?)",
        )
        .bind(subscription_id)
        .bind(notifier_id)
        .bind(not_before)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_chasers_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chasers WHERE not_before <= ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UsersRepo for SqliteStore {
    async fn create_user(&self, username: &str, password_credential: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, password_credential)
            VALUES (?, ?)
            RETURNING id, username, password_credential, last_login_at, deleted_at
            "#,
        )
        .bind(username)
        .bind(password_credential)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_credential, last_login_at, deleted_at FROM users WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, password_credential, last_login_at, deleted_at FROM users WHERE username = ? AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn touch_last_login(&self, user_id: i64, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = ? WHERE id = ?")
            .bind(ts)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotifiersRepo for SqliteStore {
    async fn create_notifier(&self, user_id: i64, platform: &str, platform_identifier: &str) -> Result<Notifier> {
        let notifier = sqlx::query_as::<_, Notifier>(
            r#"
            INSERT INTO notifiers (user_id, platform, platform_identifier, verified)
            VALUES (?, ?, ?, 0)
            RETURNING id, user_id, platform, platform_identifier, verified, deleted_at
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .bind(platform_identifier)
        .fetch_one(&self.pool)
        .await?;
        Ok(notifier)
    }

    async fn get_notifier(&self, id: i64) -> Result<Option<Notifier>> {
        let notifier = sqlx::query_as::<_, Notifier>(
            "SELECT id, user_id, platform, platform_identifier, verified, deleted_at FROM notifiers WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notifier)
    }

    async fn get_notifier_for_user(&self, user_id: i64) -> Result<Option<Notifier>> {
        let notifier = sqlx::query_as::<_, Notifier>(
            "SELECT id, user_id, platform, platform_identifier, verified, deleted_at FROM notifiers WHERE user_id = ? AND deleted_at IS NULL ORDER BY id LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(notifier)
    }

    async fn mark_verified(&self, notifier_id: i64) -> Result<()> {
        sqlx::query("UPDATE notifiers SET verified = 1 WHERE id = ?")
            .bind(notifier_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_confirmation(&self, notifier_id: i64, nonce: Uuid, expiry: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO notifier_confirmations (notifier_id, nonce, expiry) VALUES (?, ?, ?)")
            .bind(notifier_id)
            .bind(nonce)
            .bind(expiry)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn consume_confirmation(&self, nonce: Uuid) -> Result<Option<NotifierConfirmation>> {
        let mut tx = self.pool.begin().await?;
        let confirmation = sqlx::query_as::<_, NotifierConfirmation>(
            "SELECT notifier_id, nonce, expiry FROM notifier_confirmations WHERE nonce = ? AND expiry > ?",
        )
        .bind(nonce)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        if confirmation.is_some() {
            sqlx::query("DELETE FROM notifier_confirmations WHERE nonce = ?")
                .bind(nonce)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(confirmation)
    }
}
