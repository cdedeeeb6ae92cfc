use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Notifier;

/// A user's declared interest in an `(endpoint, xpath)` pair, delivered via a
/// specific notifier. A composite index exists on `(endpoint, xpath)` in the
/// store; nothing in this type enforces uniqueness itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub notifier_id: i64,
    pub endpoint: String,
    pub xpath: String,
    /// Captured from `<title>` at subscription time, not refreshed on poll.
    pub title: String,
    /// Open Graph or Twitter card image, captured at subscription time.
    pub image_url: String,
    pub last_poll_time: Option<DateTime<Utc>>,
    pub no_content_since: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A [`Subscription`] as yielded by `select_pollable`/`select_due_chasers`,
/// eagerly loaded with its owning [`Notifier`] so workers never need a
/// follow-up query mid-pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PollableSubscription {
    pub subscription: Subscription,
    pub notifier: Notifier,
}
