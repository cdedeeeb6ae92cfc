use chrono::{DateTime, Utc};

use super::{Notifier, Subscription};

/// A one-shot "recheck this subscription soon after an update" marker,
/// created after a successful notification and consumed by the chase pass.
/// Indexed on `(subscription_id, not_before)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chaser {
    pub id: i64,
    pub subscription_id: i64,
    pub notifier_id: i64,
    pub not_before: DateTime<Utc>,
}

/// A [`Chaser`] as yielded by `select_due_chasers`, eagerly loaded with its
/// [`Subscription`] and [`Notifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct DueChaser {
    pub chaser: Chaser,
    pub subscription: Subscription,
    pub notifier: Notifier,
}
