use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A verified (or pending-verification) delivery address for a [`super::User`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notifier {
    pub id: i64,
    pub user_id: i64,
    /// Platform tag, e.g. `"email"`. Looked up in `SenderRegistry`.
    pub platform: String,
    /// The delivery address itself (email, webhook URL, etc).
    pub platform_identifier: String,
    pub verified: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A one-shot verification challenge for a [`Notifier`]. Treated as a
/// one-shot predicate: once consumed (or expired) it no longer verifies
/// anything, regardless of whether the row itself has been physically
/// removed by a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotifierConfirmation {
    pub notifier_id: i64,
    pub nonce: Uuid,
    pub expiry: DateTime<Utc>,
}
