use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded extraction of a subscription's selected text at a point in
/// time. Indexed by `(user_id, subscription_id)`. No unique constraint on
/// `content_digest` — dedup (invariant 2) is application logic, not a
/// database constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Snapshot {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_id: i64,
    pub subscription_id: i64,
    pub content: String,
    /// Hex SHA-1 of `content`, see [`crate::digest::digest`].
    pub content_digest: String,
}
