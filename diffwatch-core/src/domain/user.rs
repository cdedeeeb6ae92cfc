use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. Owns zero or more [`super::Notifier`]s and
/// [`super::Subscription`]s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Opaque credential (e.g. a password hash); never logged or serialised
    /// back to API responses.
    #[serde(skip_serializing)]
    pub password_credential: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}
