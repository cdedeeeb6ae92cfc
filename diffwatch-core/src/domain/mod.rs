//! Entity types shared by the store, scheduler, fetcher and senders.
//!
//! These mirror spec.md §3 exactly: fields are semantic attributes, ids are
//! opaque monotonically-assigned `i64` row ids (SQLite autoincrement) except
//! where a `Uuid` is explicitly called for (nonces, delivery ids).

mod chaser;
mod notifier;
mod snapshot;
mod subscription;
mod user;

pub use chaser::{Chaser, DueChaser};
pub use notifier::{Notifier, NotifierConfirmation};
pub use snapshot::Snapshot;
pub use subscription::{PollableSubscription, Subscription};
pub use user::User;
