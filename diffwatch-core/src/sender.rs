//! A tagged mapping of `platform -> sender`, per spec.md §4.5 and the
//! re-architecture guidance in §9 ("adding a platform means registering a
//! new value; the scheduler code must not switch on platform").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Notifier, Snapshot, Subscription};
use crate::error::{CoreError, Result};

/// A delivery backend for a notifier platform (e.g. `"email"`).
///
/// `send_snapshot`'s `previous` argument is a value captured before the new
/// snapshot row was inserted, not a live handle back into the store — see
/// spec.md §9, "previous-snapshot reference".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send_snapshot(
        &self,
        notifier: &Notifier,
        subscription: &Subscription,
        previous: Option<&Snapshot>,
        current: &Snapshot,
    ) -> Result<String>;

    async fn send_verification(&self, notifier: &Notifier, verify_url: &str) -> Result<String>;
}

/// Immutable-after-construction mapping from notifier platform to sender.
/// A lookup miss is a non-retryable [`CoreError::UnsupportedPlatform`].
#[derive(Clone, Default)]
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn Sender>>,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, platform: impl Into<String>, sender: Arc<dyn Sender>) {
        self.senders.insert(platform.into(), sender);
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn Sender>> {
        self.senders
            .get(platform)
            .cloned()
            .ok_or_else(|| CoreError::UnsupportedPlatform(platform.to_string()))
    }
}

/// A recording [`Sender`] used by the scheduler's test suite to assert
/// which `(previous, current)` pairs were dispatched, without pulling in
/// `mockall`'s call-matching DSL for simple "what was sent" assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSender {
    calls: std::sync::Mutex<Vec<(Option<Snapshot>, Snapshot)>>,
}

#[cfg(test)]
impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(Option<Snapshot>, Snapshot)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Sender for RecordingSender {
    async fn send_snapshot(
        &self,
        _notifier: &Notifier,
        _subscription: &Subscription,
        previous: Option<&Snapshot>,
        current: &Snapshot,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((previous.cloned(), current.clone()));
        Ok(format!("delivery-{}", current.id))
    }

    async fn send_verification(&self, _notifier: &Notifier, _verify_url: &str) -> Result<String> {
        Ok("verification-delivery".to_string())
    }
}
