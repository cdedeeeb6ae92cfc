use thiserror::Error;

/// Error taxonomy for the snapshot scheduler and its collaborators.
///
/// Variants are grouped by the failure kinds the scheduler's match arms need
/// to distinguish (transient vs. permanent-per-subscription vs. structural vs.
/// fatal-to-process), not by the originating crate.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Network/transport failure reaching an endpoint. Transient.
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    /// The response body could not be parsed as HTML, or the XPath
    /// expression failed to compile/evaluate. Permanent per-subscription.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// A store operation failed (connection, constraint, serialization).
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// No sender is registered for the notifier's platform. Structural.
    #[error("unsupported notifier platform: {0}")]
    UnsupportedPlatform(String),

    /// A delivery backend rejected or failed to send a message. Transient,
    /// not rolled back against the snapshot it accompanies.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Anything else that doesn't fit the taxonomy above but still needs to
    /// propagate with context (migrations, config parsing handed in by a
    /// caller, etc).
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
