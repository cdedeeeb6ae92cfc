//! Snapshot scheduler and change-detection engine for Diffwatch.
//!
//! Periodically fetches a set of user-declared `(endpoint, xpath)` pairs,
//! extracts text, and notifies a verified channel when the extracted value
//! changes. See the crate's top-level design document for the full
//! component breakdown (clock, fetcher, digest, store, sender registry,
//! scheduler).

pub mod clock;
pub mod digest;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod scheduler;
pub mod sender;
pub mod store;

pub use clock::{Clock, ClockEvent, EventStream, SystemClock, VirtualClock};
pub use digest::digest;
pub use error::{CoreError, Result};
pub use fetch::{EndpointContent, Fetcher, ReqwestFetcher};
pub use metrics::{PassMetrics, PassMetricsSnapshot};
pub use scheduler::{PollOutcome, Scheduler, SchedulerConfig};
pub use sender::{Sender, SenderRegistry};
pub use store::{SqliteStore, Store};
