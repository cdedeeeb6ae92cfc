use std::time::Duration;

/// Scheduler tunables. Defaults mirror spec.md §4.6.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub wakeup_interval: Duration,
    pub chase_interval: Duration,
    pub poll_interval: Duration,
    pub chase_delay: Duration,
    pub no_content_ttl: Duration,
    pub snapshot_ttl: Duration,
    pub concurrency: usize,
    pub per_pass_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wakeup_interval: Duration::from_secs(60 * 60),
            chase_interval: Duration::from_secs(7 * 60),
            poll_interval: Duration::from_secs(60 * 60),
            chase_delay: Duration::from_secs(10 * 60),
            no_content_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            snapshot_ttl: Duration::from_secs(14 * 24 * 60 * 60),
            concurrency: 5,
            per_pass_timeout: Duration::from_secs(20),
        }
    }
}
