//! Environment-variable-driven configuration, mirroring the teacher's
//! `server::config::Config::from_env` shape: `dotenv().ok()` first, then one
//! `env::var(...).unwrap_or_else(default)` per field with a parsed fallback
//! instead of a panic on a malformed value.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// All server + scheduler tunables, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub server_port: u16,
    pub server_dns: String,
    pub basic_auth_creds: HashMap<String, String>,
    pub database_url: String,

    pub mailgun_api_key: Option<String>,
    pub mailgun_domain: Option<String>,
    pub mailgun_sender_from: Option<String>,
    pub mailgun_timeout_secs: u64,

    pub wakeup_interval: Duration,
    pub chase_interval: Duration,
    pub poll_interval: Duration,
    pub chase_delay: Duration,
    pub no_content_ttl: Duration,
    pub snapshot_ttl: Duration,
    pub concurrency: usize,
    pub per_pass_timeout: Duration,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_seconds_or(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_parse_or(key, default_secs))
}

fn parse_basic_auth_creds(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            pair.split_once(':')
                .map(|(user, pass)| (user.to_string(), pass.to_string()))
        })
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let environment = env_or("ENVIRONMENT", "development");

        let basic_auth_creds = match env::var("BASIC_AUTH_CREDS") {
            Ok(raw) => parse_basic_auth_creds(&raw),
            Err(_) if environment == "development" => parse_basic_auth_creds("admin:password"),
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            server_port: env_parse_or("SERVER_PORT", 8080),
            server_dns: env_or("SERVER_DNS", "http://localhost:8080"),
            basic_auth_creds,
            database_url: env_or("DATABASE_URL", "sqlite://diffwatch.sqlite"),

            mailgun_api_key: env::var("MAILGUN_API_KEY").ok(),
            mailgun_domain: env::var("MAILGUN_DOMAIN").ok(),
            mailgun_sender_from: env::var("MAILGUN_SENDER_FROM").ok(),
            mailgun_timeout_secs: env_parse_or("MAILGUN_TIMEOUT_SECS", 10),

            wakeup_interval: env_seconds_or("WAKEUP_INTERVAL_SECS", 60 * 60),
            chase_interval: env_seconds_or("CHASE_INTERVAL_SECS", 7 * 60),
            poll_interval: env_seconds_or("POLL_INTERVAL_SECS", 60 * 60),
            chase_delay: env_seconds_or("CHASE_DELAY_SECS", 10 * 60),
            no_content_ttl: env_seconds_or("NO_CONTENT_TTL_SECS", 7 * 24 * 60 * 60),
            snapshot_ttl: env_seconds_or("SNAPSHOT_TTL_SECS", 14 * 24 * 60 * 60),
            concurrency: env_parse_or("SCHEDULER_CONCURRENCY", 5),
            per_pass_timeout: env_seconds_or("PER_PASS_TIMEOUT_SECS", 20),

            environment,
        })
    }

    pub fn scheduler_config(&self) -> diffwatch_core::SchedulerConfig {
        diffwatch_core::SchedulerConfig {
            wakeup_interval: self.wakeup_interval,
            chase_interval: self.chase_interval,
            poll_interval: self.poll_interval,
            chase_delay: self.chase_delay,
            no_content_ttl: self.no_content_ttl,
            snapshot_ttl: self.snapshot_ttl,
            concurrency: self.concurrency,
            per_pass_timeout: self.per_pass_timeout,
        }
    }
}
