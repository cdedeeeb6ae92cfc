//! HTTP API and process entry point for Diffwatch.
//!
//! Exposes [`router`]/[`AppState`] as a library target (mirroring the
//! teacher's `ferrex_server::create_app` split) so integration tests under
//! `tests/` can drive the real router end-to-end via `tower::ServiceExt`
//! instead of duplicating handler logic.

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod password;
pub mod senders;
pub mod state;

pub use api::router;
pub use config::Config;
pub use state::AppState;

/// Test helpers shared by `tests/api.rs`, grounded on the teacher's
/// `ferrex_server::tests::test_utils` module (`setup_test_state`,
/// `test_request_json`, `parse_json_response`). Not `#[cfg(test)]`-gated:
/// integration tests under `tests/` link against this crate's normal
/// (non-`cfg(test)`) build, so helpers they need must be compiled into it
/// unconditionally — the same reason the teacher's own `test_endpoints.rs`
/// ships ungated.
pub mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, Response, StatusCode};
    use diffwatch_core::domain::{Notifier, Snapshot, Subscription};
    use diffwatch_core::error::Result as CoreResult;
    use diffwatch_core::{EndpointContent, Fetcher, Sender, SenderRegistry, SqliteStore};
    use serde::de::DeserializeOwned;
    use std::sync::Mutex;

    use crate::config::Config;
    use crate::state::AppState;

    /// A [`Fetcher`] standing in for [`diffwatch_core::ReqwestFetcher`] in
    /// integration tests: returns pre-scripted content per URL instead of
    /// making a real HTTP call, the same role `FakeFetcher` plays in
    /// `diffwatch-core`'s own test suite (not reusable here directly since
    /// it is `#[cfg(test)]`-private to that crate).
    #[derive(Default)]
    pub struct ScriptedFetcher {
        scripts: Mutex<HashMap<String, EndpointContent>>,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&self, url: &str, content: EndpointContent) {
            self.scripts.lock().unwrap().insert(url.to_string(), content);
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn get_endpoint_content(&self, url: &str, _xpath: &str) -> CoreResult<EndpointContent> {
            Ok(self.scripts.lock().unwrap().get(url).cloned().unwrap_or_default())
        }
    }

    /// A recording [`Sender`] registered under `"email"` in
    /// [`setup_test_state`], standing in for [`diffwatch_core::sender::RecordingSender`]
    /// (which is `#[cfg(test)]`-private to that crate and so unreachable
    /// from here) so integration tests can exercise delivery-triggering
    /// routes without a real Mailgun account.
    #[derive(Default)]
    pub struct RecordingSender {
        calls: Mutex<Vec<(Option<Snapshot>, Snapshot)>>,
    }

    impl RecordingSender {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<(Option<Snapshot>, Snapshot)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Sender for RecordingSender {
        async fn send_snapshot(
            &self,
            _notifier: &Notifier,
            _subscription: &Subscription,
            previous: Option<&Snapshot>,
            current: &Snapshot,
        ) -> CoreResult<String> {
            self.calls.lock().unwrap().push((previous.cloned(), current.clone()));
            Ok(format!("delivery-{}", current.id))
        }

        async fn send_verification(&self, _notifier: &Notifier, _verify_url: &str) -> CoreResult<String> {
            Ok("verification-delivery".to_string())
        }
    }

    fn test_config() -> Config {
        Config {
            environment: "test".to_string(),
            server_port: 0,
            server_dns: "http://localhost:8080".to_string(),
            basic_auth_creds: HashMap::from([("admin".to_string(), "password".to_string())]),
            database_url: "sqlite::memory:".to_string(),
            mailgun_api_key: None,
            mailgun_domain: None,
            mailgun_sender_from: None,
            mailgun_timeout_secs: 10,
            wakeup_interval: std::time::Duration::from_secs(3600),
            chase_interval: std::time::Duration::from_secs(300),
            poll_interval: std::time::Duration::from_secs(3600),
            chase_delay: std::time::Duration::from_secs(600),
            no_content_ttl: std::time::Duration::from_secs(7 * 24 * 3600),
            snapshot_ttl: std::time::Duration::from_secs(14 * 24 * 3600),
            concurrency: 5,
            per_pass_timeout: std::time::Duration::from_secs(20),
        }
    }

    /// Fresh in-memory store + scripted fetcher + a [`RecordingSender`]
    /// registered under `"email"`, wired into an [`AppState`] ready to hand
    /// to [`crate::router`].
    pub async fn setup_test_state() -> (AppState, Arc<ScriptedFetcher>) {
        let store = SqliteStore::connect("sqlite::memory:").await.expect("connect");
        store.migrate().await.expect("migrate");
        let fetcher = Arc::new(ScriptedFetcher::new());
        let mut senders = SenderRegistry::new();
        senders.register("email", Arc::new(RecordingSender::new()));
        let state = AppState {
            store: Arc::new(store),
            fetcher: fetcher.clone() as Arc<dyn Fetcher>,
            senders: Arc::new(senders),
            config: Arc::new(test_config()),
        };
        (state, fetcher)
    }

    pub fn basic_auth_header() -> (header::HeaderName, String) {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode("admin:password");
        (header::AUTHORIZATION, format!("Basic {encoded}"))
    }

    pub fn form_request(method: &str, uri: &str, auth: bool, form: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if auth {
            let (name, value) = basic_auth_header();
            builder = builder.header(name, value);
        }
        builder.body(Body::from(form.to_string())).unwrap()
    }

    pub fn get_request(uri: &str, auth: bool) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if auth {
            let (name, value) = basic_auth_header();
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    pub async fn parse_json_response<T: DeserializeOwned>(response: Response<Body>) -> (StatusCode, T) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed = serde_json::from_slice(&bytes)
            .unwrap_or_else(|e| panic!("failed to parse response body: {e}, body was {:?}", String::from_utf8_lossy(&bytes)));
        (status, parsed)
    }
}
