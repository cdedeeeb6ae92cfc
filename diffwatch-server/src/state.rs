//! Shared application state injected into every axum handler via
//! `State<AppState>`, matching the teacher's `server::AppState` /
//! `ferrex_server::infra::app_state::AppState` shape: an `Arc`-wrapped
//! bundle of the store, config and collaborators, `Clone`-cheap.

use std::sync::Arc;

use diffwatch_core::{Fetcher, SenderRegistry, Store};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub fetcher: Arc<dyn Fetcher>,
    pub senders: Arc<SenderRegistry>,
    pub config: Arc<Config>,
}
