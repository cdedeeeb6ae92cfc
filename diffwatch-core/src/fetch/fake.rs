//! Scriptable [`Fetcher`] double keyed by endpoint URL, used by the
//! scheduler's test suite to drive scenarios S1-S6 without real HTTP calls.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{EndpointContent, Fetcher};
use crate::error::Result;

#[derive(Default)]
pub struct FakeFetcher {
    /// Per-URL queue of responses, popped front-to-back on each call so a
    /// test can script a sequence of successive polls.
    scripts: Mutex<HashMap<String, Vec<Result<EndpointContent>>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, url: &str, text: &str) {
        self.push(
            url,
            Ok(EndpointContent {
                text: text.to_string(),
                title: String::new(),
                image_url: String::new(),
            }),
        );
    }

    pub fn push(&self, url: &str, result: Result<EndpointContent>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(result);
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn get_endpoint_content(&self, url: &str, _xpath: &str) -> Result<EndpointContent> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(url)
            .filter(|queue| !queue.is_empty())
            .unwrap_or_else(|| panic!("no scripted response left for {url}"));
        queue.remove(0)
    }
}
