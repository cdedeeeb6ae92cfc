use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;

use super::html;
use super::{EndpointContent, Fetcher};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default [`Fetcher`]: GET via `reqwest`, parse+select via [`html`].
///
/// A per-request timeout (default 10s, see [`ReqwestFetcher::with_timeout`])
/// bounds a single slow fetch so it cannot exceed the scheduler's per-pass
/// timeout and starve the rest of a batch.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client with a fixed timeout never fails to build");
        Self { client }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn get_endpoint_content(&self, url: &str, xpath: &str) -> Result<EndpointContent> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let document = html::parse(&body)?;
        let text = html::select_text(&document, xpath)?;
        let title = html::select_title(&document)?;
        let image_url = html::select_image_url(&document)?;

        Ok(EndpointContent {
            text,
            title,
            image_url,
        })
    }
}
