//! HTTP fetch → HTML parse → XPath selection → whitespace-normalised text.
//!
//! Grounded on the teacher's provider pattern (`providers::tmdb_api_provider`):
//! a struct wrapping a `reqwest::Client`, exposing async methods that map
//! third-party errors into [`crate::error::CoreError`].

mod html;
mod reqwest_fetcher;

#[cfg(test)]
pub mod fake;

pub use reqwest_fetcher::ReqwestFetcher;

#[cfg(test)]
pub use fake::FakeFetcher;

use async_trait::async_trait;

use crate::error::Result;

/// Result of extracting a subscription's endpoint at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointContent {
    pub text: String,
    pub title: String,
    pub image_url: String,
}

/// (URL, XPath) → extracted text, title, hero image. Injected into the
/// scheduler so tests can substitute a fake without making real HTTP calls.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get_endpoint_content(&self, url: &str, xpath: &str) -> Result<EndpointContent>;
}
