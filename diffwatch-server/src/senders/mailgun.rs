//! Email delivery backend hitting Mailgun's REST API directly via
//! `reqwest`, grounded on the teacher's external-provider shape
//! (`ferrex_core::infra::media::providers::tmdb_api_provider::TmdbApiProvider`):
//! a thin struct wrapping a `reqwest::Client` plus the handful of
//! environment-derived settings it needs, with one `Result<T, ProviderError>`
//! style method per remote call, here mapped onto [`CoreError::Delivery`].

use std::time::Duration;

use async_trait::async_trait;
use diffwatch_core::domain::{Notifier, Snapshot, Subscription};
use diffwatch_core::error::{CoreError, Result};
use diffwatch_core::Sender;
use serde::Deserialize;

use super::templates::{snapshot_email, verification_email, EmailBody};

const MAILGUN_BASE: &str = "https://api.mailgun.net/v3";

pub struct MailgunSender {
    http: reqwest::Client,
    api_key: String,
    domain: String,
    from: String,
}

#[derive(Debug, Deserialize)]
struct MailgunResponse {
    id: Option<String>,
    message: Option<String>,
}

impl MailgunSender {
    pub fn new(api_key: String, domain: String, from: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(CoreError::Fetch)?;
        Ok(Self {
            http,
            api_key,
            domain,
            from,
        })
    }

    async fn send(&self, to: &str, body: EmailBody) -> Result<String> {
        let url = format!("{MAILGUN_BASE}/{}/messages", self.domain);

        let response = self
            .http
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.from.as_str()),
                ("to", to),
                ("subject", body.subject.as_str()),
                ("html", body.html.as_str()),
            ])
            .send()
            .await
            .map_err(CoreError::Fetch)?;

        let status = response.status();
        let parsed: MailgunResponse = response
            .json()
            .await
            .unwrap_or(MailgunResponse { id: None, message: None });

        if !status.is_success() {
            let reason = parsed.message.unwrap_or_else(|| status.to_string());
            return Err(CoreError::Delivery(reason));
        }

        Ok(parsed.id.unwrap_or_else(|| status.to_string()))
    }
}

#[async_trait]
impl Sender for MailgunSender {
    async fn send_snapshot(
        &self,
        notifier: &Notifier,
        subscription: &Subscription,
        previous: Option<&Snapshot>,
        current: &Snapshot,
    ) -> Result<String> {
        let body = snapshot_email(subscription, previous, current);
        self.send(&notifier.platform_identifier, body).await
    }

    async fn send_verification(&self, notifier: &Notifier, verify_url: &str) -> Result<String> {
        let body = verification_email(notifier, verify_url);
        self.send(&notifier.platform_identifier, body).await
    }
}
