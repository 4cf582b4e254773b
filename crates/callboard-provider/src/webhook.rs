use anyhow::{anyhow, Context, Result};
use callboard_config::WebhookConfig;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;

use crate::truncate_for_error;

/// Client for the public request-inspection service that records webhook
/// deliveries sent by the voice agent.
#[derive(Clone)]
pub struct WebhookHistoryClient {
    cfg: WebhookConfig,
    http: Client,
}

impl WebhookHistoryClient {
    pub fn new(cfg: WebhookConfig) -> Result<Self> {
        let timeout = Duration::from_secs_f64(cfg.timeout_seconds.max(1.0));
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to construct reqwest client")?;

        Ok(Self { cfg, http })
    }

    pub fn is_configured(&self) -> bool {
        self.cfg.enabled && !self.cfg.url.is_empty()
    }

    fn history_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.cfg.url).context("invalid webhook history URL")?;
        url.query_pairs_mut()
            .append_pair("sorting", "newest")
            .append_pair("per_page", &self.cfg.per_page.max(1).to_string());
        Ok(url)
    }

    pub async fn recent_requests(&self) -> Result<Value> {
        if !self.is_configured() {
            return Err(anyhow!("webhook history URL is not configured"));
        }

        let url = self.history_url()?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("webhook history request failed")?;
        let status = response.status();
        let text = response.text().await.with_context(|| {
            format!("failed to read webhook history body (status {})", status)
        })?;

        if !status.is_success() {
            return Err(anyhow!("webhook history returned {}: {}", status, text));
        }

        serde_json::from_str(&text).with_context(|| {
            format!("invalid webhook history JSON: {}", truncate_for_error(&text))
        })
    }
}
