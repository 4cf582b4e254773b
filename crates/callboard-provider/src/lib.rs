mod webhook;

use anyhow::{anyhow, Context, Result};
use callboard_config::ProviderConfig;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client, Url,
};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub use webhook::WebhookHistoryClient;

const API_KEY_HEADER: &str = "xi-api-key";

/// Read-only client for the conversational-AI REST API.
#[derive(Clone)]
pub struct ProviderClient {
    cfg: ProviderConfig,
    http: Client,
}

#[derive(Debug, Clone)]
pub struct BinaryPayload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ProviderClient {
    pub fn new(cfg: ProviderConfig) -> Result<Self> {
        let timeout = Duration::from_secs_f64(cfg.timeout_seconds.max(1.0));
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to construct reqwest client")?;

        Ok(Self { cfg, http })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.cfg
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url> {
        let mut url = Url::parse(&self.cfg.url).context("invalid provider URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("provider URL cannot carry a path: {}", self.cfg.url))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut qp = url.query_pairs_mut();
            for (key, value) in query {
                qp.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn get(&self, url: Url, accept: &str) -> Result<reqwest::Response> {
        debug!("provider GET {}", url.path());
        let mut req = self.http.get(url).header(ACCEPT, accept);
        if !self.cfg.api_key.is_empty() {
            req = req.header(API_KEY_HEADER, self.cfg.api_key.as_str());
        }

        let response = req.send().await.context("provider request failed")?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("provider returned {}: {}", status, text));
        }

        Ok(response)
    }

    pub async fn request_json(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Value> {
        let url = self.endpoint(segments, query)?;
        let response = self.get(url, "application/json").await?;
        let status = response.status();
        let text = response.text().await.with_context(|| {
            format!("failed to read provider response body (status {})", status)
        })?;

        serde_json::from_str(&text)
            .with_context(|| format!("invalid provider JSON response: {}", truncate_for_error(&text)))
    }

    pub async fn request_bytes(&self, segments: &[&str]) -> Result<BinaryPayload> {
        let url = self.endpoint(segments, &[])?;
        let response = self.get(url, "*/*").await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .context("failed to read provider binary body")?;

        Ok(BinaryPayload {
            content_type,
            bytes: bytes.to_vec(),
        })
    }

    pub async fn list_conversations(&self, page_size: u16) -> Result<Value> {
        self.request_json(
            &["convai", "conversations"],
            &[("page_size", page_size.max(1).to_string())],
        )
        .await
    }

    pub async fn conversation(&self, conversation_id: &str) -> Result<Value> {
        self.request_json(&["convai", "conversations", conversation_id], &[])
            .await
    }

    pub async fn conversation_audio(&self, conversation_id: &str) -> Result<BinaryPayload> {
        self.request_bytes(&["convai", "conversations", conversation_id, "audio"])
            .await
    }

    pub async fn agents(&self) -> Result<Value> {
        self.request_json(&["convai", "agents"], &[]).await
    }

    pub async fn agent(&self, agent_id: &str) -> Result<Value> {
        self.request_json(&["convai", "agents", agent_id], &[]).await
    }

    pub async fn voices(&self) -> Result<Value> {
        self.request_json(&["voices"], &[]).await
    }

    pub async fn ping(&self) -> Result<()> {
        self.list_conversations(1).await.map(|_| ())
    }
}

pub(crate) fn truncate_for_error(body: &str) -> String {
    const LIMIT: usize = 240;
    let compact = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= LIMIT {
        compact
    } else {
        format!("{}...", compact.chars().take(LIMIT).collect::<String>())
    }
}
