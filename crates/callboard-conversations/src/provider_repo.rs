use async_trait::async_trait;
use callboard_provider::ProviderClient;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::{Agent, CallAudio, CallDetail, CallRecord, RepoConfig, Voice};
use crate::error::{RepoError, RepoResult};
use crate::normalize::{
    merge_hydrated, normalize_agent, normalize_call_detail, normalize_call_item, normalize_voice,
};
use crate::repo::ConversationRepository;

#[derive(Clone)]
pub struct ProviderConversationRepository {
    client: ProviderClient,
    cfg: RepoConfig,
}

impl ProviderConversationRepository {
    pub fn new(client: ProviderClient, cfg: RepoConfig) -> Self {
        Self { client, cfg }
    }

    pub fn client(&self) -> &ProviderClient {
        &self.client
    }

    fn now_unix() -> i64 {
        Utc::now().timestamp()
    }

    /// Re-fetches every record whose duration is still zero. At most
    /// `hydration_concurrency` detail requests are in flight at once; a
    /// failed fetch leaves its record untouched.
    async fn hydrate(&self, records: &mut [CallRecord], now_unix: i64) {
        let pending: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.duration_secs <= 0.0)
            .map(|(idx, record)| (idx, record.conversation_id.clone()))
            .collect();

        if pending.is_empty() {
            return;
        }

        debug!("hydrating {} calls with unknown duration", pending.len());

        let sem = Arc::new(Semaphore::new(self.cfg.hydration_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, conversation_id) in pending {
            let permit = match sem.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let client = self.client.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let result = client.conversation(&conversation_id).await;
                (idx, conversation_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, conversation_id, Ok(raw))) if raw.is_object() => {
                    let detail = normalize_call_detail(&raw, &conversation_id, now_unix);
                    merge_hydrated(&mut records[idx], detail);
                }
                Ok((_, conversation_id, Ok(_))) => {
                    warn!("detail for {conversation_id} was not an object; keeping list values");
                }
                Ok((_, conversation_id, Err(err))) => {
                    warn!("failed to hydrate call {conversation_id}: {err:#}");
                }
                Err(err) => {
                    warn!("hydration task failed: {err}");
                }
            }
        }
    }
}

fn envelope_items<'a>(body: &'a Value, key: &str) -> RepoResult<&'a Vec<Value>> {
    body.get(key).and_then(Value::as_array).ok_or_else(|| {
        RepoError::unexpected_shape(format!("response has no `{key}` array"))
    })
}

fn require_id(value: &str, what: &str) -> RepoResult<()> {
    if value.trim().is_empty() {
        return Err(RepoError::invalid_argument(format!("{what} must not be empty")));
    }
    Ok(())
}

#[async_trait]
impl ConversationRepository for ProviderConversationRepository {
    async fn list_calls(&self, limit: u16) -> RepoResult<Vec<CallRecord>> {
        if limit == 0 {
            return Err(RepoError::invalid_argument("limit must be positive"));
        }

        info!("fetching call history (page_size={limit})");
        let body = self.client.list_conversations(limit).await?;
        let items = envelope_items(&body, "conversations")?;

        let now_unix = Self::now_unix();
        let mut records: Vec<CallRecord> = items
            .iter()
            .map(|item| normalize_call_item(item, now_unix))
            .collect();

        self.hydrate(&mut records, now_unix).await;
        Ok(records)
    }

    async fn get_call(&self, conversation_id: &str) -> RepoResult<CallDetail> {
        require_id(conversation_id, "conversation id")?;

        let raw = self.client.conversation(conversation_id).await?;
        if !raw.is_object() {
            return Err(RepoError::unexpected_shape(format!(
                "conversation {conversation_id} is not an object"
            )));
        }

        Ok(normalize_call_detail(&raw, conversation_id, Self::now_unix()))
    }

    async fn get_call_audio(&self, conversation_id: &str) -> RepoResult<CallAudio> {
        require_id(conversation_id, "conversation id")?;

        let payload = self.client.conversation_audio(conversation_id).await?;
        Ok(CallAudio {
            content_type: payload.content_type,
            bytes: payload.bytes,
        })
    }

    async fn list_agents(&self) -> RepoResult<Vec<Agent>> {
        let body = self.client.agents().await?;
        let items = envelope_items(&body, "agents")?;
        Ok(items.iter().filter_map(normalize_agent).collect())
    }

    async fn get_agent(&self, agent_id: &str) -> RepoResult<Value> {
        require_id(agent_id, "agent id")?;
        Ok(self.client.agent(agent_id).await?)
    }

    async fn list_voices(&self) -> RepoResult<Vec<Voice>> {
        let body = self.client.voices().await?;
        let items = envelope_items(&body, "voices")?;
        Ok(items.iter().filter_map(normalize_voice).collect())
    }
}
