use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, warn};

use crate::domain::{Agent, CallAudio, CallDetail, CallRecord, Voice};
use crate::error::RepoResult;

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Fetches one page of calls, normalized and hydrated. Errors are
    /// reported instead of collapsing into an empty page.
    async fn list_calls(&self, limit: u16) -> RepoResult<Vec<CallRecord>>;

    async fn get_call(&self, conversation_id: &str) -> RepoResult<CallDetail>;

    async fn get_call_audio(&self, conversation_id: &str) -> RepoResult<CallAudio>;

    async fn list_agents(&self) -> RepoResult<Vec<Agent>>;

    async fn get_agent(&self, agent_id: &str) -> RepoResult<Value>;

    async fn list_voices(&self) -> RepoResult<Vec<Voice>>;

    /// Like [`list_calls`](Self::list_calls) but any failure yields an empty
    /// list.
    async fn fetch_call_history(&self, limit: u16) -> Vec<CallRecord> {
        match self.list_calls(limit).await {
            Ok(calls) => calls,
            Err(err) => {
                error!("error fetching call history: {err}");
                Vec::new()
            }
        }
    }

    /// `None` means the call is unavailable, not that it lasted zero seconds.
    async fn fetch_call_detail(&self, conversation_id: &str) -> Option<CallDetail> {
        match self.get_call(conversation_id).await {
            Ok(detail) => Some(detail),
            Err(err) => {
                warn!("error fetching call details for {conversation_id}: {err}");
                None
            }
        }
    }
}
