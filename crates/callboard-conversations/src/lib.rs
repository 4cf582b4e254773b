mod domain;
mod error;
mod normalize;
mod provider_repo;
mod repo;
mod stats;
mod webhook;

pub use domain::{
    Agent, CallAnalysis, CallAudio, CallDetail, CallListFilter, CallRecord, CallStatus,
    RepoConfig, Sentiment, TranscriptTurn, Voice, WebhookRequest,
};
pub use error::{RepoError, RepoResult};
pub use normalize::{merge_hydrated, normalize_call_detail, normalize_call_item};
pub use provider_repo::ProviderConversationRepository;
pub use repo::ConversationRepository;
pub use stats::{AgentStats, DashboardStats, DurationPoint, HourlyBucket, SentimentBreakdown};
pub use webhook::{fallback_requests, parse_webhook_history, WebhookFeed};
