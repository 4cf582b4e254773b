use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Call status as shown on the dashboard. Provider values outside the fixed
/// vocabulary are carried verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallStatus {
    Completed,
    Pending,
    Error,
    Unknown,
    Other(String),
}

impl CallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Completed => "completed",
            Self::Pending => "pending",
            Self::Error => "error",
            Self::Unknown => "unknown",
            Self::Other(raw) => raw.as_str(),
        }
    }

    /// Maps a provider-reported status onto the dashboard vocabulary.
    pub fn from_source(raw: Option<&str>) -> Self {
        match raw {
            None => Self::Unknown,
            Some("done") | Some("success") => Self::Completed,
            Some(other) => Self::from(other.to_string()),
        }
    }
}

impl From<String> for CallStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "" | "unknown" => Self::Unknown,
            "completed" => Self::Completed,
            "pending" => Self::Pending,
            "error" => Self::Error,
            _ => Self::Other(raw),
        }
    }
}

impl From<CallStatus> for String {
    fn from(status: CallStatus) -> Self {
        match status {
            CallStatus::Other(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Sentiment {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "neutral" => Self::Neutral,
            "negative" => Self::Negative,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_summary: Option<String>,
    #[serde(default)]
    pub user_sentiment: Sentiment,
    #[serde(default)]
    pub call_successful: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_call_secs: Option<f64>,
}

/// One row of the call log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub start_time_unix_secs: i64,
    pub duration_secs: f64,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptTurn>>,
    pub analysis: CallAnalysis,
}

/// A single conversation as returned by the detail endpoint. Unlike
/// [`CallRecord`], the analysis is only present when the provider sent one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDetail {
    pub conversation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub start_time_unix_secs: i64,
    pub duration_secs: f64,
    pub status: CallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptTurn>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<CallAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct CallAudio {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub uuid: String,
    pub created_at: String,
    pub content: String,
    pub parsed_content: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default = "default_hydration_concurrency")]
    pub hydration_concurrency: usize,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            hydration_concurrency: default_hydration_concurrency(),
        }
    }
}

fn default_hydration_concurrency() -> usize {
    8
}

/// Search box and status dropdown of the call log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallListFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl CallListFilter {
    pub fn matches(&self, call: &CallRecord) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                let summary = call.analysis.call_summary.as_deref().unwrap_or_default();
                call.conversation_id.to_lowercase().contains(&term)
                    || summary.to_lowercase().contains(&term)
            }
        };

        let matches_status = match self.status.as_deref() {
            None | Some("") | Some("all") => true,
            Some(status) => call.status.as_str() == status,
        };

        matches_search && matches_status
    }

    pub fn apply(&self, calls: &[CallRecord], limit: Option<usize>) -> Vec<CallRecord> {
        calls
            .iter()
            .filter(|call| self.matches(call))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, status: CallStatus, summary: Option<&str>) -> CallRecord {
        CallRecord {
            conversation_id: id.to_string(),
            agent_id: None,
            start_time_unix_secs: 1_000,
            duration_secs: 10.0,
            status,
            transcript: None,
            analysis: CallAnalysis {
                call_summary: summary.map(str::to_string),
                ..CallAnalysis::default()
            },
        }
    }

    #[test]
    fn status_maps_done_and_success_to_completed() {
        assert_eq!(CallStatus::from_source(Some("done")), CallStatus::Completed);
        assert_eq!(CallStatus::from_source(Some("success")), CallStatus::Completed);
        assert_eq!(CallStatus::from_source(None), CallStatus::Unknown);
        assert_eq!(CallStatus::from_source(Some("")), CallStatus::Unknown);
        assert_eq!(
            CallStatus::from_source(Some("in-progress")),
            CallStatus::Other("in-progress".to_string())
        );
        assert_eq!(CallStatus::from_source(Some("pending")), CallStatus::Pending);
    }

    #[test]
    fn status_serializes_as_plain_string() {
        assert_eq!(json!(CallStatus::Completed), json!("completed"));
        assert_eq!(json!(CallStatus::Other("failed".to_string())), json!("failed"));

        let parsed: CallStatus = serde_json::from_value(json!("processing")).expect("status");
        assert_eq!(parsed.as_str(), "processing");
    }

    #[test]
    fn sentiment_accepts_unknown_labels() {
        let parsed: Sentiment = serde_json::from_value(json!("Ecstatic")).expect("sentiment");
        assert_eq!(parsed, Sentiment::Unknown);
        assert_eq!(Sentiment::parse("negative"), Sentiment::Negative);
        assert_eq!(json!(Sentiment::Positive), json!("Positive"));
    }

    #[test]
    fn filter_matches_id_or_summary_case_insensitively() {
        let calls = vec![
            call("conv_ABC", CallStatus::Completed, None),
            call("conv_def", CallStatus::Pending, Some("Billing question")),
            call("conv_ghi", CallStatus::Completed, Some("Router fault")),
        ];

        let filter = CallListFilter {
            search: Some("abc".to_string()),
            status: None,
        };
        let ids: Vec<_> = filter
            .apply(&calls, None)
            .into_iter()
            .map(|c| c.conversation_id)
            .collect();
        assert_eq!(ids, vec!["conv_ABC"]);

        let filter = CallListFilter {
            search: Some("BILLING".to_string()),
            status: Some("all".to_string()),
        };
        assert_eq!(filter.apply(&calls, None).len(), 1);
    }

    #[test]
    fn filter_restricts_status_and_limit() {
        let calls = vec![
            call("a", CallStatus::Completed, None),
            call("b", CallStatus::Pending, None),
            call("c", CallStatus::Completed, None),
        ];

        let filter = CallListFilter {
            search: None,
            status: Some("completed".to_string()),
        };
        assert_eq!(filter.apply(&calls, None).len(), 2);
        assert_eq!(filter.apply(&calls, Some(1))[0].conversation_id, "a");
        assert_eq!(CallListFilter::default().apply(&calls, None).len(), 3);
    }
}
