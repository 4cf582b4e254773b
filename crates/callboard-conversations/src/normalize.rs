use crate::domain::{
    Agent, CallAnalysis, CallDetail, CallRecord, CallStatus, Sentiment, TranscriptTurn, Voice,
};
use serde_json::Value;

const UNKNOWN_CONVERSATION_ID: &str = "unknown_id";

fn to_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// A field only counts as present when it carries a positive number; the
/// provider reports `0` for values it has not computed yet.
fn positive(value: Option<&Value>) -> Option<f64> {
    to_f64(value).filter(|n| n.is_finite() && *n > 0.0)
}

fn first_positive<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<f64> {
    candidates.into_iter().find_map(positive)
}

fn non_empty_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn first_text<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<String> {
    candidates.into_iter().find_map(non_empty_text)
}

fn is_success_flag(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
        || matches!(value, Some(Value::String(s)) if s == "success")
}

fn metadata_field<'a>(raw: &'a Value, key: &str) -> Option<&'a Value> {
    raw.get("metadata").and_then(|metadata| metadata.get(key))
}

fn start_time(raw: &Value, now_unix: i64) -> f64 {
    first_positive([
        raw.get("start_time_unix_secs"),
        raw.get("start_time"),
        metadata_field(raw, "start_time_unix_secs"),
    ])
    .unwrap_or(now_unix as f64)
}

fn end_time(raw: &Value) -> Option<f64> {
    first_positive([
        raw.get("end_time_unix_secs"),
        raw.get("end_time"),
        metadata_field(raw, "end_time_unix_secs"),
    ])
}

/// Seconds as reported, fractions kept. Zero means no usable duration.
fn duration_secs(raw: &Value, start: f64) -> f64 {
    let reported = first_positive([
        raw.get("call_duration_secs"),
        raw.get("duration_secs"),
        metadata_field(raw, "call_duration_secs"),
        metadata_field(raw, "duration_secs"),
    ])
    .or_else(|| positive(raw.get("duration_ms")).map(|ms| ms / 1000.0));

    if let Some(secs) = reported {
        return secs;
    }

    match end_time(raw) {
        Some(end) if end > start => end - start,
        _ => 0.0,
    }
}

fn status(raw: &Value) -> CallStatus {
    let text = non_empty_text(raw.get("status"));
    CallStatus::from_source(text.as_deref())
}

fn parse_analysis(analysis: &Value) -> CallAnalysis {
    CallAnalysis {
        call_summary: first_text([
            analysis.get("call_summary"),
            analysis.get("transcript_summary"),
            analysis.get("call_summary_title"),
        ]),
        user_sentiment: analysis
            .get("user_sentiment")
            .and_then(Value::as_str)
            .map(Sentiment::parse)
            .unwrap_or_default(),
        call_successful: is_success_flag(analysis.get("call_successful")),
    }
}

// Placeholder inference: a successful call is assumed to have a positive caller.
fn synthesize_analysis(raw: &Value) -> CallAnalysis {
    let successful = is_success_flag(raw.get("call_successful"));
    CallAnalysis {
        call_summary: first_text([raw.get("transcript_summary"), raw.get("call_summary_title")]),
        user_sentiment: if successful {
            Sentiment::Positive
        } else {
            Sentiment::Unknown
        },
        call_successful: successful,
    }
}

fn provided_analysis(raw: &Value) -> Option<CallAnalysis> {
    raw.get("analysis")
        .filter(|analysis| analysis.is_object())
        .map(parse_analysis)
}

fn transcript(raw: &Value) -> Option<Vec<TranscriptTurn>> {
    let items = raw.get("transcript")?.as_array()?;
    Some(
        items
            .iter()
            .filter(|item| item.is_object())
            .map(|item| TranscriptTurn {
                role: non_empty_text(item.get("role")).unwrap_or_default(),
                message: non_empty_text(item.get("message")).unwrap_or_default(),
                time_in_call_secs: to_f64(item.get("time_in_call_secs")),
            })
            .collect(),
    )
}

/// Normalizes one item of the conversation list endpoint. `now_unix` stands
/// in for a missing start time and should be fixed for a whole poll cycle.
pub fn normalize_call_item(raw: &Value, now_unix: i64) -> CallRecord {
    let start = start_time(raw, now_unix);

    CallRecord {
        conversation_id: first_text([raw.get("conversation_id"), raw.get("call_id")])
            .unwrap_or_else(|| UNKNOWN_CONVERSATION_ID.to_string()),
        agent_id: non_empty_text(raw.get("agent_id")),
        start_time_unix_secs: start.floor() as i64,
        duration_secs: duration_secs(raw, start),
        status: status(raw),
        transcript: transcript(raw),
        analysis: provided_analysis(raw).unwrap_or_else(|| synthesize_analysis(raw)),
    }
}

/// Normalizes a conversation detail payload with the same field rules as the
/// list, without synthesizing a missing analysis.
pub fn normalize_call_detail(raw: &Value, requested_id: &str, now_unix: i64) -> CallDetail {
    let start = start_time(raw, now_unix);

    CallDetail {
        conversation_id: first_text([raw.get("conversation_id"), raw.get("call_id")])
            .unwrap_or_else(|| requested_id.to_string()),
        agent_id: non_empty_text(raw.get("agent_id")),
        start_time_unix_secs: start.floor() as i64,
        duration_secs: duration_secs(raw, start),
        status: status(raw),
        transcript: transcript(raw),
        analysis: provided_analysis(raw),
        metadata: raw.get("metadata").filter(|m| m.is_object()).cloned(),
    }
}

/// Applies a successful hydration fetch to a list record.
pub fn merge_hydrated(record: &mut CallRecord, detail: CallDetail) {
    record.duration_secs = detail.duration_secs;
    if let Some(analysis) = detail.analysis {
        record.analysis = analysis;
    }
}

pub(crate) fn normalize_agent(raw: &Value) -> Option<Agent> {
    let agent_id = non_empty_text(raw.get("agent_id"))?;
    let prompt = raw
        .pointer("/conversation_config/agent/prompt/prompt")
        .and_then(|value| non_empty_text(Some(value)));

    Some(Agent {
        name: non_empty_text(raw.get("name")).unwrap_or_else(|| agent_id.clone()),
        agent_id,
        prompt,
    })
}

pub(crate) fn normalize_voice(raw: &Value) -> Option<Voice> {
    let voice_id = non_empty_text(raw.get("voice_id"))?;
    let labels = raw
        .get("labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(key, value)| non_empty_text(Some(value)).map(|v| (key.clone(), v)))
                .collect()
        })
        .unwrap_or_default();

    Some(Voice {
        name: non_empty_text(raw.get("name")).unwrap_or_else(|| voice_id.clone()),
        voice_id,
        category: non_empty_text(raw.get("category")),
        labels,
    })
}
