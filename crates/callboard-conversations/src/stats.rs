use chrono::{DateTime, Timelike};
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::{Agent, CallRecord, CallStatus, Sentiment};

const RECENT_CALLS: usize = 10;
const UNKNOWN_AGENT_ID: &str = "unknown";
const UNKNOWN_AGENT_NAME: &str = "Unknown agent";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentimentBreakdown {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    pub unknown: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyBucket {
    pub hour: u8,
    pub calls: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStats {
    pub agent_id: String,
    pub name: String,
    pub calls: usize,
    pub duration_secs: f64,
    pub successful: usize,
    pub avg_duration_secs: u64,
    pub success_rate: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationPoint {
    pub start_time_unix_secs: i64,
    pub duration_secs: f64,
}

/// Aggregates behind the business-intelligence view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_calls: usize,
    pub total_minutes: u64,
    pub total_cost: f64,
    pub successful_calls: usize,
    pub avg_duration_secs: u64,
    pub sentiment: SentimentBreakdown,
    pub hourly: Vec<HourlyBucket>,
    pub agents: Vec<AgentStats>,
    pub recent: Vec<CallRecord>,
    pub duration_series: Vec<DurationPoint>,
}

/// `numerator / denominator` rounded to the nearest whole number, 0 when
/// there is nothing to divide by.
fn rounded_div(numerator: f64, denominator: f64) -> u64 {
    if denominator <= 0.0 {
        return 0;
    }
    let value = (numerator / denominator).round();
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

fn is_successful(call: &CallRecord) -> bool {
    call.status == CallStatus::Completed || call.analysis.call_successful
}

fn utc_hour(start_time_unix_secs: i64) -> Option<usize> {
    DateTime::from_timestamp(start_time_unix_secs, 0).map(|ts| ts.hour() as usize)
}

impl DashboardStats {
    pub fn compute(calls: &[CallRecord], agents: &[Agent], cost_per_minute: f64) -> Self {
        let mut total_secs = 0.0_f64;
        let mut successful_calls = 0_usize;
        let mut sentiment = SentimentBreakdown::default();
        let mut hourly_counts = [0_usize; 24];
        let mut agent_rows: Vec<AgentStats> = Vec::new();
        let mut agent_index: HashMap<String, usize> = HashMap::new();

        for call in calls {
            total_secs += call.duration_secs;
            let success = is_successful(call);
            if success {
                successful_calls += 1;
            }

            if let Some(hour) = utc_hour(call.start_time_unix_secs) {
                hourly_counts[hour] += 1;
            }

            match call.analysis.user_sentiment {
                Sentiment::Positive => sentiment.positive += 1,
                Sentiment::Neutral => sentiment.neutral += 1,
                Sentiment::Negative => sentiment.negative += 1,
                Sentiment::Unknown => sentiment.unknown += 1,
            }

            let agent_id = call.agent_id.as_deref().unwrap_or(UNKNOWN_AGENT_ID);
            let idx = *agent_index.entry(agent_id.to_string()).or_insert_with(|| {
                let name = agents
                    .iter()
                    .find(|agent| agent.agent_id == agent_id)
                    .map(|agent| agent.name.clone())
                    .unwrap_or_else(|| UNKNOWN_AGENT_NAME.to_string());
                agent_rows.push(AgentStats {
                    agent_id: agent_id.to_string(),
                    name,
                    calls: 0,
                    duration_secs: 0.0,
                    successful: 0,
                    avg_duration_secs: 0,
                    success_rate: 0,
                });
                agent_rows.len() - 1
            });

            let row = &mut agent_rows[idx];
            row.calls += 1;
            row.duration_secs += call.duration_secs;
            if success {
                row.successful += 1;
            }
        }

        for row in &mut agent_rows {
            row.avg_duration_secs = rounded_div(row.duration_secs, row.calls as f64);
            row.success_rate = rounded_div(row.successful as f64 * 100.0, row.calls as f64);
        }

        let total_minutes = rounded_div(total_secs, 60.0);
        let total_cost = (total_minutes as f64 * cost_per_minute * 100.0).round() / 100.0;

        Self {
            total_calls: calls.len(),
            total_minutes,
            total_cost,
            successful_calls,
            avg_duration_secs: rounded_div(total_secs, calls.len() as f64),
            sentiment,
            hourly: hourly_counts
                .iter()
                .enumerate()
                .map(|(hour, calls)| HourlyBucket {
                    hour: hour as u8,
                    calls: *calls,
                })
                .collect(),
            agents: agent_rows,
            recent: calls.iter().take(RECENT_CALLS).cloned().collect(),
            duration_series: calls
                .iter()
                .rev()
                .map(|call| DurationPoint {
                    start_time_unix_secs: call.start_time_unix_secs,
                    duration_secs: call.duration_secs,
                })
                .collect(),
        }
    }
}
