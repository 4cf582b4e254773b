mod poll;

use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use callboard_config::AppConfig;
use callboard_conversations::{
    fallback_requests, Agent, CallListFilter, CallRecord, ConversationRepository,
    DashboardStats, ProviderConversationRepository, RepoConfig, RepoError, WebhookFeed,
    WebhookRequest,
};
use callboard_provider::{ProviderClient, WebhookHistoryClient};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::time::Instant;
use tracing::{error, info, warn};

pub use poll::{Snapshot, SharedSnapshot};

#[derive(Debug, Clone, Default, Serialize)]
struct HistoryView {
    calls: Vec<CallRecord>,
    agents: Vec<Agent>,
}

#[derive(Clone)]
struct AppState {
    repo: Arc<ProviderConversationRepository>,
    webhooks: WebhookFeed,
    history: SharedSnapshot<HistoryView>,
    webhook_feed: SharedSnapshot<Vec<WebhookRequest>>,
    page_size: u16,
    cost_per_minute: f64,
    static_dir: PathBuf,
}

#[derive(Deserialize)]
struct CallsQuery {
    search: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
}

impl AppState {
    fn new(cfg: &AppConfig, static_dir: PathBuf) -> Result<Self> {
        let client = ProviderClient::new(cfg.provider.clone())?;
        let repo = ProviderConversationRepository::new(
            client,
            RepoConfig {
                hydration_concurrency: cfg.history.hydration_concurrency,
            },
        );
        let webhooks = WebhookFeed::new(WebhookHistoryClient::new(cfg.webhook.clone())?);

        Ok(Self {
            repo: Arc::new(repo),
            webhooks,
            history: Snapshot::shared(HistoryView::default()),
            webhook_feed: Snapshot::shared(fallback_requests()),
            page_size: cfg.history.page_size,
            cost_per_minute: cfg.billing.cost_per_minute,
            static_dir,
        })
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One poll cycle of the call log: the page of calls and the agent list are
/// fetched together and replace the previous snapshot as a unit.
async fn refresh_history(state: &AppState) {
    let (calls, agents) = tokio::join!(
        state.repo.list_calls(state.page_size),
        state.repo.list_agents()
    );

    let mut snapshot = state.history.write().await;
    let now = now_unix();
    match calls {
        Ok(calls) => {
            let agents = agents.unwrap_or_else(|err| {
                warn!("agent list refresh failed, keeping previous agents: {err}");
                snapshot.value.agents.clone()
            });
            info!("call history refreshed ({} calls)", calls.len());
            snapshot.record_success(HistoryView { calls, agents }, now);
        }
        Err(err) => {
            error!("call history refresh failed: {err}");
            snapshot.record_failure(err.to_string(), now);
        }
    }
}

async fn refresh_webhooks(state: &AppState) {
    if !state.webhooks.is_configured() {
        return;
    }

    let result = state.webhooks.fetch().await;
    let mut snapshot = state.webhook_feed.write().await;
    let now = now_unix();
    match result {
        Ok(requests) if !requests.is_empty() => snapshot.record_success(requests, now),
        Ok(_) => snapshot.record_unchanged(now),
        Err(err) => {
            warn!("error fetching webhook data (keeping previous feed): {err}");
            snapshot.record_failure(err.to_string(), now);
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/calls", get(api_calls))
        .route("/api/calls/refresh", post(api_refresh_calls))
        .route("/api/calls/:id", get(api_call_detail))
        .route("/api/calls/:id/audio", get(api_call_audio))
        .route("/api/agents", get(api_agents))
        .route("/api/agents/:id", get(api_agent))
        .route("/api/voices", get(api_voices))
        .route("/api/stats", get(api_stats))
        .route("/api/webhooks", get(api_webhooks))
        .fallback(get(static_fallback))
        .with_state(state)
}

pub async fn run_server(
    cfg: AppConfig,
    host: String,
    port: u16,
    static_dir: PathBuf,
) -> Result<()> {
    let state = AppState::new(&cfg, static_dir)?;

    let history_state = state.clone();
    poll::spawn_poller(
        "history",
        Duration::from_secs_f64(cfg.history.poll_interval_seconds.max(1.0)),
        move || {
            let state = history_state.clone();
            async move { refresh_history(&state).await }
        },
    );

    let webhook_state = state.clone();
    poll::spawn_poller(
        "webhooks",
        Duration::from_secs_f64(cfg.webhook.poll_interval_seconds.max(1.0)),
        move || {
            let state = webhook_state.clone();
            async move { refresh_webhooks(&state).await }
        },
    );

    let app = router(state.clone());

    let bind = format!("{}:{}", host, port)
        .parse::<SocketAddr>()
        .map_err(|err| anyhow!("invalid bind address: {err}"))?;

    info!("callboard-monitor running at http://{}", bind);
    info!("serving UI from {}", state.static_dir.display());

    let listener = tokio::net::TcpListener::bind(bind).await.map_err(|error| {
        if error.kind() == ErrorKind::AddrInUse {
            anyhow!(
                "failed to bind {bind}: address already in use. another monitor may already be running; rerun with `--port <free-port>`"
            )
        } else {
            anyhow!("failed to bind {bind}: {error}")
        }
    })?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn json_response<T: Serialize>(payload: T, status: StatusCode) -> Response {
    let mut response = Json(payload).into_response();
    *response.status_mut() = status;
    response
}

fn status_for_error(error: &RepoError) -> StatusCode {
    match error {
        RepoError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        RepoError::Transport(_) | RepoError::UnexpectedShape(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn error_response(error: RepoError) -> Response {
    json_response(
        json!({"ok": false, "error": error.to_string()}),
        status_for_error(&error),
    )
}

fn calls_payload(
    snapshot: &Snapshot<HistoryView>,
    filter: &CallListFilter,
    limit: Option<usize>,
) -> Value {
    let calls = filter.apply(&snapshot.value.calls, limit);
    json!({
        "ok": true,
        "total": snapshot.value.calls.len(),
        "matched": calls.len(),
        "calls": calls,
        "stale": snapshot.is_stale(),
        "last_success_unix": snapshot.last_success_unix,
        "last_error": snapshot.last_error,
    })
}

async fn api_health(State(state): State<AppState>) -> Response {
    let start = Instant::now();
    let ping = state.repo.client().ping().await;
    let ping_ms = Instant::elapsed(&start).as_secs_f64() * 1000.0;
    let history = state.history.read().await;

    let (ok, error, status) = match ping {
        Ok(()) => (true, Value::Null, StatusCode::OK),
        Err(error) => (
            false,
            json!(format!("{error:#}")),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };

    json_response(
        json!({
            "ok": ok,
            "url": state.repo.client().config().url,
            "ping_ms": ping_ms,
            "error": error,
            "history": {
                "last_success_unix": history.last_success_unix,
                "last_checked_unix": history.last_checked_unix,
                "last_error": history.last_error,
            },
        }),
        status,
    )
}

async fn api_calls(Query(params): Query<CallsQuery>, State(state): State<AppState>) -> Response {
    let filter = CallListFilter {
        search: params.search,
        status: params.status,
    };
    let snapshot = state.history.read().await;
    json_response(calls_payload(&snapshot, &filter, params.limit), StatusCode::OK)
}

async fn api_refresh_calls(State(state): State<AppState>) -> Response {
    refresh_history(&state).await;
    let snapshot = state.history.read().await;
    json_response(
        calls_payload(&snapshot, &CallListFilter::default(), None),
        StatusCode::OK,
    )
}

async fn api_call_detail(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    match state.repo.get_call(&id).await {
        Ok(call) => json_response(json!({"ok": true, "call": call}), StatusCode::OK),
        Err(error) => {
            warn!("call {id} unavailable: {error}");
            error_response(error)
        }
    }
}

async fn api_call_audio(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    let audio = match state.repo.get_call_audio(&id).await {
        Ok(audio) => audio,
        Err(error) => {
            warn!("audio for {id} unavailable: {error}");
            return error_response(error);
        }
    };

    let mut response = Response::new(Body::from(audio.bytes));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&audio.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    response
}

async fn api_agents(State(state): State<AppState>) -> Response {
    match state.repo.list_agents().await {
        Ok(agents) => json_response(json!({"ok": true, "agents": agents}), StatusCode::OK),
        Err(error) => error_response(error),
    }
}

async fn api_agent(Path(id): Path<String>, State(state): State<AppState>) -> Response {
    match state.repo.get_agent(&id).await {
        Ok(agent) => json_response(json!({"ok": true, "agent": agent}), StatusCode::OK),
        Err(error) => error_response(error),
    }
}

async fn api_voices(State(state): State<AppState>) -> Response {
    match state.repo.list_voices().await {
        Ok(voices) => json_response(json!({"ok": true, "voices": voices}), StatusCode::OK),
        Err(error) => error_response(error),
    }
}

async fn api_stats(State(state): State<AppState>) -> Response {
    let snapshot = state.history.read().await;
    let stats = DashboardStats::compute(
        &snapshot.value.calls,
        &snapshot.value.agents,
        state.cost_per_minute,
    );

    json_response(
        json!({
            "ok": true,
            "stats": stats,
            "stale": snapshot.is_stale(),
            "last_success_unix": snapshot.last_success_unix,
            "last_error": snapshot.last_error,
        }),
        StatusCode::OK,
    )
}

async fn api_webhooks(State(state): State<AppState>) -> Response {
    let snapshot = state.webhook_feed.read().await;
    json_response(
        json!({
            "ok": true,
            "requests": snapshot.value,
            "live": snapshot.last_success_unix.is_some(),
            "last_error": snapshot.last_error,
        }),
        StatusCode::OK,
    )
}

/// Maps a request path onto a file under `static_dir`, or `None` when the
/// path tries to climb out of it.
fn static_target(static_dir: &std::path::Path, requested: &str) -> Option<PathBuf> {
    if requested.contains("..") {
        return None;
    }

    let relative = requested.trim_start_matches('/');
    if relative.is_empty() {
        return Some(static_dir.join("index.html"));
    }
    Some(static_dir.join(relative))
}

async fn static_fallback(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(mut file_path) = static_target(&state.static_dir, uri.path()) else {
        return json_response(
            json!({"ok": false, "error": "forbidden"}),
            StatusCode::FORBIDDEN,
        );
    };
    if file_path.is_dir() {
        file_path.push("index.html");
    }

    let canonical_root = match fs::canonicalize(&state.static_dir).await {
        Ok(path) => path,
        Err(error) => {
            return json_response(
                json!({"ok": false, "error": format!("static directory unavailable: {error}")}),
                StatusCode::INTERNAL_SERVER_ERROR,
            );
        }
    };

    // Unknown client-side routes get the SPA entry point.
    let canonical_file = match fs::canonicalize(&file_path).await {
        Ok(path) => path,
        Err(_) => canonical_root.join("index.html"),
    };

    if !canonical_file.starts_with(&canonical_root) {
        return json_response(
            json!({"ok": false, "error": "forbidden"}),
            StatusCode::FORBIDDEN,
        );
    }

    let bytes = match fs::read(&canonical_file).await {
        Ok(value) => value,
        Err(_) => {
            return json_response(
                json!({"ok": false, "error": "not found"}),
                StatusCode::NOT_FOUND,
            );
        }
    };

    let content_type = mime_guess::from_path(&canonical_file)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let mut response = Response::new(Body::from(bytes));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use callboard_conversations::{CallAnalysis, CallStatus};
    use std::path::Path as FsPath;
    use std::sync::Mutex;

    type HistoryReply = Arc<Mutex<(StatusCode, Value)>>;

    fn call(id: &str, status: CallStatus, duration_secs: f64) -> CallRecord {
        CallRecord {
            conversation_id: id.to_string(),
            agent_id: None,
            start_time_unix_secs: 3_600,
            duration_secs,
            status,
            transcript: None,
            analysis: CallAnalysis::default(),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn spawn_provider_mock(list_status: StatusCode) -> String {
        let list = move || async move {
            let body = json!({
                "conversations": [
                    {"conversation_id": "c1", "start_time_unix_secs": 3600, "call_duration_secs": 60, "status": "done"},
                    {"conversation_id": "c2", "start_time_unix_secs": 3700, "call_duration_secs": 30, "status": "failed"}
                ]
            });
            (list_status, body.to_string())
        };
        let agents = || async { json!({"agents": [{"agent_id": "ag", "name": "Ventas"}]}).to_string() };

        let app = Router::new()
            .route("/v1/convai/conversations", get(list))
            .route("/v1/convai/agents", get(agents));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        format!("http://{}/v1", addr)
    }

    async fn spawn_webhook_history_mock(reply: HistoryReply) -> String {
        let history = move || {
            let reply = reply.clone();
            async move {
                let (status, body) = reply.lock().expect("reply lock").clone();
                (status, body.to_string())
            }
        };

        let app = Router::new().route("/token/abc/requests", get(history));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        format!("http://{}/token/abc/requests", addr)
    }

    fn webhook_state(history_url: String) -> AppState {
        let mut cfg = AppConfig::default();
        cfg.provider.url = "http://127.0.0.1:9/v1".to_string();
        cfg.webhook.url = history_url;
        cfg.webhook.timeout_seconds = 5.0;
        AppState::new(&cfg, std::env::temp_dir()).expect("state")
    }

    fn test_state(provider_url: String) -> AppState {
        let mut cfg = AppConfig::default();
        cfg.provider.url = provider_url;
        cfg.provider.api_key = "sk-test".to_string();
        cfg.provider.timeout_seconds = 5.0;
        AppState::new(&cfg, std::env::temp_dir()).expect("state")
    }

    #[test]
    fn status_mapping_separates_caller_and_upstream_errors() {
        assert_eq!(
            status_for_error(&RepoError::invalid_argument("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for_error(&RepoError::transport("x")),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for_error(&RepoError::unexpected_shape("x")),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn static_target_rejects_parent_traversal() {
        let root = FsPath::new("/srv/ui");
        assert_eq!(static_target(root, "/"), Some(root.join("index.html")));
        assert_eq!(
            static_target(root, "/assets/app.js"),
            Some(root.join("assets/app.js"))
        );
        assert_eq!(static_target(root, "/../etc/passwd"), None);
    }

    #[test]
    fn calls_payload_filters_and_reports_staleness() {
        let mut snapshot = Snapshot::new(HistoryView::default());
        snapshot.record_success(
            HistoryView {
                calls: vec![
                    call("a", CallStatus::Completed, 10.0),
                    call("b", CallStatus::Pending, 20.0),
                ],
                agents: Vec::new(),
            },
            100,
        );
        snapshot.record_failure("provider returned 502".to_string(), 130);

        let filter = CallListFilter {
            search: None,
            status: Some("pending".to_string()),
        };
        let payload = calls_payload(&snapshot, &filter, None);
        assert_eq!(payload["total"], json!(2));
        assert_eq!(payload["matched"], json!(1));
        assert_eq!(payload["calls"][0]["conversation_id"], json!("b"));
        assert_eq!(payload["stale"], json!(true));
        assert_eq!(payload["last_success_unix"], json!(100));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_populates_calls_and_stats() {
        let state = test_state(spawn_provider_mock(StatusCode::OK).await);

        refresh_history(&state).await;

        let calls = body_json(
            api_calls(
                Query(CallsQuery {
                    search: None,
                    status: Some("completed".to_string()),
                    limit: None,
                }),
                State(state.clone()),
            )
            .await,
        )
        .await;
        assert_eq!(calls["total"], json!(2));
        assert_eq!(calls["matched"], json!(1));
        assert_eq!(calls["stale"], json!(false));

        let stats = body_json(api_stats(State(state.clone())).await).await;
        assert_eq!(stats["stats"]["total_calls"], json!(2));
        assert_eq!(stats["stats"]["total_minutes"], json!(2));
        assert_eq!(stats["stats"]["successful_calls"], json!(1));
        assert_eq!(stats["stats"]["hourly"][1]["calls"], json!(2));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_refresh_keeps_previous_calls() {
        let state = test_state(spawn_provider_mock(StatusCode::OK).await);
        refresh_history(&state).await;

        let broken = test_state(spawn_provider_mock(StatusCode::BAD_GATEWAY).await);
        let broken = AppState {
            history: state.history.clone(),
            ..broken
        };
        refresh_history(&broken).await;

        let calls = body_json(
            api_calls(
                Query(CallsQuery {
                    search: None,
                    status: None,
                    limit: None,
                }),
                State(broken),
            )
            .await,
        )
        .await;
        assert_eq!(calls["total"], json!(2));
        assert_eq!(calls["stale"], json!(true));
        assert!(calls["last_error"]
            .as_str()
            .is_some_and(|error| error.contains("502")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn webhooks_serve_fallback_when_unconfigured() {
        let state = test_state("http://127.0.0.1:9/v1".to_string());
        refresh_webhooks(&state).await;

        let body = body_json(api_webhooks(State(state)).await).await;
        assert_eq!(body["requests"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["live"], json!(false));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn webhook_feed_keeps_last_good_requests() {
        let reply: HistoryReply = Arc::new(Mutex::new((StatusCode::OK, json!({"data": []}))));
        let state = webhook_state(spawn_webhook_history_mock(reply.clone()).await);

        refresh_webhooks(&state).await;
        let body = body_json(api_webhooks(State(state.clone())).await).await;
        assert_eq!(body["requests"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["live"], json!(false));

        *reply.lock().expect("reply lock") = (
            StatusCode::OK,
            json!({
                "data": [
                    {
                        "uuid": "n1",
                        "method": "POST",
                        "created_at": "2025-12-17 09:00:00",
                        "content": "{\"tipo_flujo\":\"soporte\"}"
                    },
                    {"uuid": "n2", "method": "GET", "created_at": "t", "content": "{\"a\":1}"}
                ]
            }),
        );
        refresh_webhooks(&state).await;
        let body = body_json(api_webhooks(State(state.clone())).await).await;
        assert_eq!(body["requests"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["requests"][0]["uuid"], json!("n1"));
        assert_eq!(body["live"], json!(true));

        *reply.lock().expect("reply lock") = (
            StatusCode::OK,
            json!({"data": [{"uuid": "n3", "method": "POST", "content": "not json"}]}),
        );
        refresh_webhooks(&state).await;
        let body = body_json(api_webhooks(State(state.clone())).await).await;
        assert_eq!(body["requests"][0]["uuid"], json!("n1"));
        assert_eq!(body["last_error"], Value::Null);

        *reply.lock().expect("reply lock") =
            (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "down"}));
        refresh_webhooks(&state).await;
        let body = body_json(api_webhooks(State(state)).await).await;
        assert_eq!(body["requests"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["requests"][0]["uuid"], json!("n1"));
        assert!(body["last_error"]
            .as_str()
            .is_some_and(|error| error.contains("500")));
    }
}
