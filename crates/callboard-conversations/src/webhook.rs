use callboard_provider::WebhookHistoryClient;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::WebhookRequest;
use crate::error::{RepoError, RepoResult};

/// Sample deliveries served until the inspection service returns real data.
pub fn fallback_requests() -> Vec<WebhookRequest> {
    let samples = [
        (
            "642e6f93-8399-47eb-80f3-101acd1e7a54",
            "2025-12-16 15:52:56",
            json!({
                "tipo_flujo": "soporte",
                "nombre_cliente": "Juan Pérez",
                "telefono_cliente": "661-662-663",
                "codigo_postal": "no aplica",
                "motivo_incidencia": "avería",
                "interes_detectado": "bajo"
            }),
        ),
        (
            "4662c431-f6c9-47fe-a862-aecec31ce9b2",
            "2025-12-16 15:49:55",
            json!({
                "tipo_flujo": "comercial",
                "nombre_cliente": "Carlos Rodríguez",
                "telefono_cliente": "desconocido",
                "codigo_postal": "28260",
                "motivo_incidencia": "no aplica",
                "interes_detectado": "alto"
            }),
        ),
        (
            "62d26607-7e3b-4ef3-a970-1d7676498278",
            "2025-12-15 10:35:50",
            json!({
                "nombre_cliente": "Pedido Farmacia",
                "telefono": "600123456",
                "items_pedidos": ["liquido de drenaje", "gasas", "mascarillas", "alcohol"],
                "confirmado_por_usuario": true
            }),
        ),
    ];

    samples
        .into_iter()
        .map(|(uuid, created_at, content)| WebhookRequest {
            uuid: uuid.to_string(),
            created_at: created_at.to_string(),
            content: content.to_string(),
            parsed_content: content.as_object().cloned().unwrap_or_default(),
        })
        .collect()
}

fn parse_content(content: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) if !map.is_empty() => Some(map),
        Ok(_) => None,
        Err(err) => {
            debug!("failed to parse webhook content: {err}");
            None
        }
    }
}

fn text_field(raw: &Value, key: &str) -> String {
    match raw.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Keeps the POST deliveries of a request-history page whose body is a
/// non-empty JSON object, newest first as returned.
pub fn parse_webhook_history(body: &Value) -> Vec<WebhookRequest> {
    let Some(requests) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    requests
        .iter()
        .filter(|req| req.get("method").and_then(Value::as_str) == Some("POST"))
        .filter_map(|req| {
            let content = text_field(req, "content");
            let parsed_content = parse_content(&content)?;
            Some(WebhookRequest {
                uuid: text_field(req, "uuid"),
                created_at: text_field(req, "created_at"),
                content,
                parsed_content,
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct WebhookFeed {
    client: WebhookHistoryClient,
}

impl WebhookFeed {
    pub fn new(client: WebhookHistoryClient) -> Self {
        Self { client }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    /// Fetches the latest deliveries. An empty list means the service
    /// answered but held nothing usable.
    pub async fn fetch(&self) -> RepoResult<Vec<WebhookRequest>> {
        let body = self.client.recent_requests().await?;
        if body.get("data").map_or(true, |data| !data.is_array()) {
            return Err(RepoError::unexpected_shape(
                "webhook history has no `data` array",
            ));
        }
        Ok(parse_webhook_history(&body))
    }
}
