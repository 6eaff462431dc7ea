use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub payload: Value,
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context captured alongside audit entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .map(|raw| raw.split(',').next().unwrap_or(raw).trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|value| value.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditPayload {
    #[serde(rename = "new")]
    current: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<RequestContext>,
    severity: Severity,
}

/// Emit an audit event for an entity mutation. Fire and forget: audit
/// failures must not break the API path.
pub fn record_audit<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let severity = entity.severity_for_action(action);
    let payload = AuditPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|old| serde_json::to_value(old).unwrap_or_default()),
        context,
        severity,
    };

    let event = DomainEvent {
        id: Uuid::new_v4(),
        name: format!("{}.{}", T::entity_type(), action),
        occurred_at: Utc::now(),
        actor_id,
        subject_id: Some(entity.subject_id()),
        payload: serde_json::to_value(&payload).unwrap_or_default(),
    };

    let _ = event_bus.send(serde_json::to_value(event).unwrap_or_default());
}

/// Drain the bus into `audit_log`, chaining each row's hash over the
/// previous one so tampering is detectable.
pub async fn start_audit_writer(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    use sha2::{Digest, Sha256};

    tracing::info!("audit writer started");
    while let Ok(event) = rx.recv().await {
        let name = event.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string();
        let actor_id = event.get("actor_id").and_then(Value::as_str).map(String::from);
        let subject_id = event.get("subject_id").and_then(Value::as_str).map(String::from);
        let severity = event
            .pointer("/payload/severity")
            .and_then(Value::as_str)
            .unwrap_or("important")
            .to_string();
        let occurred_at = event
            .get("occurred_at")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let payload = serde_json::to_string(&event).unwrap_or_default();

        let prev_hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM audit_log ORDER BY occurred_at DESC, id DESC LIMIT 1")
                .fetch_optional(&pool)
                .await
                .ok()
                .flatten();

        let mut hasher = Sha256::new();
        if let Some(ref prev) = prev_hash {
            hasher.update(prev.as_bytes());
        }
        hasher.update(payload.as_bytes());
        let hash = hex::encode(hasher.finalize());

        let result = sqlx::query(
            "INSERT INTO audit_log (id, event_name, actor_id, subject_id, occurred_at, payload, severity, prev_hash, hash) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&name)
        .bind(&actor_id)
        .bind(&subject_id)
        .bind(occurred_at)
        .bind(&payload)
        .bind(&severity)
        .bind(&prev_hash)
        .bind(&hash)
        .execute(&pool)
        .await;

        if let Err(err) = result {
            tracing::error!(error = %err, event = %name, "failed to persist audit entry");
        }
    }
}
