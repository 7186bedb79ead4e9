use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use ordermate_agent::AgentRuntime;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    runtime: AgentRuntime,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub store: HealthCheck,
    pub llm: HealthCheck,
    pub checked_at: String,
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { runtime })
}

/// `ok` requires both a reachable store and a configured model. Only an
/// unreachable store turns the status code into 503.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(&state.runtime).await;
    let llm = llm_check(&state.runtime);
    let store_ready = store.status == "ready";

    let payload = HealthResponse {
        ok: store_ready && llm.status == "ready",
        store,
        llm,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if store_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn store_check(runtime: &AgentRuntime) -> HealthCheck {
    let backend = runtime.store().backend_name();
    match runtime.store().ping().await {
        Ok(()) => HealthCheck { status: "ready", detail: format!("{backend} store reachable") },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("{backend} store unreachable: {error}"),
        },
    }
}

fn llm_check(runtime: &AgentRuntime) -> HealthCheck {
    match runtime.model() {
        Some(model) => HealthCheck { status: "ready", detail: format!("model `{model}` configured") },
        None => HealthCheck {
            status: "unconfigured",
            detail: "no language model credentials configured".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use ordermate_agent::AgentRuntime;
    use ordermate_core::config::AppConfig;
    use ordermate_db::{connect_with_settings, RecordStore};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_store_ready_and_missing_model() {
        let runtime = AgentRuntime::new(RecordStore::in_memory(), None, &AppConfig::default());

        let (status, Json(payload)) = health(State(HealthState { runtime })).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!payload.ok);
        assert_eq!(payload.store.status, "ready");
        assert_eq!(payload.llm.status, "unconfigured");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_store_is_closed() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;
        let runtime = AgentRuntime::new(RecordStore::sqlite(pool), None, &AppConfig::default());

        let (status, Json(payload)) = health(State(HealthState { runtime })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!payload.ok);
        assert_eq!(payload.store.status, "degraded");
        assert!(payload.store.detail.starts_with("sqlite store unreachable"));
    }
}
