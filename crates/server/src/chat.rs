use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use ordermate_agent::AgentRuntime;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

const INDEX_HTML: &str = include_str!("../../../templates/chat/index.html");

#[derive(Clone)]
pub struct ChatState {
    runtime: AgentRuntime,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/chat", post(chat))
        .layer(CorsLayer::permissive())
        .with_state(ChatState { runtime })
}

async fn index_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> (StatusCode, Json<ChatResponse>) {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        event_name = "http.chat.received",
        correlation_id = %correlation_id,
        session_id = %request.session_id,
        "chat message received"
    );

    match state.runtime.handle_message(&request.session_id, &request.message).await {
        Ok(reply) => (StatusCode::OK, Json(ChatResponse { reply })),
        Err(failure) => {
            let reply = format!("Error: {failure}");
            let interface = failure.into_interface(correlation_id.clone());
            error!(
                event_name = "http.chat.failed",
                correlation_id = %correlation_id,
                session_id = %request.session_id,
                error = %interface,
                user_message = interface.user_message(),
                "chat turn failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ChatResponse { reply }))
        }
    }
}
