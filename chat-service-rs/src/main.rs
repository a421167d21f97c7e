// chat-service-rs/src/main.rs
// Chat Service - Conversational front-end to the generative backend
// Port 8000 - HTTP/REST entry point for the Precedent Pro client
//
// Implements:
// - POST /api/v1/chat: one conversational turn (history + text + optional file)
// - POST /api/v1/report: four-layer document report via structured extraction
// - Startup-fatal backend credential check
// - CORS and request payload size limits for the browser client

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

mod conversation;
mod gemini_client;
mod history;
mod message_log;
mod prompt;
mod report;

use conversation::{ChatRequest, ReportRequest, TurnError};
use gemini_client::{GeminiClient, GenerationPolicy, GenerativeBackend};
use message_log::{InMemoryMessageLog, MessageLog};
use report::AnalysisReport;

// Track service start time for uptime reporting
static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

// Matches the browser client's upload limit
const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn GenerativeBackend>,
    message_log: Arc<dyn MessageLog>,
    policy: GenerationPolicy,
}

/// Chat response body (JSON)
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub analysis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AnalysisReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: i64,
    pub status: String,
}

// Map turn failures onto stable HTTP envelopes. Upstream detail has already
// been logged by the conversation core and never reaches the client.
fn turn_error_response(err: TurnError) -> Response {
    let status = match &err {
        TurnError::MissingInput => StatusCode::BAD_REQUEST,
        TurnError::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
        TurnError::Extraction(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            details: None,
        }),
    )
        .into_response()
}

/// POST /api/v1/chat - one conversational turn
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Response {
    match conversation::handle_turn(
        state.backend.as_ref(),
        state.message_log.as_ref(),
        &state.policy,
        request,
    )
    .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ChatResponse {
                analysis: outcome.analysis,
                report: outcome.report,
            }),
        )
            .into_response(),
        Err(err) => turn_error_response(err),
    }
}

/// POST /api/v1/report - four-layer document report
async fn report_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReportRequest>,
) -> Response {
    match conversation::handle_report(state.backend.as_ref(), &state.policy, request).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => turn_error_response(err),
    }
}

/// GET /health - Health check endpoint
async fn health_handler() -> impl IntoResponse {
    let uptime = START_TIME.elapsed().as_secs() as i64;

    Json(HealthResponse {
        healthy: true,
        service_name: config_rs::get_formatted_service_name("CHAT"),
        uptime_seconds: uptime,
        status: "SERVING".to_string(),
    })
}

/// GET / - Root endpoint
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "Precedent Pro Chat Service",
        "version": "1.0.0",
        "endpoints": [
            "GET /health",
            "POST /api/v1/chat",
            "POST /api/v1/report"
        ]
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let _ = *START_TIME;

    // The backend credential is required at startup, not per request
    let api_key = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            log::error!("Missing GEMINI_API_KEY in environment");
            std::process::exit(1);
        }
    };

    let addr = config_rs::get_bind_address("CHAT", 8000);

    let state = Arc::new(AppState {
        backend: Arc::new(GeminiClient::new(api_key)),
        message_log: Arc::new(InMemoryMessageLog::new()),
        policy: GenerationPolicy::from_env(),
    });

    // Build CORS layer for the browser front-end
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/chat", post(chat_handler))
        .route("/api/v1/report", post(report_handler))
        .layer(RequestBodyLimitLayer::new(MAX_PAYLOAD_SIZE))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!(
        "{} starting on {}",
        config_rs::get_formatted_service_name("CHAT"),
        addr
    );
    println!("Chat service listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
