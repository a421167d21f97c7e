// chat-service-rs/src/conversation.rs
//
// Conversation Endpoint core: validates a turn request, composes the
// pipeline (attachment note -> history adapter -> prompt builder -> model
// gateway -> report normalizer) and authors the chat entries for the
// message log. Transport handlers in main.rs stay thin; everything that
// has behavior worth testing lives here.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::gemini_client::{GatewayError, GenerationPolicy, GenerativeBackend};
use crate::history;
use crate::message_log::{ChatMessage, MessageLog, Sender};
use crate::prompt;
use crate::report::{self, AnalysisReport, ExtendedAnalysisReport, ExtractionError, ModelReply};

/// One prior message as submitted by the client, mirroring the external log
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

/// Inbound body for a conversational turn
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub file_url: String,
}

/// Inbound body for the four-layer report contract
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub file_url: String,
    #[serde(default)]
    pub location: String,
}

/// Result of a successful conversational turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub analysis: String,
    pub report: Option<AnalysisReport>,
}

/// Failure taxonomy for a turn. Display strings are the stable user-facing
/// messages; upstream detail stays in the source error and the log.
#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Provide either text or a fileUrl")]
    MissingInput,
    #[error("Failed to generate content from the AI model.")]
    Gateway(#[source] GatewayError),
    #[error("Failed to extract a structured report from the AI model.")]
    Extraction(#[source] ExtractionError),
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Handle one conversational turn.
///
/// The user entry is appended before the gateway call so a failed turn
/// still leaves the unanswered prompt in the record; the bot entry is
/// appended only on success, so a turn never produces more than one of
/// each. Extraction misses never abort the turn.
pub async fn handle_turn(
    backend: &dyn GenerativeBackend,
    message_log: &dyn MessageLog,
    policy: &GenerationPolicy,
    request: ChatRequest,
) -> Result<TurnOutcome, TurnError> {
    let text = request.text.trim().to_string();
    let attachment = non_empty(&request.file_url);

    // Fail fast, before any side effect or external call
    if text.is_empty() && attachment.is_none() {
        return Err(TurnError::MissingInput);
    }

    let turn_id = Uuid::new_v4();
    log::info!(
        "[{}] chat turn: history={} text_chars={} attachment={}",
        turn_id,
        request.history.len(),
        text.chars().count(),
        attachment.is_some()
    );

    let mut user_entry = ChatMessage::user_text(&text);
    if let Some(url) = attachment {
        user_entry = user_entry.with_attachment(url);
    }
    message_log.append(user_entry).await;

    let logged: Vec<ChatMessage> = request
        .history
        .iter()
        .map(|entry| match Sender::from_wire(&entry.role) {
            Sender::User => ChatMessage::user_text(&entry.content),
            Sender::Bot => ChatMessage::bot_text(&entry.content),
        })
        .collect();
    let turns = history::adapt(&logged);
    let budget = config_rs::env_or(
        "CHAT_HISTORY_TOKEN_BUDGET",
        history::DEFAULT_HISTORY_TOKEN_BUDGET,
    );
    let turns = history::window(turns, budget);

    let note = prompt::compose_attachment_note(attachment);
    // Unreachable after the validation above, but the builder still refuses
    // an empty subject on its own
    let payload = prompt::build_intent_prompt(&text, &note).map_err(|_| TurnError::MissingInput)?;

    let raw = backend
        .generate(&turns, &payload, policy)
        .await
        .map_err(|err| {
            log::error!("[{}] gateway failure: {}", turn_id, err);
            TurnError::Gateway(err)
        })?;

    let structured = match report::normalize(&raw) {
        ModelReply::Structured(report) => {
            log::info!(
                "[{}] structured analysis: {} bullet(s), jargon score {}",
                turn_id,
                report.summary_bullets.len(),
                report.jargon_score
            );
            Some(report)
        }
        ModelReply::Plain(_) => None,
    };

    message_log.append(ChatMessage::bot_text(&raw)).await;

    Ok(TurnOutcome {
        analysis: raw,
        report: structured,
    })
}

/// Handle a four-layer report request.
///
/// This is a reporting-surface call, not a chat turn: no history is
/// submitted, nothing is appended to the message log, and the backend is
/// asked for machine-parseable JSON through its own extraction contract.
pub async fn handle_report(
    backend: &dyn GenerativeBackend,
    policy: &GenerationPolicy,
    request: ReportRequest,
) -> Result<ExtendedAnalysisReport, TurnError> {
    let text = request.text.trim().to_string();
    let attachment = non_empty(&request.file_url);

    if text.is_empty() && attachment.is_none() {
        return Err(TurnError::MissingInput);
    }

    let turn_id = Uuid::new_v4();
    let document_name = attachment
        .and_then(|url| url.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("Pasted text");
    let location = non_empty(&request.location).unwrap_or("Unknown");

    log::info!(
        "[{}] report request: document={} location={}",
        turn_id,
        document_name,
        location
    );

    let note = prompt::compose_attachment_note(attachment);
    let payload = prompt::build_report_extraction_prompt(&text, &note, document_name, location)
        .map_err(|_| TurnError::MissingInput)?;

    let raw = backend
        .generate(&[], &payload, policy)
        .await
        .map_err(|err| {
            log::error!("[{}] gateway failure: {}", turn_id, err);
            TurnError::Gateway(err)
        })?;

    report::normalize_extended(&raw).map_err(|err| {
        log::error!("[{}] extraction failure: {}", turn_id, err);
        TurnError::Extraction(err)
    })
}
