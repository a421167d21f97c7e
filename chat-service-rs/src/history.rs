// chat-service-rs/src/history.rs
//
// History Adapter: converts the persisted, chronologically ordered message
// log into the role-tagged turn sequence the generative backend expects,
// and windows it so long conversations stay inside the model's input budget.

use serde::{Deserialize, Serialize};

use crate::message_log::{ChatMessage, Sender};

/// Default input budget for submitted history, in estimated tokens.
/// Overridable via CHAT_HISTORY_TOKEN_BUDGET.
pub const DEFAULT_HISTORY_TOKEN_BUDGET: usize = 6000;

/// Role of a single turn as the backend understands it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One message (user or model) in chronological order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// Map logged messages to backend turns.
///
/// Sender mapping is a pure function: `user` -> `user`, `bot` -> `model`.
/// Order and content pass through unchanged; role alternation is not
/// enforced (consecutive same-role turns are legal).
pub fn adapt(messages: &[ChatMessage]) -> Vec<Turn> {
    messages
        .iter()
        .map(|msg| Turn {
            role: match msg.sender {
                Sender::User => Role::User,
                Sender::Bot => Role::Model,
            },
            content: msg.text.clone(),
        })
        .collect()
}

// Rough token estimate; four characters per token is close enough for
// budgeting purposes and avoids a tokenizer dependency.
fn estimate_tokens(turn: &Turn) -> usize {
    turn.content.chars().count() / 4 + 1
}

/// Window a turn sequence to fit `token_budget`.
///
/// Retains the most recent turns whose cumulative estimate fits the budget.
/// The newest turn is always retained, even when it alone exceeds the
/// budget, so a non-empty history never windows down to nothing. When older
/// turns are dropped, a single synthetic user-role note turn is prepended
/// recording how many messages were omitted.
pub fn window(turns: Vec<Turn>, token_budget: usize) -> Vec<Turn> {
    let total: usize = turns.iter().map(estimate_tokens).sum();
    if total <= token_budget {
        return turns;
    }

    let mut spent = 0usize;
    let mut keep_from = turns.len();
    for (idx, turn) in turns.iter().enumerate().rev() {
        let cost = estimate_tokens(turn);
        if spent + cost > token_budget && keep_from < turns.len() {
            break;
        }
        spent += cost;
        keep_from = idx;
    }

    let dropped = keep_from;
    if dropped == 0 {
        // A single oversized newest turn; nothing to drop.
        return turns;
    }
    let mut windowed = Vec::with_capacity(turns.len() - keep_from + 1);
    windowed.push(Turn::user(format!(
        "[Earlier context omitted: {} older message(s) were dropped to fit the model's input limit.]",
        dropped
    )));
    windowed.extend(turns.into_iter().skip(keep_from));

    log::debug!(
        "History windowed: dropped {} turn(s), ~{} tokens submitted",
        dropped,
        spent
    );

    windowed
}
