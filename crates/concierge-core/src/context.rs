//! Conversation state and composed specialist input

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::router::RoutingDecision;
use crate::types::{Message, Role, Urgency, format_tags};

/// Per-session conversation state.
///
/// Owned by the caller and passed into every turn. The core mutates it at most
/// once per turn, after the turn's outcome is known.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationContext {
    /// Full history, oldest first
    pub messages: Vec<Message>,
    /// Slot name to last known value
    pub state: BTreeMap<String, String>,
    /// Specialist that produced the most recent assistant turn, empty at session start
    pub last_specialist: String,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of the most recent assistant message, if any
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.text.as_str())
    }

    /// The last `n` messages, oldest first
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.state.get(name).map(String::as_str)
    }

    /// Append one completed exchange and remember who answered it
    pub fn record_turn(&mut self, user_text: &str, assistant_text: &str, specialist: &str) {
        self.messages.push(Message::user(user_text));
        self.messages.push(Message::assistant(assistant_text));
        self.last_specialist = specialist.to_string();
    }
}

/// Compose the text handed to a specialist: routing metadata, known slots,
/// recent history and the current message.
pub fn build_specialist_input(
    context: &ConversationContext,
    decision: &RoutingDecision,
    user_text: &str,
    urgency: Urgency,
    history_window: usize,
) -> String {
    let mut input = String::new();

    input.push_str("# ROUTING\n\n");
    input.push_str(&format!("specialist: {}\n", decision.selected_specialist));
    input.push_str(&format!("matched tags: {}\n", format_tags(&decision.matched_tags)));
    if let Some(primary) = decision.primary_tag {
        input.push_str(&format!("primary tag: {}\n", primary));
    }
    input.push_str(&format!("urgency: {}\n\n", urgency));

    if !context.state.is_empty() {
        input.push_str("# KNOWN DETAILS\n\n");
        for (key, value) in &context.state {
            input.push_str(&format!("- {}: {}\n", key, value));
        }
        input.push('\n');
    }

    let history = context.recent(history_window);
    if !history.is_empty() {
        input.push_str("# CONVERSATION\n\n");
        for message in history {
            input.push_str(&format!("{}: {}\n", message.role, message.text));
        }
        input.push('\n');
    }

    input.push_str("# CURRENT MESSAGE\n\n");
    input.push_str(user_text);
    input.push('\n');

    debug!(
        "Built specialist input for '{}' ({} chars, {} history messages)",
        decision.selected_specialist,
        input.len(),
        history.len()
    );

    input
}
