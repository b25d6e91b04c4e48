//! Message context builder for the agent loop.
//!
//! Assembles the conversation history including unprocessed inbox messages
//! and recent tool results for the inference model. Every piece of text
//! that did not originate from this agent's own reasoning — inbox content,
//! a creator message, a heartbeat-sourced wake reason — is routed through
//! the sanitizer before it ever reaches a prompt.

use crate::config::AutomatonConfig;
use crate::sanitize;
use crate::state::Database;
use crate::types::*;
use std::path::Path;
use tracing::{debug, warn};

/// Whether a turn has a pending triggering input waiting for it — a
/// creator message file, an unprocessed inbox row, or a queued wake
/// reason — without consuming any of them. Used by the turn engine to
/// decide whether to run ahead of `min_turn_interval_ms`.
pub fn has_pending_trigger(db: &Database, config: &AutomatonConfig) -> bool {
    if Path::new(&config.resolved_creator_message_path()).exists() {
        return true;
    }
    if matches!(db.unprocessed_messages(), Ok(msgs) if !msgs.is_empty()) {
        return true;
    }
    if let Ok(Some(raw)) = db.kv_get("wake_queue") {
        if let Ok(queue) = serde_json::from_str::<Vec<WakeSignal>>(&raw) {
            return !queue.is_empty();
        }
    }
    false
}

/// Gather this turn's triggering input, in priority order (creator
/// message, then inbox, then wake signal), consume it, sanitize it, and
/// report which `InputSource` it came from. Returns `InputSource::None`
/// with an empty string if nothing is pending — still a valid turn, just
/// a generic "continue operating" one.
pub fn build_turn_context(db: &Database, config: &AutomatonConfig) -> (String, InputSource) {
    let mut context = String::new();

    let creator_path = config.resolved_creator_message_path();
    if let Ok(raw) = std::fs::read_to_string(&creator_path) {
        let _ = std::fs::remove_file(&creator_path);
        let result = sanitize::sanitize(&raw, "creator");
        context.push_str("## Message From Creator\n\n");
        context.push_str(&result.content);
        append_survival_alert(db, &mut context);
        debug!(chars = context.len(), "built turn context from creator message");
        return (context, InputSource::CreatorMessage);
    }

    if let Ok(messages) = db.unprocessed_messages() {
        if !messages.is_empty() {
            context.push_str("## Inbox Messages\n\n");
            for msg in &messages {
                let result = sanitize::sanitize(&msg.content, &msg.from_address);
                if result.blocked {
                    warn!(from = %msg.from_address, checks = ?result.checks, "blocked inbound message");
                }
                context.push_str(&format!(
                    "- At {}: {}\n",
                    msg.received_at.format("%Y-%m-%d %H:%M UTC"),
                    result.content,
                ));
            }
            for msg in &messages {
                let _ = db.mark_message_processed(&msg.id);
            }
            append_survival_alert(db, &mut context);
            debug!(chars = context.len(), "built turn context from inbox");
            return (context, InputSource::Inbox);
        }
    }

    if let Ok(Some(raw)) = db.kv_get("wake_queue") {
        if let Ok(queue) = serde_json::from_str::<Vec<WakeSignal>>(&raw) {
            if !queue.is_empty() {
                context.push_str("## Wake Reasons\n\n");
                for signal in &queue {
                    context.push_str(&format!("- {}\n", signal.reason));
                }
                let _ = db.kv_delete("wake_queue");
                append_survival_alert(db, &mut context);
                debug!(chars = context.len(), "built turn context from wake queue");
                return (context, InputSource::Wake);
            }
        }
        let _ = db.kv_delete("wake_queue");
    }

    append_survival_alert(db, &mut context);
    debug!(chars = context.len(), "built turn context with no pending trigger");
    (context, InputSource::None)
}

fn append_survival_alert(db: &Database, context: &mut String) {
    if let Ok(Some(alert)) = db.kv_get("survival_alert") {
        context.push_str(&format!("\n\n## Survival Alert\n\n{}\n", alert));
        let _ = db.kv_delete("survival_alert");
    }
}

/// Build the full message history for an inference call: system prompt,
/// an optional rolling summary of older turns, the expanded recent turns
/// (user input, assistant thinking, tool results in their original
/// order), and finally the current turn's sanitized input.
pub fn build_messages(
    system_prompt: &str,
    summary: Option<&str>,
    recent_turns: &[Turn],
    turn_context: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::new();

    messages.push(ChatMessage::system(system_prompt));

    if let Some(summary) = summary {
        if !summary.is_empty() {
            messages.push(ChatMessage::system(format!(
                "Summary of earlier turns:\n{}",
                summary
            )));
        }
    }

    for turn in recent_turns {
        if !turn.input.is_empty() {
            messages.push(ChatMessage::user(turn.input.clone()));
        }
        if let Some(thinking) = &turn.thinking {
            if !thinking.is_empty() {
                messages.push(ChatMessage::assistant(thinking.clone()));
            }
        }
        for result in &turn.tool_results {
            messages.push(ChatMessage::tool(
                result.tool_call_id.clone(),
                result.as_message_content(),
            ));
        }
    }

    if !turn_context.is_empty() {
        messages.push(ChatMessage::user(turn_context));
    } else {
        messages.push(ChatMessage::user(
            "Continue your autonomous operation. What should you do next?",
        ));
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(input: &str, thinking: Option<&str>, results: Vec<ToolResult>) -> Turn {
        Turn {
            id: "t".into(),
            turn_number: 1,
            state: TurnState::Finalized,
            input_source: InputSource::None,
            input: input.to_string(),
            thinking: thinking.map(String::from),
            messages: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: results,
            tokens_in: 0,
            tokens_out: 0,
            model_id: "m".into(),
            cost_hundredth_cents: 0,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn empty_context_falls_back_to_generic_prompt() {
        let messages = build_messages("sys", None, &[], "");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[1].role, ChatRole::User);
        assert!(messages[1].content.contains("Continue your autonomous operation"));
    }

    #[test]
    fn expands_past_turns_into_role_sequence() {
        let past = turn(
            "do the thing",
            Some("I will run exec"),
            vec![ToolResult::ok("call-1", "done")],
        );
        let messages = build_messages("sys", None, &[past], "ctx");
        // system, user(input), assistant(thinking), tool(result), user(ctx)
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1].role, ChatRole::User);
        assert_eq!(messages[2].role, ChatRole::Assistant);
        assert_eq!(messages[3].role, ChatRole::Tool);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(messages[4].content, "ctx");
    }

    #[test]
    fn summary_is_injected_as_a_system_message() {
        let messages = build_messages("sys", Some("earlier stuff happened"), &[], "ctx");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, ChatRole::System);
        assert!(messages[1].content.contains("earlier stuff happened"));
    }
}
