//! The ReAct turn engine — the agent's Think → Act → Observe loop.
//!
//! Each cycle: gather the turn's triggering input (creator message, inbox,
//! wake signal, or none), assemble it into a message history alongside a
//! rolling summary and the recent-turns window, route one inference call
//! through the [`Router`](crate::router::Router), dispatch any tool calls
//! the model requested, and persist the whole turn through its state
//! machine (`Building` → `AwaitingInference` → `DispatchingTools` →
//! `Finalized`). A turn left in any non-terminal state at startup is an
//! unfinished turn from a crash — [`Database::abort_incomplete_turns`]
//! sweeps those on boot, and the same call cleans up a turn that fails
//! mid-flight.

use crate::agent::{context, system_prompt};
use crate::config::AutomatonConfig;
use crate::conway::{ConwayClient, InferenceClient};
use crate::router::{Router, RouterError};
use crate::state::Database;
use crate::tools::{self, ToolContext};
use crate::types::*;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tool names whose execution crosses a trust boundary — moves value or
/// creates a standing external commitment. At most one may execute per
/// turn; the rest are rejected back to the model as a non-fatal
/// observation so it can retry next turn instead of silently vanishing.
fn crosses_trust_boundary(tool_name: &str) -> bool {
    matches!(tool_name, "spawn_child" | "create_sandbox")
}

/// Run the agent's main loop until `cancel` is triggered.
pub async fn run_agent_loop(
    config: AutomatonConfig,
    db: Arc<Mutex<Database>>,
    conway: ConwayClient,
    inference: InferenceClient,
    skills: Vec<Skill>,
    cancel: CancellationToken,
) -> Result<()> {
    {
        let db = db.lock().await;
        let aborted = db.abort_incomplete_turns()?;
        if aborted > 0 {
            warn!("recovered from crash: aborted {} incomplete turn(s)", aborted);
        }
    }

    let router = Router::new(config.clone(), db.clone(), inference);
    router.seed_defaults().await?;

    let tool_ctx = ToolContext {
        conway,
        db: db.clone(),
        wallet_address: config.wallet_address.clone(),
        config: config.clone(),
    };

    info!("agent loop started for '{}'", config.name);

    loop {
        if cancel.is_cancelled() {
            info!("agent loop shutting down");
            return Ok(());
        }

        let tier = current_tier(&db).await;

        if tier == SurvivalTier::Dead {
            set_agent_state(&db, AgentState::Dead).await;
            tokio::select! {
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(60)) => continue,
                _ = cancel.cancelled() => return Ok(()),
            }
        }

        let pending = {
            let db = db.lock().await;
            context::has_pending_trigger(&db, &config)
        };

        if !pending {
            if let Some(wait) = idle_wait(&db, &config).await {
                set_agent_state(&db, AgentState::Sleeping).await;
                tokio::select! {
                    _ = tokio::time::sleep(wait) => continue,
                    _ = cancel.cancelled() => return Ok(()),
                }
            }
        }

        set_agent_state(&db, AgentState::Running).await;

        if let Err(e) = run_one_turn(&config, &db, &router, &tool_ctx, &skills, tier).await {
            warn!("turn failed: {}", e);
            tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
        }

        {
            let db = db.lock().await;
            let _ = db.kv_set("last_turn_at", &chrono::Utc::now().to_rfc3339());
        }
    }
}

async fn current_tier(db: &Arc<Mutex<Database>>) -> SurvivalTier {
    let db = db.lock().await;
    db.kv_get("survival_tier")
        .ok()
        .flatten()
        .and_then(|s| s.parse().ok())
        .unwrap_or(SurvivalTier::Normal)
}

async fn set_agent_state(db: &Arc<Mutex<Database>>, state: AgentState) {
    let db = db.lock().await;
    let _ = db.kv_set("agent_state", &state.to_string());
}

/// How long to wait before the next cycle when nothing is pending: respects
/// both `min_turn_interval_ms` and any outstanding `sleep` tool call. `None`
/// means run the turn now.
async fn idle_wait(db: &Arc<Mutex<Database>>, config: &AutomatonConfig) -> Option<tokio::time::Duration> {
    let db = db.lock().await;

    if let Ok(Some(raw)) = db.kv_get("sleep_until") {
        if let Ok(until) = chrono::DateTime::parse_from_rfc3339(&raw) {
            let remaining = until.with_timezone(&chrono::Utc) - chrono::Utc::now();
            if remaining > chrono::Duration::zero() {
                return Some(remaining.to_std().unwrap_or(tokio::time::Duration::from_secs(60)));
            }
        }
    }

    if let Ok(Some(raw)) = db.kv_get("last_turn_at") {
        if let Ok(last) = chrono::DateTime::parse_from_rfc3339(&raw) {
            let elapsed = chrono::Utc::now() - last.with_timezone(&chrono::Utc);
            let min_interval = chrono::Duration::milliseconds(config.min_turn_interval_ms as i64);
            if elapsed < min_interval {
                let wait = (min_interval - elapsed).to_std().unwrap_or(tokio::time::Duration::from_millis(1000));
                return Some(wait);
            }
        }
    }

    None
}

/// Run exactly one turn end to end, persisting every state transition.
async fn run_one_turn(
    config: &AutomatonConfig,
    db: &Arc<Mutex<Database>>,
    router: &Router,
    tool_ctx: &ToolContext,
    skills: &[Skill],
    tier: SurvivalTier,
) -> Result<()> {
    maybe_summarize(config, db, router, tier).await;

    let (turn_context, input_source) = {
        let db = db.lock().await;
        context::build_turn_context(&db, config)
    };

    let (summary, recent_turns, turn_number) = {
        let db = db.lock().await;
        let summary = db.kv_get("turn_summary")?;
        let recent = db.recent_turns(config.recent_turns_window)?;
        let number = db.next_turn_number()?;
        (summary, recent, number)
    };

    let system_prompt = {
        let db = db.lock().await;
        system_prompt::build_system_prompt(config, &db, tier, skills)
    };

    let messages = context::build_messages(&system_prompt, summary.as_deref(), &recent_turns, &turn_context);

    let mut turn = Turn {
        id: ulid::Ulid::new().to_string(),
        turn_number,
        state: TurnState::Building,
        input_source,
        input: turn_context,
        thinking: None,
        messages: messages.clone(),
        tool_calls: Vec::new(),
        tool_results: Vec::new(),
        tokens_in: 0,
        tokens_out: 0,
        model_id: String::new(),
        cost_hundredth_cents: 0,
        created_at: chrono::Utc::now(),
    };

    {
        let mut db = db.lock().await;
        db.begin_turn(&turn)?;
    }

    turn.state = TurnState::AwaitingInference;
    {
        let db = db.lock().await;
        db.update_turn(&turn)?;
    }

    let tool_defs = tools::tool_definitions();
    let outcome = match router.route(TaskKind::AgentTurn, tier, &messages, &tool_defs).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let db = db.lock().await;
            let _ = db.abort_incomplete_turns();
            return Err(explain_router_error(e));
        }
    };

    turn.model_id = outcome.model_id;
    turn.cost_hundredth_cents = outcome.cost_hundredth_cents;
    turn.tokens_in = outcome.response.usage.prompt_tokens;
    turn.tokens_out = outcome.response.usage.completion_tokens;
    turn.thinking = outcome.response.content.clone();
    turn.tool_calls = outcome.response.tool_calls.clone();

    {
        let db = db.lock().await;
        db.update_turn(&turn)?;
    }

    if !turn.tool_calls.is_empty() {
        turn.state = TurnState::DispatchingTools;
        {
            let db = db.lock().await;
            db.update_turn(&turn)?;
        }
        dispatch_tool_calls(db, tool_ctx, config, &mut turn).await;
    }

    turn.state = TurnState::Finalized;
    {
        let db = db.lock().await;
        db.finalize_turn(&turn.id)?;
    }

    debug!(
        turn_number = turn.turn_number,
        model = %turn.model_id,
        tool_calls = turn.tool_calls.len(),
        cost_hundredth_cents = turn.cost_hundredth_cents,
        "turn finalized"
    );

    Ok(())
}

fn explain_router_error(e: RouterError) -> anyhow::Error {
    anyhow::anyhow!("router: {}", e)
}

/// Execute the model's requested tool calls in order, up to
/// `max_tool_calls_per_turn`, enforcing the single-trust-boundary-action
/// rule and stopping early on the first fatal result.
async fn dispatch_tool_calls(
    db: &Arc<Mutex<Database>>,
    tool_ctx: &ToolContext,
    config: &AutomatonConfig,
    turn: &mut Turn,
) {
    let mut trust_boundary_used = false;
    let limit = config.max_tool_calls_per_turn.max(1) as usize;

    for call in turn.tool_calls.iter().take(limit) {
        let result = if crosses_trust_boundary(&call.name) {
            if trust_boundary_used {
                ToolResult::err(
                    call.id.clone(),
                    "rate limited: only one trust-boundary-crossing action is allowed per turn",
                    false,
                )
            } else {
                trust_boundary_used = true;
                let mut r = tools::execute_tool(tool_ctx, &call.name, &call.arguments).await;
                r.tool_call_id = call.id.clone();
                r
            }
        } else {
            let mut r = tools::execute_tool(tool_ctx, &call.name, &call.arguments).await;
            r.tool_call_id = call.id.clone();
            r
        };

        let fatal = result.fatal;
        turn.tool_results.push(result);

        {
            let db = db.lock().await;
            if let Err(e) = db.update_turn(turn) {
                warn!("failed to persist tool result: {}", e);
            }
        }

        if fatal {
            warn!("turn {}: fatal tool error, aborting remaining dispatch", turn.turn_number);
            break;
        }
    }
}

/// Fold the half of the recent-turns window that has aged out of context
/// into a running summary, once the turn count crosses
/// `summarization_threshold` turns past the last fold. Disabled at
/// `low_compute` and below, per the routing matrix's task-kind gating.
async fn maybe_summarize(config: &AutomatonConfig, db: &Arc<Mutex<Database>>, router: &Router, tier: SurvivalTier) {
    if !TaskKind::Summarization.allowed_at(tier) {
        return;
    }

    let (total, summarized_through) = {
        let db = db.lock().await;
        let total = db.turn_count().unwrap_or(0);
        let through = db
            .kv_get("summarized_through_turn")
            .ok()
            .flatten()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        (total, through)
    };

    if total.saturating_sub(summarized_through) <= config.summarization_threshold as u64 {
        return;
    }

    let fold_end = total.saturating_sub(config.recent_turns_window as u64);
    if fold_end <= summarized_through {
        return;
    }

    let to_fold = {
        let db = db.lock().await;
        match db.recent_turns(total as u32) {
            Ok(turns) => turns
                .into_iter()
                .filter(|t| t.turn_number > summarized_through && t.turn_number <= fold_end)
                .collect::<Vec<_>>(),
            Err(_) => return,
        }
    };

    if to_fold.is_empty() {
        return;
    }

    let existing_summary = {
        let db = db.lock().await;
        db.kv_get("turn_summary").ok().flatten().unwrap_or_default()
    };

    let mut transcript = String::new();
    for t in &to_fold {
        if !t.input.is_empty() {
            transcript.push_str(&format!("Input: {}\n", t.input));
        }
        if let Some(thinking) = &t.thinking {
            transcript.push_str(&format!("Reasoning: {}\n", thinking));
        }
        for r in &t.tool_results {
            transcript.push_str(&format!("Tool result: {}\n", r.as_message_content()));
        }
    }

    let prompt = format!(
        "Condense the following agent turns into a concise summary preserving \
         any open commitments, unresolved tasks, and important facts. Keep it \
         under 500 words.\n\nPrevious summary:\n{}\n\nTurns to fold in:\n{}",
        existing_summary, transcript,
    );

    let messages = vec![ChatMessage::user(prompt)];

    match router.route(TaskKind::Summarization, tier, &messages, &[]).await {
        Ok(outcome) => {
            let new_summary = outcome.response.content.unwrap_or_default();
            let db = db.lock().await;
            let _ = db.kv_set("turn_summary", &new_summary);
            let _ = db.kv_set("summarized_through_turn", &fold_end.to_string());
            info!(turns_folded = to_fold.len(), "summarized older turns");
        }
        Err(e) => {
            warn!("summarization call failed, will retry next cycle: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_boundary_tools_are_named_explicitly() {
        assert!(crosses_trust_boundary("spawn_child"));
        assert!(crosses_trust_boundary("create_sandbox"));
        assert!(!crosses_trust_boundary("exec"));
        assert!(!crosses_trust_boundary("read_file"));
    }
}
