//! Inference Router — picks a model for a task kind under the current
//! survival tier, enforces budget/cost ceilings, and retries across
//! fallback candidates with exponential backoff and full jitter.

pub mod matrix;

use crate::config::AutomatonConfig;
use crate::conway::InferenceClient;
use crate::state::Database;
use crate::tools::ToolDefinition;
use crate::types::{ChatMessage, CostLedgerRow, InferenceResponse, ModelRegistryRow, SurvivalTier, TaskKind};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("hourly budget exhausted: {spent_cents} + {estimate_cents} would exceed {budget_cents} hundredth-cents")]
    BudgetExhausted {
        spent_cents: i64,
        estimate_cents: i64,
        budget_cents: i64,
    },
    #[error("no eligible model for tier {tier} / task {task_kind}")]
    NoEligibleModel {
        tier: SurvivalTier,
        task_kind: TaskKind,
    },
    #[error("provider unavailable after exhausting all candidates: {0}")]
    ProviderUnavailable(String),
    #[error("inference call timed out after {0:?}")]
    Timeout(Duration),
}

/// The outcome of a successful routed inference call.
#[derive(Debug, Clone)]
pub struct RouterOutcome {
    pub response: InferenceResponse,
    pub model_id: String,
    pub attempts: u32,
    pub cost_hundredth_cents: i64,
}

pub struct Router {
    config: AutomatonConfig,
    db: Arc<Mutex<Database>>,
    inference: InferenceClient,
}

/// Cost in hundredth-cents for a prospective call, given per-1k pricing on
/// the model and the actual input tokens plus the requested output ceiling.
fn estimate_cost_hundredth_cents(model: &ModelRegistryRow, input_tokens: u32, max_output_tokens: u32) -> i64 {
    let input_cost = (model.cost_per_1k_input * input_tokens as i64) / 1_000;
    let output_cost = (model.cost_per_1k_output * max_output_tokens as i64) / 1_000;
    input_cost + output_cost
}

/// Rough token estimate for budget purposes ahead of the real call: ~4
/// characters per token, matching the conservative estimators the ambient
/// logging code already uses elsewhere in this runtime.
fn estimate_input_tokens(messages: &[ChatMessage]) -> u32 {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    ((chars / 4) as u32).max(1)
}

/// Full-jitter exponential backoff: `random(0, min(cap, base * 2^attempt))`.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms: u64 = 1_000;
    let cap_ms: u64 = 30_000;
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let upper = exp.min(cap_ms);
    let jittered = rand::thread_rng().gen_range(0..=upper);
    Duration::from_millis(jittered)
}

fn is_retryable(err: &anyhow::Error) -> bool {
    let msg = err.to_string();
    msg.contains("(5") || msg.to_ascii_lowercase().contains("timeout") || msg.to_ascii_lowercase().contains("connection")
}

impl Router {
    pub fn new(config: AutomatonConfig, db: Arc<Mutex<Database>>, inference: InferenceClient) -> Self {
        Self { config, db, inference }
    }

    /// Seed the model registry with the two config-named models, if absent.
    /// Idempotent — safe to call on every startup.
    pub async fn seed_defaults(&self) -> anyhow::Result<()> {
        let db = self.db.lock().await;
        if db.get_model(&self.config.inference_model)?.is_none() {
            db.upsert_model(&ModelRegistryRow {
                model_id: self.config.inference_model.clone(),
                provider: "conway".to_string(),
                tier_minimum: SurvivalTier::Normal,
                cost_per_1k_input: 25,
                cost_per_1k_output: 100,
                max_tokens: self.config.max_tokens_per_turn,
                context_window: 128_000,
                supports_tools: true,
                enabled: true,
                last_seen: None,
            })?;
        }
        if db.get_model(&self.config.low_compute_model)?.is_none() {
            db.upsert_model(&ModelRegistryRow {
                model_id: self.config.low_compute_model.clone(),
                provider: "conway".to_string(),
                tier_minimum: SurvivalTier::Critical,
                cost_per_1k_input: 2,
                cost_per_1k_output: 8,
                max_tokens: self.config.max_tokens_per_turn,
                context_window: 128_000,
                supports_tools: true,
                enabled: true,
                last_seen: None,
            })?;
        }
        Ok(())
    }

    /// The effective per-call ceiling: the minimum of the matrix ceiling
    /// for this tier and the globally configured ceiling, ignoring
    /// whichever side is unbounded.
    fn effective_ceiling(&self, tier: SurvivalTier) -> i64 {
        match matrix::matrix_ceiling_cents(tier) {
            Some(matrix_ceiling) => matrix_ceiling.min(self.config.per_call_ceiling_cents),
            None => self.config.per_call_ceiling_cents,
        }
    }

    /// Route one inference call for `task_kind` under the agent's current
    /// `tier`, trying each eligible candidate model in order until one
    /// succeeds or all are exhausted.
    pub async fn route(
        &self,
        task_kind: TaskKind,
        tier: SurvivalTier,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<RouterOutcome, RouterError> {
        let models = {
            let db = self.db.lock().await;
            db.list_models().unwrap_or_default()
        };
        let candidates = matrix::candidates_for(tier, task_kind, &self.config, &models);
        if candidates.is_empty() {
            return Err(RouterError::NoEligibleModel { tier, task_kind });
        }

        let max_tokens = matrix::max_tokens_for(task_kind, &self.config).min(
            candidates.iter().map(|m| m.max_tokens).max().unwrap_or(4096),
        );
        let ceiling = self.effective_ceiling(tier);
        let input_tokens = estimate_input_tokens(messages);

        let spent = {
            let db = self.db.lock().await;
            db.hourly_spend_cents().unwrap_or(0)
        };

        let mut attempts = 0u32;
        let mut last_err: Option<String> = None;
        let mut last_budget_rejection: Option<(i64, i64, i64)> = None;

        for model in &candidates {
            let estimate = estimate_cost_hundredth_cents(model, input_tokens, max_tokens);
            if estimate > ceiling {
                debug!(
                    "skipping {}: estimate {} exceeds effective ceiling {}",
                    model.model_id, estimate, ceiling
                );
                continue;
            }
            if spent + estimate > self.config.hourly_budget_cents {
                debug!(
                    "skipping {}: spent {} + estimate {} would exceed hourly budget {}",
                    model.model_id, spent, estimate, self.config.hourly_budget_cents
                );
                last_budget_rejection = Some((spent, estimate, self.config.hourly_budget_cents));
                continue;
            }

            for attempt in 0..self.config.max_retries.max(1) {
                attempts += 1;
                let timeout = task_kind.default_timeout();
                let call = self.inference.chat(&model.model_id, messages, tools, max_tokens);

                match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(response)) => {
                        let actual_output = response.usage.completion_tokens.max(1);
                        let cost = estimate_cost_hundredth_cents(model, response.usage.prompt_tokens, actual_output);

                        let db = self.db.lock().await;
                        let _ = db.touch_model_last_seen(&model.model_id);
                        let _ = db.record_spend(&CostLedgerRow {
                            timestamp: chrono::Utc::now(),
                            model_id: model.model_id.clone(),
                            task_kind,
                            tokens_in: response.usage.prompt_tokens,
                            tokens_out: response.usage.completion_tokens,
                            cost_hundredth_cents: cost,
                            tier,
                        });

                        return Ok(RouterOutcome {
                            response,
                            model_id: model.model_id.clone(),
                            attempts,
                            cost_hundredth_cents: cost,
                        });
                    }
                    Ok(Err(e)) => {
                        last_err = Some(e.to_string());
                        if !is_retryable(&e) {
                            warn!("inference call to {} failed (non-retryable): {}", model.model_id, e);
                            break;
                        }
                        debug!(
                            "inference call to {} failed (attempt {}/{}): {}",
                            model.model_id, attempt + 1, self.config.max_retries, e
                        );
                        if attempt + 1 < self.config.max_retries {
                            tokio::time::sleep(backoff_delay(attempt)).await;
                        }
                    }
                    Err(_) => {
                        last_err = Some(format!("timed out after {:?}", timeout));
                        if attempt + 1 < self.config.max_retries {
                            tokio::time::sleep(backoff_delay(attempt)).await;
                        }
                    }
                }
            }

            if !self.config.enable_model_fallback {
                return Err(RouterError::ProviderUnavailable(
                    last_err.unwrap_or_else(|| "candidate exhausted".to_string()),
                ));
            }
        }

        match last_err {
            Some(e) => Err(RouterError::ProviderUnavailable(e)),
            None => match last_budget_rejection {
                Some((spent_cents, estimate_cents, budget_cents)) => Err(RouterError::BudgetExhausted {
                    spent_cents,
                    estimate_cents,
                    budget_cents,
                }),
                None => Err(RouterError::NoEligibleModel { tier, task_kind }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_estimate_matches_formula() {
        let model = ModelRegistryRow {
            model_id: "m".to_string(),
            provider: "p".to_string(),
            tier_minimum: SurvivalTier::Dead,
            cost_per_1k_input: 100,
            cost_per_1k_output: 400,
            max_tokens: 4096,
            context_window: 8192,
            supports_tools: true,
            enabled: true,
            last_seen: None,
        };
        let cost = estimate_cost_hundredth_cents(&model, 1_000, 500);
        assert_eq!(cost, 100 * 1 + 400 * 500 / 1_000);
    }

    #[test]
    fn backoff_never_exceeds_cap() {
        for attempt in 0..20 {
            let d = backoff_delay(attempt);
            assert!(d.as_millis() <= 30_000);
        }
    }
}
