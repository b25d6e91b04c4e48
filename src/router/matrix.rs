//! The (tier, task kind) -> candidate models routing table.
//!
//! Candidates are drawn from the model registry rather than hard-coded, so
//! operators can widen or narrow the fleet without a code change. The two
//! models named in config (`inference_model`, `low_compute_model`) are
//! always seeded into the registry at startup (see `Router::seed_defaults`)
//! and are preferred first within their eligible tier.

use crate::config::AutomatonConfig;
use crate::types::{ModelRegistryRow, SurvivalTier, TaskKind};

/// Maximum output tokens to request for a given task kind, capped by the
/// configured per-turn ceiling for `AgentTurn`.
pub fn max_tokens_for(task_kind: TaskKind, config: &AutomatonConfig) -> u32 {
    match task_kind {
        TaskKind::HeartbeatTriage => 256,
        TaskKind::SafetyCheck => 512,
        TaskKind::Summarization => 1024,
        TaskKind::Planning => 2048,
        TaskKind::AgentTurn => config.max_tokens_per_turn,
    }
}

/// The matrix-level ceiling for a tier, in hundredth-cents, or `None` if
/// the matrix itself places no bound (the global `per_call_ceiling_cents`
/// still applies — see `Router::effective_ceiling`).
pub fn matrix_ceiling_cents(tier: SurvivalTier) -> Option<i64> {
    match tier {
        SurvivalTier::Dead => Some(0),
        SurvivalTier::Critical => Some(300), // 3 cents
        SurvivalTier::LowCompute => Some(1_500),
        SurvivalTier::Normal | SurvivalTier::High => None,
    }
}

/// Select and order the candidate models eligible for this (tier, task
/// kind) pair. Preference: the tier's designated config model first (if
/// present and enabled), then the remaining enabled, tier-eligible models
/// ordered cheapest-input-cost-first.
pub fn candidates_for(
    tier: SurvivalTier,
    task_kind: TaskKind,
    config: &AutomatonConfig,
    models: &[ModelRegistryRow],
) -> Vec<ModelRegistryRow> {
    if !task_kind.allowed_at(tier) {
        return Vec::new();
    }

    let preferred_id = if tier >= SurvivalTier::Normal {
        &config.inference_model
    } else {
        &config.low_compute_model
    };

    let mut eligible: Vec<ModelRegistryRow> = models
        .iter()
        .filter(|m| m.enabled && m.tier_minimum <= tier)
        .cloned()
        .collect();

    eligible.sort_by(|a, b| {
        let a_preferred = &a.model_id == preferred_id;
        let b_preferred = &b.model_id == preferred_id;
        b_preferred
            .cmp(&a_preferred)
            .then(a.cost_per_1k_input.cmp(&b.cost_per_1k_input))
    });

    eligible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, tier_minimum: SurvivalTier, cost: i64, enabled: bool) -> ModelRegistryRow {
        ModelRegistryRow {
            model_id: id.to_string(),
            provider: "test".to_string(),
            tier_minimum,
            cost_per_1k_input: cost,
            cost_per_1k_output: cost * 4,
            max_tokens: 4096,
            context_window: 32_000,
            supports_tools: true,
            enabled,
            last_seen: None,
        }
    }

    #[test]
    fn prefers_configured_model_then_cheapest() {
        let config = AutomatonConfig {
            inference_model: "primary".to_string(),
            ..AutomatonConfig::default()
        };
        let models = vec![
            model("cheap", SurvivalTier::Dead, 1, true),
            model("primary", SurvivalTier::Dead, 10, true),
            model("disabled", SurvivalTier::Dead, 0, false),
        ];
        let ranked = candidates_for(SurvivalTier::Normal, TaskKind::AgentTurn, &config, &models);
        assert_eq!(ranked[0].model_id, "primary");
        assert_eq!(ranked[1].model_id, "cheap");
        assert!(ranked.iter().all(|m| m.model_id != "disabled"));
    }

    #[test]
    fn task_gating_excludes_ineligible_kinds() {
        let config = AutomatonConfig::default();
        let models = vec![model("m", SurvivalTier::Dead, 1, true)];
        let ranked = candidates_for(SurvivalTier::Critical, TaskKind::Planning, &config, &models);
        assert!(ranked.is_empty());
    }

    #[test]
    fn critical_tier_forces_low_ceiling() {
        assert_eq!(matrix_ceiling_cents(SurvivalTier::Critical), Some(300));
        assert_eq!(matrix_ceiling_cents(SurvivalTier::Normal), None);
    }
}
