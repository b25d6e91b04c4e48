//! Survival monitor — tracks liquid balance and determines the agent's
//! survival tier.
//!
//! Tiers (in hundredth-cents of liquid balance, 1 hundredth-cent =
//! $0.0001): `dead` (0), `critical` (1-99), `low_compute` (100-499),
//! `normal` (500-1,999), `high` (>=2,000). A downgrade takes effect on the
//! evaluation that observes it; an upgrade only takes effect once the
//! higher tier's threshold has held for two consecutive evaluations, so a
//! single good reading doesn't immediately unlock a richer model fleet.
//! Tier changes are persisted to the kv store and broadcast on a
//! `tokio::sync::watch` channel so the Router and heartbeat scheduler can
//! react without polling the database.

use crate::state::Database;
use crate::types::SurvivalTier;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// Survival state read from the database.
#[derive(Debug, Clone)]
pub struct SurvivalState {
    pub credits_balance: f64,
    pub usdc_balance: f64,
    pub liquid_hundredth_cents: i64,
    pub tier: SurvivalTier,
}

/// Survival monitor that aggregates financial state and applies upgrade
/// hysteresis before committing a new tier.
pub struct SurvivalMonitor {
    db: Arc<Mutex<Database>>,
    tier_tx: watch::Sender<SurvivalTier>,
}

impl SurvivalMonitor {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        let (tier_tx, _rx) = watch::channel(SurvivalTier::Normal);
        Self { db, tier_tx }
    }

    /// Subscribe to tier-change notifications.
    pub fn subscribe(&self) -> watch::Receiver<SurvivalTier> {
        self.tier_tx.subscribe()
    }

    /// Read current balances, compute the raw tier, apply hysteresis
    /// against the last committed tier, and persist/broadcast the result.
    pub async fn check(&self) -> Result<SurvivalState> {
        let db = self.db.lock().await;

        let credits = db
            .kv_get("credits_balance")?
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(1.0);
        let usdc = db
            .kv_get("usdc_balance")?
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.0);

        let liquid_hundredth_cents = dollars_to_hundredth_cents(credits + usdc);
        let raw_tier = SurvivalTier::from_liquid_cents(liquid_hundredth_cents);

        let committed_tier = db
            .kv_get("survival_tier")?
            .and_then(|s| s.parse::<SurvivalTier>().ok())
            .unwrap_or(SurvivalTier::Normal);

        let pending_tier = db
            .kv_get("survival_pending_tier")?
            .and_then(|s| s.parse::<SurvivalTier>().ok());

        let new_tier = if raw_tier <= committed_tier {
            // Downgrades (or staying put) apply immediately.
            db.kv_delete("survival_pending_tier")?;
            raw_tier
        } else if pending_tier == Some(raw_tier) {
            // Second consecutive evaluation at the higher tier: commit.
            db.kv_delete("survival_pending_tier")?;
            raw_tier
        } else {
            // First evaluation at the higher tier: hold, don't commit yet.
            db.kv_set("survival_pending_tier", &raw_tier.to_string())?;
            committed_tier
        };

        if new_tier != committed_tier {
            info!(from = %committed_tier, to = %new_tier, "survival tier changed");
            db.kv_set("survival_tier", &new_tier.to_string())?;
            let _ = self.tier_tx.send(new_tier);
        }

        Ok(SurvivalState {
            credits_balance: credits,
            usdc_balance: usdc,
            liquid_hundredth_cents,
            tier: new_tier,
        })
    }

    /// Log a funding request to the database.
    pub async fn request_funding(&self, message: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.kv_set("funding_request", message)?;
        db.kv_set("funding_request_at", &chrono::Utc::now().to_rfc3339())?;
        warn!("Funding requested: {}", message);
        Ok(())
    }
}

fn dollars_to_hundredth_cents(dollars: f64) -> i64 {
    (dollars * 10_000.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_conversion_matches_hundredth_cent_scale() {
        assert_eq!(dollars_to_hundredth_cents(0.20), 2_000);
        assert_eq!(dollars_to_hundredth_cents(0.015), 150);
        assert_eq!(dollars_to_hundredth_cents(0.0), 0);
    }

    #[test]
    fn tier_round_trips_through_display_and_from_str() {
        for tier in [
            SurvivalTier::Dead,
            SurvivalTier::Critical,
            SurvivalTier::LowCompute,
            SurvivalTier::Normal,
            SurvivalTier::High,
        ] {
            let parsed: SurvivalTier = tier.to_string().parse().unwrap();
            assert_eq!(parsed, tier);
        }
    }
}
