//! Built-in heartbeat task implementations.
//!
//! Each task returns a short human-readable result string for the audit
//! log. A task that throws is logged and counted toward that task's
//! degradation streak by the caller — it never disables the scheduler.

use crate::config::AutomatonConfig;
use crate::conway;
use crate::state::Database;
use crate::types::{SocialInboxResponse, SurvivalTier};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Execute a named heartbeat task.
pub async fn execute_task(
    task_name: &str,
    _params: &serde_json::Value,
    config: &AutomatonConfig,
    db: &Arc<Mutex<Database>>,
) -> Result<String> {
    match task_name {
        "heartbeat_ping" => task_heartbeat_ping(db).await,
        "check_credits" => task_check_credits(config, db).await,
        "check_usdc_balance" => task_check_usdc_balance(config, db).await,
        "check_social_inbox" => task_check_social_inbox(config, db).await,
        "check_upstream" => task_check_upstream(config, db).await,
        "refresh_children" => task_refresh_children(config, db).await,
        "health_check" => task_health_check(config, db).await,
        _ => bail!("Unknown heartbeat task: {}", task_name),
    }
}

/// Simple ping — record that the agent is alive.
async fn task_heartbeat_ping(db: &Arc<Mutex<Database>>) -> Result<String> {
    let db = db.lock().await;
    db.kv_set("last_heartbeat", &chrono::Utc::now().to_rfc3339())?;
    Ok("pong".into())
}

/// Check Conway compute credit balance.
async fn task_check_credits(config: &AutomatonConfig, db: &Arc<Mutex<Database>>) -> Result<String> {
    let balance = conway::credits::check_credits(&config.conway_api_url, &config.conway_api_key).await?;

    let db = db.lock().await;
    db.kv_set("credits_balance", &balance.credits.to_string())?;

    let usdc: f64 = db
        .kv_get("usdc_balance")?
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let liquid_hundredth_cents = ((balance.credits + usdc) * 10_000.0).round() as i64;
    let tier = SurvivalTier::from_liquid_cents(liquid_hundredth_cents);

    if tier == SurvivalTier::Critical || tier == SurvivalTier::Dead {
        let alert = format!(
            "Credits critically low: {} {}. Tier: {}",
            balance.credits, balance.currency, tier
        );
        db.kv_set("survival_alert", &alert)?;
        crate::heartbeat::daemon::push_wake_signal(&db, &alert)?;
    }

    Ok(format!("{} {} (tier: {})", balance.credits, balance.currency, tier))
}

/// Check USDC balance on Base chain.
async fn task_check_usdc_balance(
    config: &AutomatonConfig,
    db: &Arc<Mutex<Database>>,
) -> Result<String> {
    if config.wallet_address.is_empty() || config.base_rpc_url.is_empty() {
        return Ok("Skipped: no wallet or RPC configured".into());
    }

    // USDC on Base: 0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913
    let usdc_contract = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

    let address_padded = format!(
        "0x70a08231000000000000000000000000{}",
        config.wallet_address.strip_prefix("0x").unwrap_or(&config.wallet_address)
    );

    let client = reqwest::Client::new();
    let resp = client
        .post(&config.base_rpc_url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_call",
            "params": [{
                "to": usdc_contract,
                "data": address_padded
            }, "latest"],
            "id": 1
        }))
        .send()
        .await?;

    let body: serde_json::Value = resp.json().await?;
    let result_hex = body["result"].as_str().unwrap_or("0x0");

    let balance_raw = u128::from_str_radix(
        result_hex.strip_prefix("0x").unwrap_or(result_hex),
        16,
    )
    .unwrap_or(0);
    let balance_usdc = balance_raw as f64 / 1_000_000.0;

    let db = db.lock().await;
    db.kv_set("usdc_balance", &balance_usdc.to_string())?;

    Ok(format!("{:.6} USDC", balance_usdc))
}

/// Check social inbox for new messages. Deduplicates against the inbox
/// table on insert and only wakes the turn engine when at least one
/// message was newly observed, per the scheduler's coalescing contract.
async fn task_check_social_inbox(
    config: &AutomatonConfig,
    db: &Arc<Mutex<Database>>,
) -> Result<String> {
    if config.social_relay_url.is_empty() {
        return Ok("Skipped: no social relay configured".into());
    }

    const SOURCE: &str = "social";
    let cursor = {
        let db = db.lock().await;
        db.inbox_cursor(SOURCE)?
    };

    let mut url = format!(
        "{}/v1/inbox/{}",
        config.social_relay_url, config.wallet_address
    );
    if let Some(cursor) = &cursor {
        url = format!("{}?cursor={}", url, cursor);
    }

    let client = reqwest::Client::new();
    let resp = client.get(url).send().await?;

    if !resp.status().is_success() {
        return Ok("No new messages".into());
    }

    let poll: SocialInboxResponse = resp.json().await?;

    let db = db.lock().await;
    let mut new_count = 0u32;
    for msg in &poll.messages {
        if db.insert_inbox_message_if_absent(msg)? {
            new_count += 1;
        }
    }

    if let Some(next_cursor) = &poll.next_cursor {
        db.set_inbox_cursor(SOURCE, next_cursor)?;
    }

    if new_count > 0 {
        crate::heartbeat::daemon::push_wake_signal(&db, &format!("{} new messages in inbox", new_count))?;
    }

    Ok(format!(
        "{} new messages ({} duplicates skipped)",
        new_count,
        poll.messages.len() as u32 - new_count
    ))
}

/// Check for new upstream commits. Logs what it finds but never applies
/// changes on its own — see `self_mod::upstream::check_upstream` for the
/// agent-initiated pull path.
async fn task_check_upstream(
    config: &AutomatonConfig,
    db: &Arc<Mutex<Database>>,
) -> Result<String> {
    let conway = conway::ConwayClient::new(&config.conway_api_url, &config.conway_api_key, &config.sandbox_id);
    let commits = crate::self_mod::upstream::check_upstream(&conway).await?;

    if commits.is_empty() {
        return Ok("Up to date".into());
    }

    let db = db.lock().await;
    crate::heartbeat::daemon::push_wake_signal(
        &db,
        &format!("{} new upstream commit(s) available", commits.len()),
    )?;

    Ok(format!("{} new commit(s) behind upstream", commits.len()))
}

/// Verify sandbox-exec connectivity and available disk space. Never wakes
/// the turn engine — a degraded sandbox is surfaced through the task's own
/// failure/degradation counters instead, per the scheduler's contract.
async fn task_health_check(config: &AutomatonConfig, _db: &Arc<Mutex<Database>>) -> Result<String> {
    let conway = conway::ConwayClient::new(&config.conway_api_url, &config.conway_api_key, &config.sandbox_id);
    let result = conway.exec("df -Pk / | tail -1", Some(10_000)).await?;

    if result.exit_code != 0 {
        bail!("disk check exited {}: {}", result.exit_code, result.stderr);
    }

    let available_kb: u64 = result
        .stdout
        .split_whitespace()
        .nth(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    if available_kb < 100_000 {
        bail!("low disk space: {} KB available", available_kb);
    }

    Ok(format!("sandbox reachable, {} KB free", available_kb))
}

/// Refresh known children's liveness status.
async fn task_refresh_children(_config: &AutomatonConfig, db: &Arc<Mutex<Database>>) -> Result<String> {
    let db_lock = db.lock().await;
    let children = db_lock.list_children()?;
    drop(db_lock);
    Ok(format!("{} known children", children.len()))
}
