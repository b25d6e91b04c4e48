//! Cron-based heartbeat daemon that runs background tasks on schedule.
//!
//! Reads heartbeat.yml for task definitions and executes them on their
//! cron schedules. Tasks are throttled by the current survival tier:
//! `low_compute` multiplies every non-exempt task's effective interval by
//! `low_compute_multiplier`, `critical` runs only entries marked
//! `critical_allowed`, and `dead` runs only `heartbeat_ping`. A task with
//! three consecutive failures is marked degraded and also runs at a
//! doubled interval until it next succeeds.

use crate::config::AutomatonConfig;
use crate::heartbeat::tasks;
use crate::state::Database;
use crate::types::{HeartbeatEntry, SurvivalTier, WakeSignal};
use anyhow::{Context, Result};
use chrono::Utc;
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Maximum number of coalesced wake reasons retained before the turn
/// engine drains them. Generous enough that a burst of distinct tasks
/// waking the agent in the same cycle never silently drops one.
const WAKE_QUEUE_CAP: usize = 16;

/// Background heartbeat daemon.
pub struct HeartbeatDaemon {
    config: AutomatonConfig,
    db: Arc<Mutex<Database>>,
    entries: Vec<HeartbeatEntry>,
    last_run: HashMap<String, chrono::DateTime<Utc>>,
    due_skip_count: HashMap<String, u32>,
}

impl HeartbeatDaemon {
    /// Create a new heartbeat daemon, loading entries from the YAML config.
    pub fn new(config: AutomatonConfig, db: Arc<Mutex<Database>>) -> Result<Self> {
        let entries = load_heartbeat_config(&config)?;
        info!("Loaded {} heartbeat entries", entries.len());

        Ok(Self {
            config,
            db,
            entries,
            last_run: HashMap::new(),
            due_skip_count: HashMap::new(),
        })
    }

    /// Run the heartbeat loop (call from a tokio::spawn).
    ///
    /// The loop exits cooperatively when `cancel` is triggered.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<()> {
        info!("Heartbeat daemon started");

        let tick_interval = tokio::time::Duration::from_secs(60);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(tick_interval) => {
                    if let Err(e) = self.tick().await {
                        error!("Heartbeat tick failed: {e}");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Heartbeat daemon shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Current survival tier, as last committed by the survival monitor.
    async fn current_tier(&self) -> SurvivalTier {
        let db = self.db.lock().await;
        db.kv_get("survival_tier")
            .ok()
            .flatten()
            .and_then(|s| s.parse().ok())
            .unwrap_or(SurvivalTier::Normal)
    }

    /// Process one tick — check each entry and run if due, subject to
    /// tier-based gating and degradation/low-compute throttling.
    ///
    /// Individual task failures are logged and do not stop other tasks.
    /// Infrastructure errors (e.g. DB write failure) are propagated.
    async fn tick(&mut self) -> Result<()> {
        let now = Utc::now();
        let tier = self.current_tier().await;

        for entry in self.entries.clone() {
            if !entry.enabled {
                continue;
            }

            if tier == SurvivalTier::Dead && entry.task != "heartbeat_ping" {
                continue;
            }
            if tier == SurvivalTier::Critical && !entry.critical_allowed {
                continue;
            }

            let schedule = match Schedule::from_str(&entry.schedule) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Invalid cron schedule '{}' for '{}': {}", entry.schedule, entry.name, e);
                    continue;
                }
            };

            let last = self
                .last_run
                .get(&entry.name)
                .copied()
                .unwrap_or(now - chrono::Duration::hours(1));

            let next = schedule.after(&last).next();
            let Some(next_run) = next else { continue };
            if next_run > now {
                continue;
            }

            let degraded = {
                let db = self.db.lock().await;
                db.is_task_degraded(&entry.task).unwrap_or(false)
            };
            let required_skips = {
                let tier_factor = if tier == SurvivalTier::LowCompute {
                    self.config.low_compute_multiplier.max(1)
                } else {
                    1
                };
                let degraded_factor = if degraded { 2 } else { 1 };
                tier_factor.saturating_mul(degraded_factor).saturating_sub(1)
            };

            let skips_so_far = self.due_skip_count.entry(entry.name.clone()).or_insert(0);
            if *skips_so_far < required_skips {
                *skips_so_far += 1;
                self.last_run.insert(entry.name.clone(), now);
                continue;
            }
            *skips_so_far = 0;

            debug!("Running heartbeat task: {}", entry.name);

            let result = tasks::execute_task(&entry.task, &entry.params, &self.config, &self.db).await;

            let (result_str, success) = match &result {
                Ok(msg) => (msg.clone(), true),
                Err(e) => (format!("Error: {}", e), false),
            };

            {
                let db = self.db.lock().await;
                db.log_heartbeat(&entry.name, &result_str, success)
                    .context("Failed to log heartbeat to database")?;
                let (failures, just_degraded) = db.record_task_outcome(&entry.task, success)?;
                if just_degraded {
                    warn!("Heartbeat task '{}' marked degraded after {} consecutive failures", entry.task, failures);
                }
            }

            self.last_run.insert(entry.name.clone(), now);

            if !success {
                warn!("Heartbeat task '{}' failed: {}", entry.name, result_str);
            }
        }

        Ok(())
    }
}

/// Append a wake reason to the bounded, deduplicating wake queue. Called
/// by tasks that discover something the turn engine should react to
/// outside its normal cadence.
pub fn push_wake_signal(db: &Database, reason: &str) -> Result<()> {
    let mut queue: Vec<WakeSignal> = db
        .kv_get("wake_queue")?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();

    if queue.last().map(|w| w.reason.as_str()) != Some(reason) {
        queue.push(WakeSignal {
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
    }
    if queue.len() > WAKE_QUEUE_CAP {
        let overflow = queue.len() - WAKE_QUEUE_CAP;
        queue.drain(0..overflow);
    }

    db.kv_set("wake_queue", &serde_json::to_string(&queue)?)?;
    db.kv_delete("sleep_until")?;
    Ok(())
}

/// Load heartbeat entries from the YAML config file.
fn load_heartbeat_config(config: &AutomatonConfig) -> Result<Vec<HeartbeatEntry>> {
    let path = config.resolved_heartbeat_path();
    let path = std::path::Path::new(&path);

    if !path.exists() {
        debug!("No heartbeat config at {:?}, using defaults", path);
        return Ok(default_heartbeat_entries());
    }

    let contents = std::fs::read_to_string(path).context("Failed to read heartbeat.yml")?;
    let entries: Vec<HeartbeatEntry> =
        serde_yaml::from_str(&contents).context("Failed to parse heartbeat.yml")?;

    Ok(entries)
}

/// Default heartbeat entries if no config file exists.
fn default_heartbeat_entries() -> Vec<HeartbeatEntry> {
    vec![
        HeartbeatEntry {
            name: "heartbeat_ping".into(),
            schedule: "*/5 * * * *".into(),
            task: "heartbeat_ping".into(),
            enabled: true,
            params: serde_json::Value::Null,
            critical_allowed: true,
        },
        HeartbeatEntry {
            name: "check_credits".into(),
            schedule: "*/10 * * * *".into(),
            task: "check_credits".into(),
            enabled: true,
            params: serde_json::Value::Null,
            critical_allowed: true,
        },
        HeartbeatEntry {
            name: "check_usdc_balance".into(),
            schedule: "*/10 * * * *".into(),
            task: "check_usdc_balance".into(),
            enabled: true,
            params: serde_json::Value::Null,
            critical_allowed: true,
        },
        HeartbeatEntry {
            name: "check_social_inbox".into(),
            schedule: "*/5 * * * *".into(),
            task: "check_social_inbox".into(),
            enabled: true,
            params: serde_json::Value::Null,
            critical_allowed: false,
        },
        HeartbeatEntry {
            name: "check_upstream".into(),
            schedule: "0 * * * *".into(),
            task: "check_upstream".into(),
            enabled: true,
            params: serde_json::Value::Null,
            critical_allowed: false,
        },
        HeartbeatEntry {
            name: "health_check".into(),
            schedule: "*/15 * * * *".into(),
            task: "health_check".into(),
            enabled: true,
            params: serde_json::Value::Null,
            critical_allowed: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_queue_coalesces_consecutive_duplicates() {
        let db = Database::open_memory().unwrap();
        push_wake_signal(&db, "new message").unwrap();
        push_wake_signal(&db, "new message").unwrap();
        push_wake_signal(&db, "upstream update").unwrap();

        let raw = db.kv_get("wake_queue").unwrap().unwrap();
        let queue: Vec<WakeSignal> = serde_json::from_str(&raw).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].reason, "new message");
        assert_eq!(queue[1].reason, "upstream update");
    }

    #[test]
    fn wake_queue_caps_length() {
        let db = Database::open_memory().unwrap();
        for i in 0..(WAKE_QUEUE_CAP + 5) {
            push_wake_signal(&db, &format!("reason-{}", i)).unwrap();
        }
        let raw = db.kv_get("wake_queue").unwrap().unwrap();
        let queue: Vec<WakeSignal> = serde_json::from_str(&raw).unwrap();
        assert_eq!(queue.len(), WAKE_QUEUE_CAP);
        assert_eq!(queue.last().unwrap().reason, format!("reason-{}", WAKE_QUEUE_CAP + 4));
    }
}
