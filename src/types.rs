//! Shared types used across the automaton runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Agent state machine
// ---------------------------------------------------------------------------

/// Runtime states the automaton transitions through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// First-run, not yet configured.
    Uninitialized,
    /// Setup wizard running.
    Initializing,
    /// Just started / waking from sleep.
    Waking,
    /// Active ReAct loop processing.
    Running,
    /// Idle, waiting for next heartbeat or wake signal.
    Sleeping,
    /// Credits critically low — reduced capabilities.
    LowCompute,
    /// Near-zero resources — only essential tasks.
    Critical,
    /// No resources remaining — halted.
    Dead,
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Initializing => write!(f, "initializing"),
            Self::Waking => write!(f, "waking"),
            Self::Running => write!(f, "running"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::LowCompute => write!(f, "low_compute"),
            Self::Critical => write!(f, "critical"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::Uninitialized
    }
}

// ---------------------------------------------------------------------------
// Survival tiers
// ---------------------------------------------------------------------------

/// Resource-based survival tiers controlling agent behaviour.
///
/// Ordered poorest-to-richest so `tier >= SurvivalTier::LowCompute` reads
/// naturally; thresholds are expressed in hundredth-cents of liquid balance
/// (1 hundredth-cent = $0.0001).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurvivalTier {
    /// 0 — no inference, distress pings only.
    Dead,
    /// 1-99 — only heartbeat_triage/safety_check permitted, per-call ceiling forced to <=3c.
    Critical,
    /// 100-499 — heartbeat intervals multiplied, summarization/planning disabled.
    LowCompute,
    /// 500-1,999 — default matrix.
    Normal,
    /// >=2,000 — all tasks enabled, richer model candidates.
    High,
}

impl fmt::Display for SurvivalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::LowCompute => write!(f, "low_compute"),
            Self::Critical => write!(f, "critical"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

impl std::str::FromStr for SurvivalTier {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "high" => Self::High,
            "normal" => Self::Normal,
            "low_compute" => Self::LowCompute,
            "critical" => Self::Critical,
            "dead" => Self::Dead,
            other => anyhow::bail!("unknown survival tier: {}", other),
        })
    }
}

impl SurvivalTier {
    /// Determine the raw (pre-hysteresis) tier from a liquid balance in
    /// hundredth-cents. The survival monitor applies hysteresis on top of
    /// this before it becomes the agent's effective tier.
    pub fn from_liquid_cents(hundredth_cents: i64) -> Self {
        if hundredth_cents >= 2_000 {
            Self::High
        } else if hundredth_cents >= 500 {
            Self::Normal
        } else if hundredth_cents >= 100 {
            Self::LowCompute
        } else if hundredth_cents >= 1 {
            Self::Critical
        } else {
            Self::Dead
        }
    }
}

// ---------------------------------------------------------------------------
// Inference types
// ---------------------------------------------------------------------------

/// A chat message in the multi-turn conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Set when this message carries a tool's observation back to the model;
    /// pairs it with the originating tool-call id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into(), tool_call_id: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into(), tool_call_id: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into(), tool_call_id: None }
    }
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call request from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Result of executing a tool call. Exactly one of `output`/`error` is set
/// once the call reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    /// Whether this failure must abort the rest of the turn's tool dispatch
    /// (wallet-signer refusal, lost sandbox) rather than just be reported
    /// back to the model as an observation.
    #[serde(default)]
    pub fatal: bool,
}

impl ToolResult {
    pub fn ok(tool_call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: Some(output.into()),
            error: None,
            success: true,
            fatal: false,
        }
    }

    pub fn err(tool_call_id: impl Into<String>, error: impl Into<String>, fatal: bool) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: None,
            error: Some(error.into()),
            success: false,
            fatal,
        }
    }

    /// Text suitable for inclusion in a `tool`-role message.
    pub fn as_message_content(&self) -> String {
        match (&self.output, &self.error) {
            (Some(out), _) => out.clone(),
            (None, Some(err)) => format!("Error: {}", err),
            (None, None) => String::new(),
        }
    }
}

/// Response from inference including potential tool calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// Token usage from an inference call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Router / task kinds
// ---------------------------------------------------------------------------

/// The kind of work being routed to an inference model. Drives both the
/// (tier, kind) -> model matrix and per-kind timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    AgentTurn,
    HeartbeatTriage,
    SafetyCheck,
    Summarization,
    Planning,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentTurn => write!(f, "agent_turn"),
            Self::HeartbeatTriage => write!(f, "heartbeat_triage"),
            Self::SafetyCheck => write!(f, "safety_check"),
            Self::Summarization => write!(f, "summarization"),
            Self::Planning => write!(f, "planning"),
        }
    }
}

impl TaskKind {
    /// Default per-task timeout.
    pub fn default_timeout(&self) -> std::time::Duration {
        use std::time::Duration;
        match self {
            Self::HeartbeatTriage => Duration::from_secs(15),
            Self::SafetyCheck => Duration::from_secs(30),
            Self::Summarization => Duration::from_secs(60),
            Self::AgentTurn | Self::Planning => Duration::from_secs(120),
        }
    }

    /// Whether this task kind is permitted to run at the given tier.
    pub fn allowed_at(&self, tier: SurvivalTier) -> bool {
        match tier {
            SurvivalTier::Dead => false,
            SurvivalTier::Critical => matches!(self, Self::HeartbeatTriage | Self::SafetyCheck),
            SurvivalTier::LowCompute => !matches!(self, Self::Planning | Self::Summarization),
            SurvivalTier::Normal | SurvivalTier::High => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Turn persistence
// ---------------------------------------------------------------------------

/// State machine of a single turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Building,
    AwaitingInference,
    DispatchingTools,
    Finalized,
    Aborted,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Building => write!(f, "building"),
            Self::AwaitingInference => write!(f, "awaiting_inference"),
            Self::DispatchingTools => write!(f, "dispatching_tools"),
            Self::Finalized => write!(f, "finalized"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl std::str::FromStr for TurnState {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "building" => Self::Building,
            "awaiting_inference" => Self::AwaitingInference,
            "dispatching_tools" => Self::DispatchingTools,
            "finalized" => Self::Finalized,
            "aborted" => Self::Aborted,
            other => anyhow::bail!("unknown turn state: {}", other),
        })
    }
}

/// Where a turn's triggering input came from. Preference order when more
/// than one is pending: creator message, then inbox, then wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    CreatorMessage,
    Inbox,
    Wake,
    /// No pending input — a generic "continue operating" turn.
    None,
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatorMessage => write!(f, "creator_message"),
            Self::Inbox => write!(f, "inbox"),
            Self::Wake => write!(f, "wake"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for InputSource {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "creator_message" => Self::CreatorMessage,
            "inbox" => Self::Inbox,
            "wake" => Self::Wake,
            "none" => Self::None,
            other => anyhow::bail!("unknown input source: {}", other),
        })
    }
}

/// A single turn in the agent's processing history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub turn_number: u64,
    pub state: TurnState,
    pub input_source: InputSource,
    pub input: String,
    pub thinking: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub model_id: String,
    pub cost_hundredth_cents: i64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Cost ledger / model registry
// ---------------------------------------------------------------------------

/// An append-only record of actual inference spend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLedgerRow {
    pub timestamp: DateTime<Utc>,
    pub model_id: String,
    pub task_kind: TaskKind,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost_hundredth_cents: i64,
    pub tier: SurvivalTier,
}

/// A known model and its pricing/capability row, seeded at startup and
/// refreshable from the provider's model list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistryRow {
    pub model_id: String,
    pub provider: String,
    pub tier_minimum: SurvivalTier,
    /// Hundredth-cents per 1,000 input tokens.
    pub cost_per_1k_input: i64,
    /// Hundredth-cents per 1,000 output tokens.
    pub cost_per_1k_output: i64,
    pub max_tokens: u32,
    pub context_window: u32,
    pub supports_tools: bool,
    pub enabled: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

/// A heartbeat task entry from the YAML config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEntry {
    pub name: String,
    pub schedule: String,
    pub task: String,
    pub enabled: bool,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Whether this task is permitted to run while the tier is `critical`.
    #[serde(default)]
    pub critical_allowed: bool,
}

/// A coalesced reason for waking the turn engine outside its normal cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeSignal {
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// Where a skill definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillSource {
    Disk,
    Agent,
}

impl fmt::Display for SkillSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disk => write!(f, "disk"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// A loaded skill from a SKILL.md file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub version: String,
    pub auto_activate: bool,
    pub enabled: bool,
    pub instructions: String,
    #[serde(default)]
    pub requirements: Vec<SkillRequirement>,
    pub source: SkillSource,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRequirement {
    pub kind: String, // "binary" | "env"
    pub value: String,
}

/// Validate a skill name against `[a-z0-9_-]+`.
pub fn is_valid_skill_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

// ---------------------------------------------------------------------------
// Social / messaging
// ---------------------------------------------------------------------------

/// A message in the agent-to-agent inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Externally assigned id — the dedup key.
    pub id: String,
    pub from_address: String,
    pub to_address: String,
    pub content: String,
    pub signed_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
}

/// Response envelope from a social relay inbox poll: the page of messages
/// plus an opaque cursor to resume from on the next poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialInboxResponse {
    #[serde(default)]
    pub messages: Vec<InboxMessage>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// On-chain agent identity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub wallet_address: String,
    pub metadata_uri: String,
    #[serde(default)]
    pub parent_agent: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Self-modification audit
// ---------------------------------------------------------------------------

/// An entry in the immutable modification audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub mod_type: ModificationType,
    pub description: String,
    pub file_path: Option<String>,
    pub diff: Option<String>,
    /// Whether the stored diff was truncated (original exceeded 64KB).
    #[serde(default)]
    pub diff_truncated: bool,
    pub reversible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    CodeEdit,
    ToolInstall,
    ConfigUpdate,
    SkillAdd,
    HeartbeatUpdate,
    Upstream,
}

impl fmt::Display for ModificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeEdit => write!(f, "code_edit"),
            Self::ToolInstall => write!(f, "tool_install"),
            Self::ConfigUpdate => write!(f, "config_update"),
            Self::SkillAdd => write!(f, "skill_add"),
            Self::HeartbeatUpdate => write!(f, "heartbeat_update"),
            Self::Upstream => write!(f, "upstream"),
        }
    }
}

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

/// Configuration for spawning a child automaton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub name: String,
    pub genesis_prompt: String,
    pub parent_address: String,
    pub parent_sandbox_id: String,
    pub initial_credits: f64,
}

/// Lifecycle status of a spawned child. Transitions are monotonic toward
/// `Dead`, except `Unknown`, which is transient (a status probe failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildStatus {
    Running,
    Sleeping,
    Dead,
    Unknown,
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Sleeping => write!(f, "sleeping"),
            Self::Dead => write!(f, "dead"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ChildStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "running" => Self::Running,
            "sleeping" => Self::Sleeping,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        })
    }
}

/// A tracked child automaton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildRecord {
    pub id: String,
    pub name: String,
    pub sandbox_id: String,
    pub wallet_address: String,
    pub created_at: DateTime<Utc>,
    pub status: ChildStatus,
}

// ---------------------------------------------------------------------------
// Tool categories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Vm,
    Conway,
    SelfMod,
    Financial,
    Survival,
    Skills,
    Git,
    Registry,
    Replication,
    Social,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_thresholds() {
        assert_eq!(SurvivalTier::from_liquid_cents(2_000), SurvivalTier::High);
        assert_eq!(SurvivalTier::from_liquid_cents(1_999), SurvivalTier::Normal);
        assert_eq!(SurvivalTier::from_liquid_cents(500), SurvivalTier::Normal);
        assert_eq!(SurvivalTier::from_liquid_cents(499), SurvivalTier::LowCompute);
        assert_eq!(SurvivalTier::from_liquid_cents(100), SurvivalTier::LowCompute);
        assert_eq!(SurvivalTier::from_liquid_cents(99), SurvivalTier::Critical);
        assert_eq!(SurvivalTier::from_liquid_cents(1), SurvivalTier::Critical);
        assert_eq!(SurvivalTier::from_liquid_cents(0), SurvivalTier::Dead);
    }

    #[test]
    fn tier_ordering() {
        assert!(SurvivalTier::Dead < SurvivalTier::Critical);
        assert!(SurvivalTier::Critical < SurvivalTier::LowCompute);
        assert!(SurvivalTier::LowCompute < SurvivalTier::Normal);
        assert!(SurvivalTier::Normal < SurvivalTier::High);
    }

    #[test]
    fn task_kind_tier_gating() {
        assert!(!TaskKind::Planning.allowed_at(SurvivalTier::Critical));
        assert!(TaskKind::SafetyCheck.allowed_at(SurvivalTier::Critical));
        assert!(!TaskKind::Summarization.allowed_at(SurvivalTier::LowCompute));
        assert!(TaskKind::AgentTurn.allowed_at(SurvivalTier::LowCompute));
        assert!(TaskKind::Planning.allowed_at(SurvivalTier::Normal));
        assert!(!TaskKind::AgentTurn.allowed_at(SurvivalTier::Dead));
    }

    #[test]
    fn skill_name_validation() {
        assert!(is_valid_skill_name("my-skill_1"));
        assert!(!is_valid_skill_name("My Skill"));
        assert!(!is_valid_skill_name(""));
        assert!(!is_valid_skill_name("has spaces"));
    }

    #[test]
    fn tool_result_message_content() {
        let ok = ToolResult::ok("t1", "done");
        assert_eq!(ok.as_message_content(), "done");
        let err = ToolResult::err("t1", "boom", false);
        assert_eq!(err.as_message_content(), "Error: boom");
    }
}
