//! Database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 4;

/// Full DDL for the automaton state database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Key-value store for runtime state
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Agent turns (inference + tool execution history)
CREATE TABLE IF NOT EXISTS turns (
    id               TEXT PRIMARY KEY,
    turn_number      INTEGER NOT NULL,
    state            TEXT NOT NULL DEFAULT 'building',
    input_source     TEXT NOT NULL DEFAULT 'none',
    input            TEXT NOT NULL DEFAULT '',
    thinking         TEXT,
    messages_json    TEXT NOT NULL DEFAULT '[]',
    tokens_in        INTEGER NOT NULL DEFAULT 0,
    tokens_out       INTEGER NOT NULL DEFAULT 0,
    model_id         TEXT NOT NULL DEFAULT '',
    cost_hundredth_cents INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Individual tool calls within turns
CREATE TABLE IF NOT EXISTS tool_calls (
    id             TEXT PRIMARY KEY,
    turn_id        TEXT NOT NULL REFERENCES turns(id),
    tool_name      TEXT NOT NULL,
    arguments_json TEXT NOT NULL DEFAULT '{}',
    output         TEXT,
    error          TEXT,
    success        INTEGER NOT NULL DEFAULT 1,
    fatal          INTEGER NOT NULL DEFAULT 0,
    duration_ms    INTEGER,
    created_at     TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Heartbeat execution log
CREATE TABLE IF NOT EXISTS heartbeat_entries (
    id          TEXT PRIMARY KEY,
    task_name   TEXT NOT NULL,
    result      TEXT,
    success     INTEGER NOT NULL DEFAULT 1,
    executed_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Per-task consecutive failure counters used for degradation backoff
CREATE TABLE IF NOT EXISTS heartbeat_task_health (
    task_name          TEXT PRIMARY KEY,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    degraded           INTEGER NOT NULL DEFAULT 0,
    last_run_at        TEXT
);

-- Financial transactions (credits, USDC, x402 payments)
CREATE TABLE IF NOT EXISTS transactions (
    id            TEXT PRIMARY KEY,
    tx_type       TEXT NOT NULL,
    amount        REAL NOT NULL,
    currency      TEXT NOT NULL DEFAULT 'credits',
    description   TEXT,
    balance_after REAL,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only inference spend ledger (hundredth-cent units)
CREATE TABLE IF NOT EXISTS cost_ledger (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp             TEXT NOT NULL DEFAULT (datetime('now')),
    model_id              TEXT NOT NULL,
    task_kind             TEXT NOT NULL,
    tokens_in             INTEGER NOT NULL,
    tokens_out            INTEGER NOT NULL,
    cost_hundredth_cents  INTEGER NOT NULL,
    tier                  TEXT NOT NULL
);

-- Known inference models and their pricing/capability envelope
CREATE TABLE IF NOT EXISTS model_registry (
    model_id           TEXT PRIMARY KEY,
    provider           TEXT NOT NULL,
    tier_minimum       TEXT NOT NULL DEFAULT 'dead',
    cost_per_1k_input  INTEGER NOT NULL DEFAULT 0,
    cost_per_1k_output INTEGER NOT NULL DEFAULT 0,
    max_tokens         INTEGER NOT NULL DEFAULT 4096,
    context_window     INTEGER NOT NULL DEFAULT 8192,
    supports_tools     INTEGER NOT NULL DEFAULT 1,
    enabled            INTEGER NOT NULL DEFAULT 1,
    last_seen          TEXT
);

-- Self-modification audit log
CREATE TABLE IF NOT EXISTS modifications (
    id             TEXT PRIMARY KEY,
    mod_type       TEXT NOT NULL,
    description    TEXT NOT NULL,
    file_path      TEXT,
    diff           TEXT,
    diff_truncated INTEGER NOT NULL DEFAULT 0,
    reversible     INTEGER NOT NULL DEFAULT 1,
    created_at     TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Registered skills
CREATE TABLE IF NOT EXISTS skills (
    name          TEXT PRIMARY KEY,
    description   TEXT NOT NULL,
    version       TEXT NOT NULL DEFAULT '1.0.0',
    auto_activate INTEGER NOT NULL DEFAULT 0,
    enabled       INTEGER NOT NULL DEFAULT 1,
    instructions  TEXT NOT NULL,
    requires_bins_json TEXT NOT NULL DEFAULT '[]',
    requires_env_json  TEXT NOT NULL DEFAULT '[]',
    source        TEXT NOT NULL DEFAULT 'disk',
    file_path     TEXT,
    installed_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Spawned children
CREATE TABLE IF NOT EXISTS children (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    sandbox_id      TEXT NOT NULL,
    wallet_address  TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'running',
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

-- On-chain registry records
CREATE TABLE IF NOT EXISTS registry (
    wallet_address TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    metadata_uri   TEXT,
    parent_agent   TEXT,
    token_id       TEXT,
    registered_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Social inbox messages
CREATE TABLE IF NOT EXISTS inbox (
    id            TEXT PRIMARY KEY,
    from_address  TEXT NOT NULL,
    to_address    TEXT NOT NULL,
    content       TEXT NOT NULL,
    signed_at     TEXT NOT NULL DEFAULT (datetime('now')),
    processed     INTEGER NOT NULL DEFAULT 0,
    received_at   TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Per-source inbox poll cursors (see DESIGN.md open-question resolution #1)
CREATE TABLE IF NOT EXISTS inbox_cursors (
    source      TEXT PRIMARY KEY,
    cursor      TEXT,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Upstream sync tracking
CREATE TABLE IF NOT EXISTS upstream_commits (
    commit_hash TEXT PRIMARY KEY,
    message     TEXT,
    applied     INTEGER NOT NULL DEFAULT 0,
    reviewed    INTEGER NOT NULL DEFAULT 0,
    fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_turns_created ON turns(created_at);
CREATE INDEX IF NOT EXISTS idx_turns_state ON turns(state);
CREATE INDEX IF NOT EXISTS idx_tool_calls_turn ON tool_calls(turn_id);
CREATE INDEX IF NOT EXISTS idx_heartbeat_task ON heartbeat_entries(task_name);
CREATE INDEX IF NOT EXISTS idx_inbox_processed ON inbox(processed);
CREATE INDEX IF NOT EXISTS idx_inbox_to ON inbox(to_address);
CREATE INDEX IF NOT EXISTS idx_inbox_signed_at ON inbox(signed_at);
CREATE INDEX IF NOT EXISTS idx_cost_ledger_timestamp ON cost_ledger(timestamp);
CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at);
CREATE INDEX IF NOT EXISTS idx_modifications_created ON modifications(created_at);
"#;

/// Migration from version 1 to version 2.
pub const MIGRATE_V1_TO_V2: &str = r#"
ALTER TABLE turns ADD COLUMN state TEXT NOT NULL DEFAULT 'running';
"#;

/// Migration from version 2 to version 3.
pub const MIGRATE_V2_TO_V3: &str = r#"
CREATE TABLE IF NOT EXISTS upstream_commits (
    commit_hash TEXT PRIMARY KEY,
    message     TEXT,
    applied     INTEGER NOT NULL DEFAULT 0,
    reviewed    INTEGER NOT NULL DEFAULT 0,
    fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Migration from version 3 to version 4: widens turns/tool_calls/inbox/
/// skills/children for the router, sanitizer and replication subsystems,
/// and adds the cost ledger, model registry and inbox cursor tables.
pub const MIGRATE_V3_TO_V4: &str = r#"
ALTER TABLE turns ADD COLUMN input_source TEXT NOT NULL DEFAULT 'none';
ALTER TABLE turns ADD COLUMN input TEXT NOT NULL DEFAULT '';
ALTER TABLE turns ADD COLUMN thinking TEXT;
ALTER TABLE turns ADD COLUMN tokens_in INTEGER NOT NULL DEFAULT 0;
ALTER TABLE turns ADD COLUMN tokens_out INTEGER NOT NULL DEFAULT 0;
ALTER TABLE turns ADD COLUMN model_id TEXT NOT NULL DEFAULT '';
ALTER TABLE turns ADD COLUMN cost_hundredth_cents INTEGER NOT NULL DEFAULT 0;

ALTER TABLE tool_calls ADD COLUMN error TEXT;
ALTER TABLE tool_calls ADD COLUMN fatal INTEGER NOT NULL DEFAULT 0;

ALTER TABLE inbox ADD COLUMN signed_at TEXT NOT NULL DEFAULT (datetime('now'));
ALTER TABLE inbox ADD COLUMN processed INTEGER NOT NULL DEFAULT 0;
ALTER TABLE inbox ADD COLUMN received_at TEXT NOT NULL DEFAULT (datetime('now'));

ALTER TABLE skills ADD COLUMN enabled INTEGER NOT NULL DEFAULT 1;
ALTER TABLE skills ADD COLUMN requires_bins_json TEXT NOT NULL DEFAULT '[]';
ALTER TABLE skills ADD COLUMN requires_env_json TEXT NOT NULL DEFAULT '[]';
ALTER TABLE skills ADD COLUMN source TEXT NOT NULL DEFAULT 'disk';
ALTER TABLE skills ADD COLUMN installed_at TEXT NOT NULL DEFAULT (datetime('now'));

CREATE TABLE IF NOT EXISTS heartbeat_task_health (
    task_name            TEXT PRIMARY KEY,
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    degraded             INTEGER NOT NULL DEFAULT 0,
    last_run_at          TEXT
);

CREATE TABLE IF NOT EXISTS cost_ledger (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp             TEXT NOT NULL DEFAULT (datetime('now')),
    model_id              TEXT NOT NULL,
    task_kind             TEXT NOT NULL,
    tokens_in             INTEGER NOT NULL,
    tokens_out            INTEGER NOT NULL,
    cost_hundredth_cents  INTEGER NOT NULL,
    tier                  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS model_registry (
    model_id           TEXT PRIMARY KEY,
    provider           TEXT NOT NULL,
    tier_minimum       TEXT NOT NULL DEFAULT 'dead',
    cost_per_1k_input  INTEGER NOT NULL DEFAULT 0,
    cost_per_1k_output INTEGER NOT NULL DEFAULT 0,
    max_tokens         INTEGER NOT NULL DEFAULT 4096,
    context_window     INTEGER NOT NULL DEFAULT 8192,
    supports_tools     INTEGER NOT NULL DEFAULT 1,
    enabled            INTEGER NOT NULL DEFAULT 1,
    last_seen          TEXT
);

CREATE TABLE IF NOT EXISTS inbox_cursors (
    source      TEXT PRIMARY KEY,
    cursor      TEXT,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_turns_state ON turns(state);
CREATE INDEX IF NOT EXISTS idx_inbox_processed ON inbox(processed);
CREATE INDEX IF NOT EXISTS idx_inbox_signed_at ON inbox(signed_at);
CREATE INDEX IF NOT EXISTS idx_cost_ledger_timestamp ON cost_ledger(timestamp);
"#;
