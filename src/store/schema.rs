//! Schema migration and seeded rule operands.
//!
//! The whole schema is a single idempotent batch; every table uses
//! IF NOT EXISTS and seeds use INSERT OR IGNORE, so running it on an
//! existing database is a no-op.

use rusqlite::Connection;

use crate::error::{Error, Result};

pub fn migrate(conn: &Connection) -> Result<()> {
    tracing::debug!("Running database migrations");

    conn.execute_batch(SCHEMA)
        .map_err(|e| Error::Migration(e.to_string()))?;

    conn.execute_batch(SEED_DEFAULTS)
        .map_err(|e| Error::Migration(e.to_string()))?;

    tracing::debug!("Database migrations complete");
    Ok(())
}

const SCHEMA: &str = r#"

-- ============================================================================
-- Configuration primitives: parameters, lists, maps
-- ============================================================================

CREATE TABLE IF NOT EXISTS parameters (
    key          TEXT PRIMARY KEY,
    value        TEXT NOT NULL,
    data_type    TEXT NOT NULL DEFAULT 'string',
    last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS lists (
    key          TEXT PRIMARY KEY,
    values_json  TEXT NOT NULL,
    last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE TABLE IF NOT EXISTS maps (
    map_key      TEXT NOT NULL,
    lookup_key   TEXT NOT NULL,
    value        TEXT NOT NULL,
    last_updated TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    PRIMARY KEY (map_key, lookup_key)
);

-- ============================================================================
-- Persona assignments (exclusively owned by this engine)
-- ============================================================================

CREATE TABLE IF NOT EXISTS assignments (
    profile_id  TEXT NOT NULL CHECK (length(profile_id) > 0),
    persona_id  TEXT NOT NULL CHECK (length(persona_id) > 0),
    assigned_at TEXT NOT NULL,
    method      TEXT NOT NULL DEFAULT 'auto',
    score       REAL NOT NULL DEFAULT 1.0,
    PRIMARY KEY (profile_id, persona_id)
);

CREATE INDEX IF NOT EXISTS idx_assignments_persona ON assignments(persona_id);

-- ============================================================================
-- Audit trail (append-only; never updated or deleted)
-- ============================================================================

CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_id  TEXT,
    action      TEXT NOT NULL,
    details     TEXT NOT NULL DEFAULT '{}',
    changed_by  TEXT NOT NULL DEFAULT 'SYSTEM',
    reason      TEXT,
    timestamp   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_audit_profile ON audit_log(profile_id);
CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action);
CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);

-- ============================================================================
-- Customer profiles (owned by the CRM module; created here only so that
-- audience-stats joins work on a fresh database)
-- ============================================================================

CREATE TABLE IF NOT EXISTS customer_profiles (
    profile_id     TEXT PRIMARY KEY,
    lifetime_value REAL
);
"#;

/// Default operands for the built-in rule set. Operators retune these
/// through the configuration endpoints without a redeploy.
const SEED_DEFAULTS: &str = r#"
INSERT OR IGNORE INTO parameters (key, value, data_type) VALUES
    ('AGE_MIN_MILL', '25', 'integer'),
    ('AGE_MAX_MILL', '40', 'integer'),
    ('INCOME_MIN_LEADER', '20000', 'number');

INSERT OR IGNORE INTO lists (key, values_json) VALUES
    ('COUNTRIES_NAT_MILL', '["SA","AE"]');
"#;
