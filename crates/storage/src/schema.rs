use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i32, StorageError> {
    let version: i32 =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version)
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS users (
    user_id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL CHECK (role IN ('admin', 'submitter')),
    display_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS opportunities (
    opportunity_id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    company TEXT NOT NULL CHECK (length(trim(company)) > 0),
    contact_name TEXT,
    description TEXT,
    status TEXT NOT NULL,
    value_cents INTEGER,
    owner_id TEXT NOT NULL REFERENCES users (user_id),
    requested_machine TEXT,
    requested_attachments TEXT,
    trade_in TEXT,
    expected_close TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL CHECK (updated_at >= created_at)
);
CREATE INDEX IF NOT EXISTS idx_opportunities_owner ON opportunities (owner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_opportunities_status ON opportunities (status);

CREATE TABLE IF NOT EXISTS opportunity_events (
    rowid INTEGER PRIMARY KEY,
    opportunity_id TEXT NOT NULL REFERENCES opportunities (opportunity_id),
    actor_id TEXT NOT NULL REFERENCES users (user_id),
    at INTEGER NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('created', 'status_changed', 'edited')),
    from_status TEXT,
    to_status TEXT,
    changed_fields BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_at ON opportunity_events (at);
CREATE INDEX IF NOT EXISTS idx_events_opportunity ON opportunity_events (opportunity_id, at);

CREATE TABLE IF NOT EXISTS call_notes (
    call_note_id TEXT PRIMARY KEY,
    opportunity_id TEXT NOT NULL REFERENCES opportunities (opportunity_id),
    author_id TEXT NOT NULL REFERENCES users (user_id),
    summary TEXT NOT NULL,
    occurred_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_call_notes_occurred ON call_notes (occurred_at);

CREATE TABLE IF NOT EXISTS expenses (
    expense_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL REFERENCES users (user_id),
    opportunity_id TEXT REFERENCES opportunities (opportunity_id),
    category TEXT NOT NULL,
    amount_cents INTEGER NOT NULL CHECK (amount_cents >= 0),
    description TEXT,
    incurred_on TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_expenses_incurred ON expenses (incurred_on);
";
