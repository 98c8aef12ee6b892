//! `SQLite` schema definitions for chamada.

/// Device key-value store (session token, student id).
pub const CREATE_KV_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Journal of scan attempt outcomes.
pub const CREATE_ATTEMPTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    call_id TEXT,
    payload_hash TEXT NOT NULL,
    outcome TEXT NOT NULL,
    message TEXT NOT NULL
)
";

/// Index on attempt time for history listing and pruning.
pub const CREATE_ATTEMPTS_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_attempts_timestamp ON attempts(timestamp DESC)
";

/// Internal bookkeeping (schema version).
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_KV_TABLE,
    CREATE_ATTEMPTS_TABLE,
    CREATE_ATTEMPTS_TIMESTAMP_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_attempts_table_columns() {
        assert!(CREATE_ATTEMPTS_TABLE.contains("payload_hash TEXT NOT NULL"));
        assert!(CREATE_ATTEMPTS_TABLE.contains("outcome TEXT NOT NULL"));
        assert!(CREATE_ATTEMPTS_TABLE.contains("call_id TEXT"));
    }
}
