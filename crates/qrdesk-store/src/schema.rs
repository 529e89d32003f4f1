/// SQL DDL for the scan database.
/// WAL mode enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS scans (
    id TEXT PRIMARY KEY,
    qr_data TEXT NOT NULL,
    scan_type TEXT NOT NULL DEFAULT 'camera',
    file_path TEXT,
    scanned_at TEXT NOT NULL,
    printed INTEGER NOT NULL DEFAULT 0,
    printed_at TEXT,
    printer_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_scans_scanned_at ON scans(scanned_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
