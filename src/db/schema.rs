//! SQL DDL for the storable-object tables.
//! SQLite-first design; footprints and symbols share one column layout.

/// One table per storable kind:
/// - `id` INTEGER PRIMARY KEY AUTOINCREMENT
/// - `cad_type` / `storage_status` stored as their upper-case names
/// - `(path, reference)` index backs the duplication lookups
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS footprint_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    reference TEXT NOT NULL,
    cad_type TEXT NOT NULL,
    description TEXT NULL,
    alias TEXT NULL,
    storage_status TEXT NOT NULL DEFAULT 'NOT_STORED',
    storage_error TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_footprint_references_path_reference
    ON footprint_references(path, reference);

CREATE TABLE IF NOT EXISTS library_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    reference TEXT NOT NULL,
    cad_type TEXT NOT NULL,
    description TEXT NULL,
    alias TEXT NULL,
    storage_status TEXT NOT NULL DEFAULT 'NOT_STORED',
    storage_error TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_library_references_path_reference
    ON library_references(path, reference);
"#;
