//! Database schema. Creation is idempotent; there is no migration step.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL UNIQUE,
    display_name    TEXT NOT NULL,
    email           TEXT NOT NULL UNIQUE,
    role            TEXT NOT NULL,
    plan            TEXT NOT NULL,
    status          TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS root_shelves (
    id                  TEXT PRIMARY KEY,
    owner_id            TEXT NOT NULL REFERENCES users(id),
    name                TEXT NOT NULL,
    total_shelf_nodes   INTEGER NOT NULL DEFAULT 0,
    total_materials     INTEGER NOT NULL DEFAULT 0,
    last_analyzed_at    INTEGER NOT NULL,
    deleted_at          INTEGER,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_root_shelves_owner ON root_shelves(owner_id);

CREATE TABLE IF NOT EXISTS users_to_shelves (
    user_id         TEXT NOT NULL REFERENCES users(id),
    root_shelf_id   TEXT NOT NULL REFERENCES root_shelves(id),
    permission      TEXT NOT NULL CHECK (permission IN ('Owner', 'Admin', 'Write', 'Read')),
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    PRIMARY KEY (user_id, root_shelf_id)
);
CREATE INDEX IF NOT EXISTS idx_users_to_shelves_root ON users_to_shelves(root_shelf_id);

CREATE TABLE IF NOT EXISTS sub_shelves (
    id                  TEXT PRIMARY KEY,
    name                TEXT NOT NULL,
    root_shelf_id       TEXT NOT NULL REFERENCES root_shelves(id),
    prev_sub_shelf_id   TEXT REFERENCES sub_shelves(id),
    path                TEXT NOT NULL DEFAULT '[]',
    deleted_at          INTEGER,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sub_shelves_root ON sub_shelves(root_shelf_id);
CREATE INDEX IF NOT EXISTS idx_sub_shelves_prev ON sub_shelves(prev_sub_shelf_id);

CREATE TABLE IF NOT EXISTS block_packs (
    id                      TEXT PRIMARY KEY,
    parent_sub_shelf_id     TEXT NOT NULL REFERENCES sub_shelves(id),
    name                    TEXT NOT NULL,
    icon                    TEXT,
    header_background_url   TEXT,
    block_count             INTEGER NOT NULL DEFAULT 0,
    deleted_at              INTEGER,
    created_at              INTEGER NOT NULL,
    updated_at              INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_block_packs_parent ON block_packs(parent_sub_shelf_id);

CREATE TABLE IF NOT EXISTS block_groups (
    id                      TEXT PRIMARY KEY,
    block_pack_id           TEXT NOT NULL REFERENCES block_packs(id),
    prev_block_group_id     TEXT REFERENCES block_groups(id),
    sync_block_group_id     TEXT REFERENCES block_groups(id),
    mega_byte_size          REAL NOT NULL DEFAULT 0,
    deleted_at              INTEGER,
    created_at              INTEGER NOT NULL,
    updated_at              INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_block_groups_pack ON block_groups(block_pack_id);
CREATE INDEX IF NOT EXISTS idx_block_groups_prev ON block_groups(prev_block_group_id);

CREATE TABLE IF NOT EXISTS blocks (
    id                  TEXT PRIMARY KEY,
    block_group_id      TEXT NOT NULL REFERENCES block_groups(id),
    parent_block_id     TEXT,
    type                TEXT NOT NULL,
    props               TEXT NOT NULL,
    content             TEXT,
    position            INTEGER NOT NULL,
    deleted_at          INTEGER,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_blocks_group ON blocks(block_group_id, position);

CREATE TABLE IF NOT EXISTS materials (
    id                  TEXT PRIMARY KEY,
    root_shelf_id       TEXT NOT NULL REFERENCES root_shelves(id),
    parent_shelf_id     TEXT NOT NULL REFERENCES sub_shelves(id),
    name                TEXT NOT NULL,
    type                TEXT NOT NULL,
    content_url         TEXT NOT NULL,
    content_type        TEXT NOT NULL,
    deleted_at          INTEGER,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_materials_parent ON materials(parent_shelf_id);
CREATE INDEX IF NOT EXISTS idx_materials_root ON materials(root_shelf_id);
"#;

/// Unicode lowercase, for case-insensitive matching beyond ASCII.
pub const FOLD_CASE: &str = "fold_case";

/// Per-connection setup, run on every connection the pool opens.
pub fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.create_scalar_function(
        FOLD_CASE,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    debug!("initializing schema");
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
