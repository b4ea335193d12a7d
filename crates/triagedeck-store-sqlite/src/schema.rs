//! SQL schema for the triagedeck SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number. All timestamps are
//! Unix-epoch milliseconds; UUIDs are hyphenated lowercase strings.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organization (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS project (
    id                   TEXT PRIMARY KEY,
    organization_id      TEXT NOT NULL REFERENCES organization(id),
    name                 TEXT NOT NULL,
    slug                 TEXT NOT NULL,
    decision_schema_json TEXT NOT NULL,
    config_json          TEXT NOT NULL,
    created_at           INTEGER NOT NULL,
    deleted_at           INTEGER          -- soft delete; NULL = live
);

CREATE TABLE IF NOT EXISTS project_membership (
    project_id TEXT NOT NULL REFERENCES project(id),
    user_id    TEXT NOT NULL,
    role       TEXT NOT NULL,   -- 'admin' | 'reviewer' | 'viewer'
    PRIMARY KEY (project_id, user_id)
);

CREATE TABLE IF NOT EXISTS item (
    id            TEXT PRIMARY KEY,
    project_id    TEXT NOT NULL REFERENCES project(id),
    external_id   TEXT NOT NULL,
    media_type    TEXT NOT NULL,   -- 'image' | 'video' | 'pdf' | 'other'
    logical_uri   TEXT NOT NULL,
    sort_key      TEXT NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at    INTEGER NOT NULL,
    deleted_at    INTEGER
);

CREATE TABLE IF NOT EXISTS item_variant (
    item_id       TEXT NOT NULL REFERENCES item(id),
    variant_key   TEXT NOT NULL,
    label         TEXT NOT NULL,
    logical_uri   TEXT NOT NULL,
    sort_order    INTEGER NOT NULL,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (item_id, variant_key)
);

-- Decision events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
-- The UNIQUE constraint is the single source of idempotency truth.
CREATE TABLE IF NOT EXISTS decision_event (
    id                  TEXT PRIMARY KEY,
    project_id          TEXT NOT NULL REFERENCES project(id),
    user_id             TEXT NOT NULL,
    event_id            TEXT NOT NULL,
    item_id             TEXT NOT NULL REFERENCES item(id),
    decision_id         TEXT NOT NULL,
    note                TEXT NOT NULL DEFAULT '',
    ts_client           INTEGER NOT NULL,
    ts_client_effective INTEGER NOT NULL,
    ts_server           INTEGER NOT NULL,
    UNIQUE (project_id, user_id, event_id)
);

-- The latest-decision projection. Only written in the same transaction that
-- appends an event, or by the diagnostic rebuilder.
CREATE TABLE IF NOT EXISTS decision_latest (
    project_id          TEXT NOT NULL REFERENCES project(id),
    user_id             TEXT NOT NULL,
    item_id             TEXT NOT NULL REFERENCES item(id),
    event_id            TEXT NOT NULL,
    decision_id         TEXT NOT NULL,
    note                TEXT NOT NULL DEFAULT '',
    ts_client           INTEGER NOT NULL,
    ts_client_effective INTEGER NOT NULL,
    ts_server           INTEGER NOT NULL,
    PRIMARY KEY (project_id, user_id, item_id)
);

CREATE TABLE IF NOT EXISTS export_job (
    id                  TEXT PRIMARY KEY,
    project_id          TEXT NOT NULL REFERENCES project(id),
    requested_by        TEXT NOT NULL,
    status              TEXT NOT NULL,   -- 'queued'|'running'|'ready'|'failed'|'expired'
    mode                TEXT NOT NULL,
    label_policy        TEXT NOT NULL,
    format              TEXT NOT NULL,
    filters_json        TEXT NOT NULL DEFAULT '{}',
    include_fields_json TEXT NOT NULL DEFAULT '[]',
    manifest_json       TEXT,
    file_uri            TEXT,
    error_code          TEXT,
    expires_at          INTEGER,
    created_at          INTEGER NOT NULL,
    completed_at        INTEGER
);

CREATE INDEX IF NOT EXISTS item_project_sort_idx
    ON item(project_id, sort_key, id);
CREATE INDEX IF NOT EXISTS variant_item_sort_idx
    ON item_variant(item_id, sort_order, variant_key);
CREATE INDEX IF NOT EXISTS event_item_effective_idx
    ON decision_event(project_id, user_id, item_id, ts_client_effective);
CREATE INDEX IF NOT EXISTS latest_server_ts_idx
    ON decision_latest(project_id, user_id, ts_server, item_id);
CREATE INDEX IF NOT EXISTS export_project_recency_idx
    ON export_job(project_id, created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS export_requester_idx
    ON export_job(project_id, requested_by, status);
CREATE INDEX IF NOT EXISTS export_claim_idx
    ON export_job(status, created_at, id);

PRAGMA user_version = 1;
";
