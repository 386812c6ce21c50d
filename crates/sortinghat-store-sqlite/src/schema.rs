//! SQL schema for the Sorting Hat SQLite store.
//!
//! Executed once at connection startup. Every statement is idempotent, so
//! opening an existing database leaves its contents alone.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Global organization registry; names are unique.
CREATE TABLE IF NOT EXISTS organizations (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS countries (
    code    TEXT PRIMARY KEY,
    alpha3  TEXT NOT NULL,
    name    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS uidentities (
    uuid           TEXT PRIMARY KEY,
    last_modified  TEXT NOT NULL      -- RFC 3339 UTC; server-assigned
);

-- Exactly one profile per unique identity.
CREATE TABLE IF NOT EXISTS profiles (
    uuid          TEXT PRIMARY KEY REFERENCES uidentities(uuid),
    name          TEXT,
    email         TEXT,
    gender        TEXT,
    gender_acc    INTEGER,
    is_bot        INTEGER,
    country_code  TEXT
);

CREATE TABLE IF NOT EXISTS identities (
    id             TEXT PRIMARY KEY,
    uuid           TEXT NOT NULL REFERENCES uidentities(uuid),
    source         TEXT NOT NULL,
    name           TEXT,
    email          TEXT,
    username       TEXT,
    last_modified  TEXT NOT NULL
);

-- project_slug NULL marks a global enrollment.
CREATE TABLE IF NOT EXISTS enrollments (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid             TEXT NOT NULL REFERENCES uidentities(uuid),
    organization_id  INTEGER NOT NULL REFERENCES organizations(id),
    \"start\"          TEXT,            -- YYYY-MM-DD HH:MM:SS or NULL
    \"end\"            TEXT,
    project_slug     TEXT
);

CREATE INDEX IF NOT EXISTS identities_uuid_idx   ON identities(uuid);
CREATE INDEX IF NOT EXISTS identities_tuple_idx  ON identities(name, email, username, source);
CREATE INDEX IF NOT EXISTS enrollments_uuid_idx  ON enrollments(uuid, project_slug);

PRAGMA user_version = 1;
";
