//! SQL migration definitions for the SiteCrawl database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: sites, resources, plugins, crawl_runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Crawl targets; dedup filter bits live in the same row
CREATE TABLE IF NOT EXISTS sites (
    id                 TEXT PRIMARY KEY,
    name               TEXT NOT NULL,
    url                TEXT NOT NULL,
    plugin_defs_json   TEXT NOT NULL,
    crawl_opts_json    TEXT NOT NULL,
    bloom_m            INTEGER NOT NULL,
    bloom_k            INTEGER NOT NULL,
    bloom_bits         BLOB NOT NULL,
    created_at         TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sites_name ON sites(name);

-- Frontier: one row per discovered URL
CREATE TABLE IF NOT EXISTS resources (
    id                 TEXT PRIMARY KEY,
    site_id            TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    url                TEXT NOT NULL,
    depth              INTEGER NOT NULL,
    crawl_in_progress  INTEGER NOT NULL DEFAULT 0,
    crawled_at         INTEGER NOT NULL DEFAULT 0,
    claimed_at         INTEGER,
    media_type         TEXT,
    content_json       TEXT NOT NULL DEFAULT '{}',
    info_json          TEXT NOT NULL DEFAULT '{}',
    actions_json       TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_resources_url ON resources(url);
CREATE INDEX IF NOT EXISTS idx_resources_claim
    ON resources(site_id, crawl_in_progress, crawled_at);

-- User-defined plugin presets
CREATE TABLE IF NOT EXISTS plugins (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    base        TEXT NOT NULL,
    description TEXT,
    opts_json   TEXT NOT NULL DEFAULT '{}'
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_plugins_name ON plugins(name);

-- Crawl run history; an open run marks an interrupted crawl
CREATE TABLE IF NOT EXISTS crawl_runs (
    id          TEXT PRIMARY KEY,
    site_id     TEXT NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    status      TEXT NOT NULL DEFAULT 'running',
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_site ON crawl_runs(site_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
