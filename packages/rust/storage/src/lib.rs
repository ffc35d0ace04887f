//! libSQL storage layer for sites, their frontier, plugin presets and crawl runs.
//!
//! The [`Storage`] struct wraps a single libSQL connection. Every write goes
//! through an in-process async lock and, where several statements must land
//! together, an `IMMEDIATE` transaction. Reads do not take the lock.
//!
//! Frontier operations (enqueue, claim, complete, reset) live in [`frontier`].

mod frontier;
mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Transaction, TransactionBehavior, params};
use serde::Serialize;
use sitecrawl_shared::{
    BloomFilter, CrawlOpts, PluginDefinition, PluginPreset, Result, Site, SiteCrawlError, SiteId,
};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    write_lock: Mutex<()>,
}

/// Map a libSQL error into the storage error variant.
pub(crate) fn db_err(e: libsql::Error) -> SiteCrawlError {
    SiteCrawlError::Storage(e.to_string())
}

/// Like [`db_err`], but reports unique index violations as conflicts.
fn unique_err(what: &str, e: libsql::Error) -> SiteCrawlError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        SiteCrawlError::Conflict(format!("{what} already exists"))
    } else {
        SiteCrawlError::Storage(msg)
    }
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SiteCrawlError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    SiteCrawlError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Take the write lock and open an `IMMEDIATE` transaction.
    ///
    /// The guard must outlive the transaction.
    pub(crate) async fn begin_write(&self) -> Result<(MutexGuard<'_, ()>, Transaction)> {
        let guard = self.write_lock.lock().await;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(db_err)?;
        Ok((guard, tx))
    }

    // -----------------------------------------------------------------------
    // Site operations
    // -----------------------------------------------------------------------

    /// Create a site and seed its frontier with the site URL at depth 0.
    ///
    /// Both happen in one transaction, so a site never exists without its seed.
    pub async fn create_site(
        &self,
        name: &str,
        url: &str,
        plugin_definitions: &[PluginDefinition],
        crawl_opts: CrawlOpts,
        dedup: BloomFilter,
    ) -> Result<Site> {
        let site = Site {
            id: SiteId::new(),
            name: name.to_string(),
            url: url.to_string(),
            plugin_definitions: plugin_definitions.to_vec(),
            crawl_opts,
            dedup,
            created_at: Utc::now(),
        };

        let (_guard, tx) = self.begin_write().await?;
        let outcome: Result<usize> = async {
            tx.execute(
                "INSERT INTO sites (id, name, url, plugin_defs_json, crawl_opts_json,
                                    bloom_m, bloom_k, bloom_bits, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    site.id.to_string(),
                    site.name.as_str(),
                    site.url.as_str(),
                    to_json(&site.plugin_definitions)?,
                    to_json(&site.crawl_opts)?,
                    site.dedup.bit_count() as i64,
                    i64::from(site.dedup.hash_count()),
                    site.dedup.to_bytes(),
                    site.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| unique_err("site name", e))?;

            frontier::enqueue_in(&tx, &site.id, &[site.url.clone()], 0).await
        }
        .await;

        match outcome {
            Ok(_) => {
                tx.commit().await.map_err(db_err)?;
                tracing::info!(site_id = %site.id, name, url, "site created");
                // Reload so the returned filter snapshot includes the seed URL.
                self.get_site(&site.id)
                    .await?
                    .ok_or_else(|| SiteCrawlError::not_found("site", site.id.to_string()))
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Get a site by ID.
    pub async fn get_site(&self, id: &SiteId) -> Result<Option<Site>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_site(&row)?)),
            None => Ok(None),
        }
    }

    /// Get a site by its unique name.
    pub async fn get_site_by_name(&self, name: &str) -> Result<Option<Site>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SITE_COLUMNS} FROM sites WHERE name = ?1"),
                params![name],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_site(&row)?)),
            None => Ok(None),
        }
    }

    /// List all sites ordered by name.
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY name"),
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_site(&row)?);
        }
        Ok(results)
    }

    /// Update a site's name, URL, plugin definitions and crawl options.
    ///
    /// Dedup bits are left alone; only [`Storage::enqueue`] writes them.
    pub async fn update_site(&self, site: &Site) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                "UPDATE sites SET name = ?1, url = ?2, plugin_defs_json = ?3, crawl_opts_json = ?4
                 WHERE id = ?5",
                params![
                    site.name.as_str(),
                    site.url.as_str(),
                    to_json(&site.plugin_definitions)?,
                    to_json(&site.crawl_opts)?,
                    site.id.to_string(),
                ],
            )
            .await
            .map_err(|e| unique_err("site name", e))?;

        if changed == 0 {
            return Err(SiteCrawlError::not_found("site", site.id.to_string()));
        }
        Ok(())
    }

    /// Delete a site with its resources and crawl runs. Returns `false` if it did not exist.
    pub async fn delete_site(&self, id: &SiteId) -> Result<bool> {
        let (_guard, tx) = self.begin_write().await?;
        let id_str = id.to_string();
        let outcome: Result<u64> = async {
            tx.execute("DELETE FROM resources WHERE site_id = ?1", params![id_str.as_str()])
                .await
                .map_err(db_err)?;
            tx.execute("DELETE FROM crawl_runs WHERE site_id = ?1", params![id_str.as_str()])
                .await
                .map_err(db_err)?;
            tx.execute("DELETE FROM sites WHERE id = ?1", params![id_str.as_str()])
                .await
                .map_err(db_err)
        }
        .await;

        match outcome {
            Ok(deleted) => {
                tx.commit().await.map_err(db_err)?;
                if deleted > 0 {
                    tracing::info!(site_id = %id, "site deleted");
                }
                Ok(deleted > 0)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Plugin preset operations
    // -----------------------------------------------------------------------

    /// Insert a plugin preset. Returns the generated ID.
    pub async fn insert_plugin(&self, preset: &PluginPreset) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        let id = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT INTO plugins (id, name, base, description, opts_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    preset.name.as_str(),
                    preset.base.as_str(),
                    preset.description.as_deref(),
                    to_json(&preset.opts)?,
                ],
            )
            .await
            .map_err(|e| unique_err("plugin name", e))?;
        Ok(id)
    }

    /// Get a plugin preset by ID.
    pub async fn get_plugin(&self, id: &str) -> Result<Option<PluginPreset>> {
        self.query_plugin("WHERE id = ?1", id).await
    }

    /// Get a plugin preset by its unique name.
    pub async fn get_plugin_by_name(&self, name: &str) -> Result<Option<PluginPreset>> {
        self.query_plugin("WHERE name = ?1", name).await
    }

    async fn query_plugin(&self, clause: &str, key: &str) -> Result<Option<PluginPreset>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT id, name, base, description, opts_json FROM plugins {clause}"),
                params![key],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_preset(&row)?)),
            None => Ok(None),
        }
    }

    /// List all plugin presets ordered by name.
    pub async fn list_plugins(&self) -> Result<Vec<PluginPreset>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, base, description, opts_json FROM plugins ORDER BY name",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_preset(&row)?);
        }
        Ok(results)
    }

    /// Replace a plugin preset's fields.
    pub async fn update_plugin(&self, preset: &PluginPreset) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                "UPDATE plugins SET name = ?1, base = ?2, description = ?3, opts_json = ?4
                 WHERE id = ?5",
                params![
                    preset.name.as_str(),
                    preset.base.as_str(),
                    preset.description.as_deref(),
                    to_json(&preset.opts)?,
                    preset.id.as_str(),
                ],
            )
            .await
            .map_err(|e| unique_err("plugin name", e))?;

        if changed == 0 {
            return Err(SiteCrawlError::not_found("plugin", preset.id.as_str()));
        }
        Ok(())
    }

    /// Delete a plugin preset. Returns `false` if it did not exist.
    pub async fn delete_plugin(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let deleted = self
            .conn
            .execute("DELETE FROM plugins WHERE id = ?1", params![id])
            .await
            .map_err(db_err)?;
        Ok(deleted > 0)
    }

    // -----------------------------------------------------------------------
    // Crawl run operations
    // -----------------------------------------------------------------------

    /// Open a crawl run for a site. Returns the generated run ID.
    pub async fn insert_crawl_run(&self, site_id: &SiteId) -> Result<String> {
        let _guard = self.write_lock.lock().await;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO crawl_runs (id, site_id, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), site_id.to_string(), now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(id)
    }

    /// Close a crawl run with a final status and stats.
    pub async fn finish_crawl_run(
        &self,
        run_id: &str,
        status: RunStatus,
        stats_json: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE crawl_runs SET finished_at = ?1, status = ?2, stats_json = ?3 WHERE id = ?4",
                params![now.as_str(), status.as_str(), stats_json, run_id],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Close every still-open run of a site as interrupted. Returns how many were open.
    pub async fn close_open_runs(&self, site_id: &SiteId) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE crawl_runs SET finished_at = ?1, status = ?2
                 WHERE site_id = ?3 AND finished_at IS NULL",
                params![
                    now.as_str(),
                    RunStatus::Interrupted.as_str(),
                    site_id.to_string()
                ],
            )
            .await
            .map_err(db_err)
    }

    /// Most recent crawl run of a site.
    pub async fn latest_crawl_run(&self, site_id: &SiteId) -> Result<Option<CrawlRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, site_id, started_at, finished_at, status, stats_json
                 FROM crawl_runs WHERE site_id = ?1 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![site_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(CrawlRun {
                id: row.get::<String>(0).map_err(db_err)?,
                site_id: row.get::<String>(1).map_err(db_err)?,
                started_at: parse_rfc3339(&row.get::<String>(2).map_err(db_err)?)?,
                finished_at: match row.get::<String>(3).ok() {
                    Some(s) => Some(parse_rfc3339(&s)?),
                    None => None,
                },
                status: RunStatus::parse(&row.get::<String>(4).map_err(db_err)?),
                stats: row
                    .get::<String>(5)
                    .ok()
                    .and_then(|s| serde_json::from_str(&s).ok()),
            })),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Crawl runs
// ---------------------------------------------------------------------------

/// Final (or current) status of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
}

impl RunStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "interrupted" => Self::Interrupted,
            _ => Self::Running,
        }
    }
}

/// A row of the crawl run history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRun {
    pub id: String,
    pub site_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub stats: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

const SITE_COLUMNS: &str =
    "id, name, url, plugin_defs_json, crawl_opts_json, bloom_m, bloom_k, bloom_bits, created_at";

/// Convert a database row to a [`Site`].
fn row_to_site(row: &libsql::Row) -> Result<Site> {
    let id: String = row.get(0).map_err(db_err)?;
    let m: i64 = row.get(5).map_err(db_err)?;
    let k: i64 = row.get(6).map_err(db_err)?;
    let bits: Vec<u8> = row.get(7).map_err(db_err)?;

    Ok(Site {
        id: id
            .parse()
            .map_err(|e| SiteCrawlError::Storage(format!("invalid site id {id}: {e}")))?,
        name: row.get::<String>(1).map_err(db_err)?,
        url: row.get::<String>(2).map_err(db_err)?,
        plugin_definitions: from_json(&row.get::<String>(3).map_err(db_err)?)?,
        crawl_opts: from_json(&row.get::<String>(4).map_err(db_err)?)?,
        dedup: BloomFilter::from_parts(m as u64, k as u32, &bits)?,
        created_at: parse_rfc3339(&row.get::<String>(8).map_err(db_err)?)?,
    })
}

/// Convert a database row to a [`PluginPreset`].
fn row_to_preset(row: &libsql::Row) -> Result<PluginPreset> {
    Ok(PluginPreset {
        id: row.get::<String>(0).map_err(db_err)?,
        name: row.get::<String>(1).map_err(db_err)?,
        base: row.get::<String>(2).map_err(db_err)?,
        description: row.get::<String>(3).ok(),
        opts: from_json(&row.get::<String>(4).map_err(db_err)?)?,
    })
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SiteCrawlError::Storage(format!("encode: {e}")))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| SiteCrawlError::Storage(format!("decode: {e}")))
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SiteCrawlError::Storage(format!("invalid date: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use sitecrawl_shared::ResourceFilter;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    pub(crate) async fn test_site(storage: &Storage, name: &str, url: &str) -> Site {
        storage
            .create_site(
                name,
                url,
                &[PluginDefinition::named("SelectResourcePlugin")],
                CrawlOpts::default(),
                BloomFilter::with_capacity(1000, 0.01).unwrap(),
            )
            .await
            .expect("create site")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("sc_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn site_creation_seeds_frontier() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/index.html").await;

        assert!(site.dedup.test("https://x/index.html"));
        let resources = storage
            .list_resources(&site.id, ResourceFilter::All)
            .await
            .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].url, "https://x/index.html");
        assert_eq!(resources[0].depth, 0);
        assert!(!resources[0].is_crawled());
    }

    #[tokio::test]
    async fn site_crud() {
        let storage = test_storage().await;
        let mut site = test_site(&storage, "docs", "https://docs.example.com/").await;

        let by_name = storage.get_site_by_name("docs").await.unwrap().unwrap();
        assert_eq!(by_name.id, site.id);
        assert_eq!(by_name.plugin_definitions.len(), 1);

        site.name = "docs-renamed".into();
        site.crawl_opts.max_depth = 2;
        storage.update_site(&site).await.expect("update site");
        let found = storage.get_site(&site.id).await.unwrap().unwrap();
        assert_eq!(found.name, "docs-renamed");
        assert_eq!(found.crawl_opts.max_depth, 2);

        assert_eq!(storage.list_sites().await.unwrap().len(), 1);

        assert!(storage.delete_site(&site.id).await.unwrap());
        assert!(storage.get_site(&site.id).await.unwrap().is_none());
        assert_eq!(storage.count_resources(&site.id).await.unwrap(), 0);
        assert!(!storage.delete_site(&site.id).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_site_name_conflicts() {
        let storage = test_storage().await;
        test_site(&storage, "same", "https://a/").await;
        let result = storage
            .create_site(
                "same",
                "https://b/",
                &[],
                CrawlOpts::default(),
                BloomFilter::with_capacity(10, 0.01).unwrap(),
            )
            .await;
        assert!(matches!(result, Err(SiteCrawlError::Conflict(_))));
        // the failed create must not leave a seed behind
        assert_eq!(storage.list_sites().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_missing_site_is_not_found() {
        let storage = test_storage().await;
        let mut site = test_site(&storage, "x", "https://x/").await;
        site.id = SiteId::new();
        let result = storage.update_site(&site).await;
        assert!(matches!(result, Err(SiteCrawlError::NotFound { .. })));
    }

    #[tokio::test]
    async fn plugin_preset_crud() {
        let storage = test_storage().await;
        let mut preset = PluginPreset {
            id: String::new(),
            name: "BlogOnlyUrls".into(),
            base: "ExtractUrlsPlugin".into(),
            description: Some("only follow /blog links".into()),
            opts: json!({"pathnameRe": "^/blog/"}).as_object().cloned().unwrap(),
        };

        let id = storage.insert_plugin(&preset).await.expect("insert plugin");
        let found = storage.get_plugin(&id).await.unwrap().unwrap();
        assert_eq!(found.base, "ExtractUrlsPlugin");
        assert_eq!(found.opts["pathnameRe"], "^/blog/");

        preset.id = id.clone();
        preset.description = None;
        storage.update_plugin(&preset).await.expect("update plugin");
        let found = storage.get_plugin_by_name("BlogOnlyUrls").await.unwrap().unwrap();
        assert!(found.description.is_none());

        assert!(matches!(
            storage.insert_plugin(&preset).await,
            Err(SiteCrawlError::Conflict(_))
        ));

        assert_eq!(storage.list_plugins().await.unwrap().len(), 1);
        assert!(storage.delete_plugin(&id).await.unwrap());
        assert!(storage.get_plugin(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn crawl_run_lifecycle() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;

        assert!(storage.latest_crawl_run(&site.id).await.unwrap().is_none());

        let run_id = storage.insert_crawl_run(&site.id).await.expect("insert run");
        let run = storage.latest_crawl_run(&site.id).await.unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());

        assert_eq!(storage.close_open_runs(&site.id).await.unwrap(), 1);
        let run = storage.latest_crawl_run(&site.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Interrupted);

        let run_id = storage.insert_crawl_run(&site.id).await.unwrap();
        storage
            .finish_crawl_run(&run_id, RunStatus::Completed, r#"{"crawled": 3}"#)
            .await
            .expect("finish run");
        let run = storage.latest_crawl_run(&site.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.stats.unwrap()["crawled"], 3);
    }
}
