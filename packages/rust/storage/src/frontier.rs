//! Frontier store: the per-site table of discovered resources.
//!
//! A URL is inserted only if the site's Bloom filter has not seen it, and the
//! filter bits are written back in the same transaction as the new rows.
//! Claims are taken inside an `IMMEDIATE` transaction, so one resource is
//! handed to at most one pipeline run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use sitecrawl_shared::{
    BloomFilter, Resource, ResourceFilter, ResourceUpdate, Result, SiteCrawlError, SiteId,
};
use tracing::{debug, instrument};

use crate::{Storage, db_err, from_json, to_json};

const RESOURCE_COLUMNS: &str = "id, site_id, url, depth, crawl_in_progress, crawled_at, \
     claimed_at, media_type, content_json, info_json, actions_json";

impl Storage {
    /// Insert every URL not yet seen by the site's dedup filter at `depth`.
    ///
    /// Returns the number of inserted resources. On failure nothing is applied,
    /// neither rows nor filter bits.
    #[instrument(skip(self, urls), fields(site_id = %site_id, urls = urls.len()))]
    pub async fn enqueue(&self, site_id: &SiteId, urls: &[String], depth: i64) -> Result<usize> {
        if urls.is_empty() {
            return Ok(0);
        }
        let (_guard, tx) = self
            .begin_write()
            .await
            .map_err(|e| SiteCrawlError::DedupInsert(e.to_string()))?;

        match enqueue_in(&tx, site_id, urls, depth).await {
            Ok(inserted) => {
                tx.commit()
                    .await
                    .map_err(|e| SiteCrawlError::DedupInsert(e.to_string()))?;
                debug!(inserted, "urls enqueued");
                Ok(inserted)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(match e {
                    SiteCrawlError::NotFound { .. } => e,
                    other => SiteCrawlError::DedupInsert(other.to_string()),
                })
            }
        }
    }

    /// Claim the next crawlable resource of a site.
    ///
    /// Never-crawled resources come first, in insertion order. When
    /// `frequency_hours` is a finite, non-negative number, resources crawled at
    /// least that long ago are eligible next. `None` means nothing is eligible now.
    #[instrument(skip(self), fields(site_id = %site_id))]
    pub async fn claim_next(
        &self,
        site_id: &SiteId,
        frequency_hours: Option<f64>,
    ) -> Result<Option<Resource>> {
        let (_guard, tx) = self
            .begin_write()
            .await
            .map_err(|e| SiteCrawlError::Claim(e.to_string()))?;

        match claim_in(&tx, site_id, frequency_hours).await {
            Ok(claimed) => {
                tx.commit()
                    .await
                    .map_err(|e| SiteCrawlError::Claim(e.to_string()))?;
                if let Some(resource) = &claimed {
                    debug!(url = %resource.url, depth = resource.depth, "resource claimed");
                }
                Ok(claimed)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(SiteCrawlError::Claim(e.to_string()))
            }
        }
    }

    /// Mark a claimed resource as crawled and merge the run's result into it.
    ///
    /// Content and info merge key-wise, new actions append, media type overwrites.
    pub async fn complete(&self, resource: &Resource, update: &ResourceUpdate) -> Result<Resource> {
        let (_guard, tx) = self.begin_write().await?;
        let outcome: Result<Resource> = async {
            let mut current = select_resource(&tx, "WHERE id = ?1", &resource.id)
                .await?
                .ok_or_else(|| SiteCrawlError::not_found("resource", resource.id.as_str()))?;

            // top-level keys of a new crawl replace those of an earlier one
            for (key, value) in &update.content {
                current.content.insert(key.clone(), value.clone());
            }
            for (key, value) in &update.info {
                current.info.insert(key.clone(), value.clone());
            }
            for action in &update.actions {
                if !current.actions.contains(action) {
                    current.actions.push(action.clone());
                }
            }
            if update.media_type.is_some() {
                current.media_type.clone_from(&update.media_type);
            }
            current.crawled_at = now_millis_dt();
            current.crawl_in_progress = false;
            current.claimed_at = None;

            tx.execute(
                "UPDATE resources
                 SET crawled_at = ?1, crawl_in_progress = 0, claimed_at = NULL,
                     media_type = ?2, content_json = ?3, info_json = ?4, actions_json = ?5
                 WHERE id = ?6",
                params![
                    current.crawled_at.timestamp_millis(),
                    current.media_type.as_deref(),
                    to_json(&current.content)?,
                    to_json(&current.info)?,
                    to_json(&current.actions)?,
                    current.id.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
            Ok(current)
        }
        .await;

        match outcome {
            Ok(done) => {
                tx.commit().await.map_err(db_err)?;
                debug!(url = %done.url, "resource completed");
                Ok(done)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }

    /// Release a stale claim, leaving `crawled_at` untouched so the resource is
    /// offered again. Returns `false` if the resource does not exist.
    pub async fn reset_interrupted(&self, resource: &Resource) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                "UPDATE resources SET crawl_in_progress = 0, claimed_at = NULL WHERE id = ?1",
                params![resource.id.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    /// Release every claim of a site taken at least `older_than` ago.
    pub async fn reset_stale_claims(&self, site_id: &SiteId, older_than: Duration) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let age = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let threshold = Utc::now().timestamp_millis().saturating_sub(age);
        self.conn
            .execute(
                "UPDATE resources SET crawl_in_progress = 0, claimed_at = NULL
                 WHERE site_id = ?1 AND crawl_in_progress = 1
                   AND (claimed_at IS NULL OR claimed_at <= ?2)",
                params![site_id.to_string(), threshold],
            )
            .await
            .map_err(db_err)
    }

    /// Get a resource by ID.
    pub async fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        select_resource(&self.conn, "WHERE id = ?1", id).await
    }

    /// Get a site's resource by URL.
    pub async fn get_resource_by_url(&self, site_id: &SiteId, url: &str) -> Result<Option<Resource>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RESOURCE_COLUMNS} FROM resources WHERE site_id = ?1 AND url = ?2 LIMIT 1"
                ),
                params![site_id.to_string(), url],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_resource(&row)?)),
            None => Ok(None),
        }
    }

    /// List a site's resources in discovery order.
    pub async fn list_resources(
        &self,
        site_id: &SiteId,
        filter: ResourceFilter,
    ) -> Result<Vec<Resource>> {
        let condition = match filter {
            ResourceFilter::All => "",
            ResourceFilter::Crawled => "AND crawled_at > 0",
            ResourceFilter::NotCrawled => "AND crawled_at = 0",
        };
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RESOURCE_COLUMNS} FROM resources WHERE site_id = ?1 {condition} ORDER BY rowid"
                ),
                params![site_id.to_string()],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_resource(&row)?);
        }
        Ok(results)
    }

    /// Number of resources discovered for a site.
    pub async fn count_resources(&self, site_id: &SiteId) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM resources WHERE site_id = ?1", site_id)
            .await
    }

    /// Number of resources crawled at least once.
    pub async fn count_crawled(&self, site_id: &SiteId) -> Result<u64> {
        self.count(
            "SELECT COUNT(*) FROM resources WHERE site_id = ?1 AND crawled_at > 0",
            site_id,
        )
        .await
    }

    async fn count(&self, sql: &str, site_id: &SiteId) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, params![site_id.to_string()])
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)? as u64),
            None => Ok(0),
        }
    }
}

/// Enqueue inside an open transaction. Shared with site creation.
pub(crate) async fn enqueue_in(
    conn: &Connection,
    site_id: &SiteId,
    urls: &[String],
    depth: i64,
) -> Result<usize> {
    let mut filter = {
        let mut rows = conn
            .query(
                "SELECT bloom_m, bloom_k, bloom_bits FROM sites WHERE id = ?1",
                params![site_id.to_string()],
            )
            .await
            .map_err(db_err)?;
        let row = rows
            .next()
            .await
            .map_err(db_err)?
            .ok_or_else(|| SiteCrawlError::not_found("site", site_id.to_string()))?;
        let m: i64 = row.get(0).map_err(db_err)?;
        let k: i64 = row.get(1).map_err(db_err)?;
        let bits: Vec<u8> = row.get(2).map_err(db_err)?;
        BloomFilter::from_parts(m as u64, k as u32, &bits)?
    };

    let mut inserted = 0;
    for url in urls {
        if filter.test(url) {
            continue;
        }
        let resource = Resource::new(site_id.clone(), url.as_str(), depth);
        conn.execute(
            "INSERT INTO resources (id, site_id, url, depth) VALUES (?1, ?2, ?3, ?4)",
            params![
                resource.id.as_str(),
                site_id.to_string(),
                resource.url.as_str(),
                depth
            ],
        )
        .await
        .map_err(db_err)?;
        filter.add(url);
        inserted += 1;
    }

    if inserted > 0 {
        conn.execute(
            "UPDATE sites SET bloom_bits = ?1 WHERE id = ?2",
            params![filter.to_bytes(), site_id.to_string()],
        )
        .await
        .map_err(db_err)?;
    }
    Ok(inserted)
}

async fn claim_in(
    conn: &Connection,
    site_id: &SiteId,
    frequency_hours: Option<f64>,
) -> Result<Option<Resource>> {
    let site = site_id.to_string();
    let mut candidate = select_resource(
        conn,
        "WHERE site_id = ?1 AND crawl_in_progress = 0 AND crawled_at = 0 ORDER BY rowid LIMIT 1",
        &site,
    )
    .await?;

    if candidate.is_none() {
        if let Some(hours) = frequency_hours.filter(|h| h.is_finite() && *h >= 0.0) {
            let threshold = Utc::now().timestamp_millis() - (hours * 3_600_000.0) as i64;
            let mut rows = conn
                .query(
                    &format!(
                        "SELECT {RESOURCE_COLUMNS} FROM resources
                         WHERE site_id = ?1 AND crawl_in_progress = 0
                           AND crawled_at > 0 AND crawled_at <= ?2
                         ORDER BY crawled_at, rowid LIMIT 1"
                    ),
                    params![site.as_str(), threshold],
                )
                .await
                .map_err(db_err)?;
            candidate = match rows.next().await.map_err(db_err)? {
                Some(row) => Some(row_to_resource(&row)?),
                None => None,
            };
        }
    }

    let Some(mut resource) = candidate else {
        return Ok(None);
    };

    let claimed_at = now_millis_dt();
    conn.execute(
        "UPDATE resources SET crawl_in_progress = 1, claimed_at = ?1 WHERE id = ?2",
        params![claimed_at.timestamp_millis(), resource.id.as_str()],
    )
    .await
    .map_err(db_err)?;

    resource.crawl_in_progress = true;
    resource.claimed_at = Some(claimed_at);
    Ok(Some(resource))
}

async fn select_resource(conn: &Connection, clause: &str, key: &str) -> Result<Option<Resource>> {
    let mut rows = conn
        .query(
            &format!("SELECT {RESOURCE_COLUMNS} FROM resources {clause}"),
            params![key],
        )
        .await
        .map_err(db_err)?;

    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(Some(row_to_resource(&row)?)),
        None => Ok(None),
    }
}

/// Convert a database row to a [`Resource`].
fn row_to_resource(row: &libsql::Row) -> Result<Resource> {
    let site_id: String = row.get(1).map_err(db_err)?;
    Ok(Resource {
        id: row.get::<String>(0).map_err(db_err)?,
        site_id: site_id
            .parse()
            .map_err(|e| SiteCrawlError::Storage(format!("invalid site id {site_id}: {e}")))?,
        url: row.get::<String>(2).map_err(db_err)?,
        depth: row.get::<i64>(3).map_err(db_err)?,
        crawl_in_progress: row.get::<i64>(4).map_err(db_err)? != 0,
        crawled_at: millis_to_dt(row.get::<i64>(5).map_err(db_err)?)?,
        claimed_at: match row.get::<i64>(6).ok() {
            Some(ms) => Some(millis_to_dt(ms)?),
            None => None,
        },
        media_type: row.get::<String>(7).ok(),
        content: from_json(&row.get::<String>(8).map_err(db_err)?)?,
        info: from_json(&row.get::<String>(9).map_err(db_err)?)?,
        actions: from_json(&row.get::<String>(10).map_err(db_err)?)?,
        body: None,
        urls_to_add: Vec::new(),
    })
}

fn millis_to_dt(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| SiteCrawlError::Storage(format!("timestamp out of range: {ms}")))
}

// Millisecond precision, matching what the database stores.
fn now_millis_dt() -> DateTime<Utc> {
    let ms = Utc::now().timestamp_millis();
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;
    use sitecrawl_shared::EPOCH0;

    use super::*;
    use crate::tests::{test_site, test_storage};

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn enqueue_twice_keeps_one_row() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;

        let first = storage.enqueue(&site.id, &urls(&["https://x/a"]), 1).await.unwrap();
        let second = storage.enqueue(&site.id, &urls(&["https://x/a"]), 1).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);

        let rows: Vec<_> = storage
            .list_resources(&site.id, ResourceFilter::All)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url == "https://x/a")
            .collect();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn enqueue_dedups_within_one_call() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;

        let inserted = storage
            .enqueue(&site.id, &urls(&["https://x/a", "https://x/a", "https://x/"]), 1)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(storage.count_resources(&site.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn enqueue_persists_filter_bits() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        storage.enqueue(&site.id, &urls(&["https://x/b"]), 1).await.unwrap();

        let reloaded = storage.get_site(&site.id).await.unwrap().unwrap();
        assert!(reloaded.dedup.test("https://x/b"));
        assert!(!site.dedup.test("https://x/b"));
    }

    #[tokio::test]
    async fn enqueue_unknown_site_is_not_found() {
        let storage = test_storage().await;
        let result = storage.enqueue(&SiteId::new(), &urls(&["https://x/a"]), 0).await;
        assert!(matches!(result, Err(SiteCrawlError::NotFound { .. })));
    }

    #[tokio::test]
    async fn failed_enqueue_applies_nothing() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        storage
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON resources
                 WHEN NEW.url = 'https://x/bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .await
            .unwrap();

        let batch = urls(&["https://x/good", "https://x/bad"]);
        let err = storage.enqueue(&site.id, &batch, 1).await.unwrap_err();
        assert!(matches!(err, SiteCrawlError::DedupInsert(_)), "{err}");
        assert_eq!(storage.count_resources(&site.id).await.unwrap(), 1);

        let reloaded = storage.get_site(&site.id).await.unwrap().unwrap();
        assert!(!reloaded.dedup.test("https://x/good"));
        assert_eq!(reloaded.dedup, site.dedup);

        storage.conn.execute_batch("DROP TRIGGER reject_bad;").await.unwrap();
        let inserted = storage.enqueue(&site.id, &batch, 1).await.unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(storage.count_resources(&site.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn claims_are_exclusive() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        storage
            .enqueue(&site.id, &urls(&["https://x/a", "https://x/b"]), 1)
            .await
            .unwrap();

        let mut seen = HashSet::new();
        while let Some(resource) = storage.claim_next(&site.id, None).await.unwrap() {
            assert!(resource.crawl_in_progress);
            assert!(seen.insert(resource.id.clone()), "claimed twice: {}", resource.url);
        }
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_claims_never_overlap() {
        let storage = std::sync::Arc::new(test_storage().await);
        let site = test_site(&storage, "x", "https://x/").await;
        let more: Vec<String> = (0..9).map(|i| format!("https://x/{i}")).collect();
        storage.enqueue(&site.id, &more, 1).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let storage = storage.clone();
            let site_id = site.id.clone();
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(r) = storage.claim_next(&site_id, None).await.unwrap() {
                    mine.push(r.id);
                }
                mine
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[tokio::test]
    async fn claim_follows_discovery_order() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        storage.enqueue(&site.id, &urls(&["https://x/a"]), 1).await.unwrap();
        storage.enqueue(&site.id, &urls(&["https://x/b"]), 2).await.unwrap();

        let order: Vec<i64> = {
            let mut v = Vec::new();
            while let Some(r) = storage.claim_next(&site.id, None).await.unwrap() {
                v.push(r.depth);
            }
            v
        };
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn complete_merges_result() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        let claimed = storage.claim_next(&site.id, None).await.unwrap().unwrap();

        let update = ResourceUpdate {
            content: json!({"h1": ["Welcome"]}).as_object().cloned().unwrap(),
            info: json!({"statusCode": 200}).as_object().cloned().unwrap(),
            actions: vec!["fetched".into()],
            media_type: Some("text/html".into()),
            ..Default::default()
        };
        let done = storage.complete(&claimed, &update).await.unwrap();
        assert!(done.is_crawled());
        assert!(!done.crawl_in_progress);
        assert!(done.claimed_at.is_none());

        let stored = storage.get_resource(&claimed.id).await.unwrap().unwrap();
        assert_eq!(stored.content["h1"], json!(["Welcome"]));
        assert_eq!(stored.info["statusCode"], 200);
        assert_eq!(stored.actions, vec!["fetched"]);
        assert_eq!(stored.media_type.as_deref(), Some("text/html"));
        assert_eq!(storage.count_crawled(&site.id).await.unwrap(), 1);

        assert!(storage.claim_next(&site.id, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recrawl_replaces_content_keys() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        let first = ResourceUpdate {
            content: json!({"h1": ["Old"], "title": ["T"]}).as_object().cloned().unwrap(),
            ..Default::default()
        };
        let claimed = storage.claim_next(&site.id, None).await.unwrap().unwrap();
        storage.complete(&claimed, &first).await.unwrap();

        let second = ResourceUpdate {
            content: json!({"h1": ["New"]}).as_object().cloned().unwrap(),
            ..Default::default()
        };
        let again = storage.claim_next(&site.id, Some(0.0)).await.unwrap().unwrap();
        let done = storage.complete(&again, &second).await.unwrap();
        assert_eq!(done.content["h1"], json!(["New"]));
        assert_eq!(done.content["title"], json!(["T"]));
    }

    #[tokio::test]
    async fn recrawl_window() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        let claimed = storage.claim_next(&site.id, None).await.unwrap().unwrap();
        storage.complete(&claimed, &ResourceUpdate::default()).await.unwrap();

        // never re-crawl, or window not yet open
        assert!(storage.claim_next(&site.id, None).await.unwrap().is_none());
        assert!(storage.claim_next(&site.id, Some(1.0)).await.unwrap().is_none());
        assert!(storage.claim_next(&site.id, Some(f64::INFINITY)).await.unwrap().is_none());

        // zero-hour frequency makes every crawled resource eligible again
        let again = storage.claim_next(&site.id, Some(0.0)).await.unwrap().unwrap();
        assert_eq!(again.id, claimed.id);
        assert!(again.is_crawled());
    }

    #[tokio::test]
    async fn reset_interrupted_reoffers_resource() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        let claimed = storage.claim_next(&site.id, None).await.unwrap().unwrap();
        assert!(storage.claim_next(&site.id, None).await.unwrap().is_none());

        assert!(storage.reset_interrupted(&claimed).await.unwrap());
        let stored = storage.get_resource(&claimed.id).await.unwrap().unwrap();
        assert!(!stored.crawl_in_progress);
        assert_eq!(stored.crawled_at, EPOCH0);

        let reclaimed = storage.claim_next(&site.id, None).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, claimed.id);
    }

    #[tokio::test]
    async fn stale_claims_respect_age() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        storage.claim_next(&site.id, None).await.unwrap().unwrap();

        let fresh = storage
            .reset_stale_claims(&site.id, Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(fresh, 0);

        let huge = storage
            .reset_stale_claims(&site.id, Duration::MAX)
            .await
            .unwrap();
        assert_eq!(huge, 0);

        let stale = storage
            .reset_stale_claims(&site.id, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(stale, 1);
        assert!(storage.claim_next(&site.id, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_filters() {
        let storage = test_storage().await;
        let site = test_site(&storage, "x", "https://x/").await;
        storage.enqueue(&site.id, &urls(&["https://x/a"]), 1).await.unwrap();
        let claimed = storage.claim_next(&site.id, None).await.unwrap().unwrap();
        storage.complete(&claimed, &ResourceUpdate::default()).await.unwrap();

        let crawled = storage
            .list_resources(&site.id, ResourceFilter::Crawled)
            .await
            .unwrap();
        let pending = storage
            .list_resources(&site.id, ResourceFilter::NotCrawled)
            .await
            .unwrap();
        assert_eq!(crawled.len(), 1);
        assert_eq!(crawled[0].url, "https://x/");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://x/a");

        let by_url = storage
            .get_resource_by_url(&site.id, "https://x/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_url.depth, 1);
    }
}
