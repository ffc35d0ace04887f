//! Application context shared by the crawl controller and the request API.
//!
//! One [`AppContext`] is built at startup and shared by `Arc`. It owns the
//! storage handle, the plugin registry, the HTTP client and the set of sites
//! currently being crawled in this process.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use sitecrawl_crawler::{Pipeline, Plugin, PluginRegistry, build_client};
use sitecrawl_shared::{
    AppConfig, BloomFilter, CrawlOpts, PluginDefinition, PluginPreset, Result, Site,
    SiteCrawlError, SiteId,
};
use sitecrawl_storage::Storage;
use tracing::{info, instrument};
use url::Url;

/// Request to create a site.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSite {
    pub name: String,
    pub url: String,
    /// Defaults to the registry's default pipeline.
    #[serde(default)]
    pub plugin_definitions: Option<Vec<PluginDefinition>>,
    /// Defaults to the `[defaults]` config section.
    #[serde(default)]
    pub crawl_opts: Option<CrawlOpts>,
    /// Dedup filter capacity, defaults to `[dedup] max_entries`.
    #[serde(default)]
    pub max_entries: Option<u64>,
    /// Dedup false positive probability, defaults to `[dedup] probability`.
    #[serde(default)]
    pub probability: Option<f64>,
}

/// Partial update of a site. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteChanges {
    pub name: Option<String>,
    pub url: Option<String>,
    pub plugin_definitions: Option<Vec<PluginDefinition>>,
    pub crawl_opts: Option<CrawlOpts>,
}

/// Shared application state.
pub struct AppContext {
    storage: Storage,
    registry: PluginRegistry,
    client: Client,
    config: AppConfig,
    active: Arc<Mutex<HashSet<SiteId>>>,
}

impl AppContext {
    /// Open the configured database and build the context with built-in plugins.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let storage = Storage::open(&config.db_path()?).await?;
        Self::new(storage, config, PluginRegistry::new())
    }

    /// Build a context over an open storage and a custom registry.
    pub fn new(storage: Storage, config: AppConfig, registry: PluginRegistry) -> Result<Self> {
        let client = build_client(&config.fetch)?;
        Ok(Self {
            storage,
            registry,
            client,
            config,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Single-flight crawl tracking
    // -----------------------------------------------------------------------

    /// Mark a site as being crawled. The mark is removed when the guard drops.
    pub fn begin_crawl(&self, site_id: &SiteId) -> Result<CrawlGuard> {
        if !lock(&self.active).insert(site_id.clone()) {
            return Err(SiteCrawlError::AlreadyCrawling(site_id.to_string()));
        }
        Ok(CrawlGuard {
            active: Arc::clone(&self.active),
            site_id: site_id.clone(),
        })
    }

    pub fn is_crawling(&self, site_id: &SiteId) -> bool {
        lock(&self.active).contains(site_id)
    }

    // -----------------------------------------------------------------------
    // Plugin resolution
    // -----------------------------------------------------------------------

    /// Resolve a definition to a live plugin.
    ///
    /// Built-in names win. Any other name is looked up as a stored preset,
    /// whose options are overlaid by the definition's own options.
    pub async fn resolve_plugin(&self, def: &PluginDefinition) -> Result<Box<dyn Plugin>> {
        if self.registry.contains(&def.name) {
            return self.registry.instantiate(&def.name, &def.opts);
        }
        let preset = self
            .storage
            .get_plugin_by_name(&def.name)
            .await?
            .ok_or_else(|| SiteCrawlError::schema(def.name.as_str(), "no such plugin"))?;

        let mut opts = preset.opts.clone();
        overlay(&mut opts, &def.opts);
        self.registry.instantiate(&preset.base, &opts)
    }

    /// Instantiate every definition, in order.
    pub async fn build_pipeline(&self, defs: &[PluginDefinition]) -> Result<Pipeline> {
        let mut plugins = Vec::with_capacity(defs.len());
        for def in defs {
            plugins.push(self.resolve_plugin(def).await?);
        }
        Ok(Pipeline::new(plugins))
    }

    // -----------------------------------------------------------------------
    // Sites
    // -----------------------------------------------------------------------

    /// Validate and create a site, seeding its frontier with the site URL.
    #[instrument(skip_all, fields(name = %new.name))]
    pub async fn create_site(&self, new: NewSite) -> Result<Site> {
        let name = validate_name(&new.name)?;
        let url = normalize_seed(&new.url)?;
        let defs = new
            .plugin_definitions
            .unwrap_or_else(|| self.registry.default_definitions());
        self.build_pipeline(&defs).await?;

        let crawl_opts = new
            .crawl_opts
            .unwrap_or_else(|| CrawlOpts::from(&self.config));
        let dedup = BloomFilter::with_capacity(
            new.max_entries.unwrap_or(self.config.dedup.max_entries),
            new.probability.unwrap_or(self.config.dedup.probability),
        )?;

        self.storage
            .create_site(name, &url, &defs, crawl_opts, dedup)
            .await
    }

    /// Apply a partial update. A changed URL is enqueued as a new seed.
    pub async fn update_site(&self, id: &SiteId, changes: SiteChanges) -> Result<Site> {
        let mut site = self.get_site(id).await?;
        if let Some(name) = &changes.name {
            site.name = validate_name(name)?.to_string();
        }
        let mut new_seed = None;
        if let Some(url) = &changes.url {
            let url = normalize_seed(url)?;
            if url != site.url {
                new_seed = Some(url.clone());
                site.url = url;
            }
        }
        if let Some(defs) = changes.plugin_definitions {
            self.build_pipeline(&defs).await?;
            site.plugin_definitions = defs;
        }
        if let Some(opts) = changes.crawl_opts {
            site.crawl_opts = opts;
        }

        self.storage.update_site(&site).await?;
        if let Some(seed) = new_seed {
            self.storage.enqueue(&site.id, &[seed], 0).await?;
        }
        info!(site_id = %site.id, "site updated");
        self.get_site(id).await
    }

    /// Get a site by ID or fail with `NotFound`.
    pub async fn get_site(&self, id: &SiteId) -> Result<Site> {
        self.storage
            .get_site(id)
            .await?
            .ok_or_else(|| SiteCrawlError::not_found("site", id.to_string()))
    }

    /// Find a site by ID or by name.
    pub async fn find_site(&self, key: &str) -> Result<Site> {
        if let Ok(id) = key.parse::<SiteId>() {
            if let Some(site) = self.storage.get_site(&id).await? {
                return Ok(site);
            }
        }
        self.storage
            .get_site_by_name(key)
            .await?
            .ok_or_else(|| SiteCrawlError::not_found("site", key))
    }

    // -----------------------------------------------------------------------
    // Plugin presets
    // -----------------------------------------------------------------------

    /// Validate and store a preset. Returns it with its new ID.
    pub async fn create_preset(&self, mut preset: PluginPreset) -> Result<PluginPreset> {
        self.validate_preset(&preset)?;
        preset.id = self.storage.insert_plugin(&preset).await?;
        info!(name = %preset.name, base = %preset.base, "plugin preset created");
        Ok(preset)
    }

    /// Validate and replace a stored preset.
    pub async fn update_preset(&self, preset: PluginPreset) -> Result<PluginPreset> {
        self.validate_preset(&preset)?;
        self.storage.update_plugin(&preset).await?;
        Ok(preset)
    }

    fn validate_preset(&self, preset: &PluginPreset) -> Result<()> {
        validate_name(&preset.name)?;
        if self.registry.contains(&preset.name) {
            return Err(SiteCrawlError::Conflict(format!(
                "{} is a built-in plugin name",
                preset.name
            )));
        }
        if !self.registry.contains(&preset.base) {
            return Err(SiteCrawlError::validation(format!(
                "unknown base plugin {}",
                preset.base
            )));
        }
        self.registry.instantiate(&preset.base, &preset.opts).map(|_| ())
    }
}

/// Removes a site from the active set when dropped.
pub struct CrawlGuard {
    active: Arc<Mutex<HashSet<SiteId>>>,
    site_id: SiteId,
}

impl Drop for CrawlGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.site_id);
    }
}

fn lock(active: &Mutex<HashSet<SiteId>>) -> MutexGuard<'_, HashSet<SiteId>> {
    // the set stays consistent even if a holder panicked
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn overlay(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        target.insert(key.clone(), value.clone());
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SiteCrawlError::validation("name must not be empty"));
    }
    Ok(trimmed)
}

/// Parse a seed URL, keep only http(s) and drop the fragment.
pub fn normalize_seed(raw: &str) -> Result<String> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| SiteCrawlError::validation(format!("invalid URL '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(SiteCrawlError::validation(format!(
            "unsupported URL scheme '{}'",
            url.scheme()
        )));
    }
    url.set_fragment(None);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::test_context;

    fn new_site(name: &str, url: &str) -> NewSite {
        NewSite {
            name: name.into(),
            url: url.into(),
            plugin_definitions: None,
            crawl_opts: None,
            max_entries: None,
            probability: None,
        }
    }

    #[test]
    fn seed_normalization() {
        assert_eq!(
            normalize_seed(" https://Docs.Example.com#top ").unwrap(),
            "https://docs.example.com/"
        );
        assert!(normalize_seed("ftp://example.com/").is_err());
        assert!(normalize_seed("not a url").is_err());
    }

    #[tokio::test]
    async fn create_site_uses_defaults() {
        let ctx = test_context().await;
        let site = ctx.create_site(new_site("docs", "https://docs.example.com")).await.unwrap();
        assert_eq!(site.url, "https://docs.example.com/");
        assert_eq!(site.plugin_definitions.len(), 5);
        assert_eq!(site.crawl_opts, CrawlOpts::from(ctx.config()));
        assert_eq!(site.dedup.hash_count(), 7);
    }

    #[tokio::test]
    async fn create_site_rejects_bad_plugins() {
        let ctx = test_context().await;
        let mut new = new_site("docs", "https://docs.example.com/");
        new.plugin_definitions = Some(vec![PluginDefinition {
            name: "ExtractUrlsPlugin".into(),
            opts: json!({ "pathnameRe": "(" }).as_object().cloned().unwrap(),
        }]);
        let err = ctx.create_site(new).await.unwrap_err();
        assert!(matches!(err, SiteCrawlError::SchemaInstantiation { .. }));
        assert!(ctx.storage().list_sites().await.unwrap().is_empty());

        let mut new = new_site("docs", "https://docs.example.com/");
        new.max_entries = Some(0);
        assert!(matches!(
            ctx.create_site(new).await,
            Err(SiteCrawlError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn presets_resolve_with_overlay() {
        let ctx = test_context().await;
        ctx.create_preset(PluginPreset {
            id: String::new(),
            name: "BlogUrls".into(),
            base: "ExtractUrlsPlugin".into(),
            description: None,
            opts: json!({ "pathnameRe": "^/blog/", "sameHost": false })
                .as_object()
                .cloned()
                .unwrap(),
        })
        .await
        .unwrap();

        let plugin = ctx
            .resolve_plugin(&PluginDefinition::named("BlogUrls"))
            .await
            .unwrap();
        assert_eq!(plugin.name(), "ExtractUrlsPlugin");

        let bad = PluginDefinition {
            name: "BlogUrls".into(),
            opts: json!({ "sameHost": "no" }).as_object().cloned().unwrap(),
        };
        assert!(ctx.resolve_plugin(&bad).await.is_err());
        assert!(
            ctx.resolve_plugin(&PluginDefinition::named("Missing"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn preset_validation() {
        let ctx = test_context().await;
        let preset = |name: &str, base: &str| PluginPreset {
            id: String::new(),
            name: name.into(),
            base: base.into(),
            description: None,
            opts: Map::new(),
        };
        assert!(matches!(
            ctx.create_preset(preset("FetchPlugin", "FetchPlugin")).await,
            Err(SiteCrawlError::Conflict(_))
        ));
        assert!(matches!(
            ctx.create_preset(preset("Mine", "NoSuchBase")).await,
            Err(SiteCrawlError::Validation { .. })
        ));
        assert!(ctx.create_preset(preset("Mine", "FetchPlugin")).await.is_ok());
    }

    #[tokio::test]
    async fn single_flight_guard() {
        let ctx = test_context().await;
        let id = SiteId::new();
        let guard = ctx.begin_crawl(&id).unwrap();
        assert!(ctx.is_crawling(&id));
        assert!(matches!(
            ctx.begin_crawl(&id),
            Err(SiteCrawlError::AlreadyCrawling(_))
        ));
        drop(guard);
        assert!(!ctx.is_crawling(&id));
        assert!(ctx.begin_crawl(&id).is_ok());
    }

    #[tokio::test]
    async fn update_site_reseeds_new_url() {
        let ctx = test_context().await;
        let site = ctx.create_site(new_site("docs", "https://a.example.com/")).await.unwrap();
        let updated = ctx
            .update_site(
                &site.id,
                SiteChanges {
                    url: Some("https://b.example.com/".into()),
                    crawl_opts: Some(CrawlOpts {
                        delay_ms: 0,
                        max_depth: 1,
                        max_resources: 10,
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.url, "https://b.example.com/");
        assert_eq!(updated.crawl_opts.max_depth, 1);
        assert!(updated.dedup.test("https://b.example.com/"));
        assert_eq!(ctx.storage().count_resources(&site.id).await.unwrap(), 2);

        let found = ctx.find_site("docs").await.unwrap();
        assert_eq!(found.id, site.id);
    }
}
