//! Core domain types: sites, resources, plugin definitions and presets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::bloom::BloomFilter;

/// Timestamp of a resource that was never successfully crawled.
pub const EPOCH0: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

// ---------------------------------------------------------------------------
// SiteId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for site identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub Uuid);

impl SiteId {
    /// Generate a new time-sortable site identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SiteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SiteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Site
// ---------------------------------------------------------------------------

/// Per-site crawl limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrawlOpts {
    /// Milliseconds to wait between crawled resources.
    pub delay_ms: u64,
    /// Depth at which link expansion stops; negative means unlimited.
    pub max_depth: i64,
    /// Crawled resource budget; negative means unlimited.
    pub max_resources: i64,
}

impl CrawlOpts {
    /// Whether links found on a resource at `depth` may be enqueued.
    pub fn expands_links_at(&self, depth: i64) -> bool {
        self.max_depth < 0 || depth < self.max_depth
    }

    /// Whether `crawled` resources exhaust the budget.
    pub fn resource_limit_reached(&self, crawled: u64) -> bool {
        self.max_resources >= 0 && crawled >= self.max_resources as u64
    }
}

impl Default for CrawlOpts {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            max_depth: -1,
            max_resources: -1,
        }
    }
}

/// Declarative reference to a plugin, resolved when a pipeline is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDefinition {
    /// Built-in plugin name or stored preset name.
    pub name: String,
    /// Options overlaid on the plugin's schema defaults.
    #[serde(default)]
    pub opts: Map<String, Value>,
}

impl PluginDefinition {
    /// A definition with no explicit options.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            opts: Map::new(),
        }
    }
}

/// A crawl target: seed URL, plugin pipeline, limits and dedup state.
#[derive(Debug, Clone)]
pub struct Site {
    pub id: SiteId,
    /// Unique human-readable name.
    pub name: String,
    /// Seed URL.
    pub url: String,
    pub plugin_definitions: Vec<PluginDefinition>,
    pub crawl_opts: CrawlOpts,
    /// Snapshot of the dedup filter as of the last load.
    pub dedup: BloomFilter,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A discovered URL of a site and its crawl state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub site_id: SiteId,
    pub url: String,
    /// Shortest discovery distance from the seed, fixed at insertion.
    pub depth: i64,
    pub crawl_in_progress: bool,
    /// [`EPOCH0`] until the first successful crawl.
    pub crawled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub content: Map<String, Value>,
    #[serde(default)]
    pub info: Map<String, Value>,
    #[serde(default)]
    pub actions: Vec<String>,

    /// Fetched payload, only present during a pipeline run.
    #[serde(skip)]
    pub body: Option<String>,
    /// Links discovered during a pipeline run.
    #[serde(skip)]
    pub urls_to_add: Vec<String>,
}

impl Resource {
    /// A fresh, never-crawled resource.
    pub fn new(site_id: SiteId, url: impl Into<String>, depth: i64) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            site_id,
            url: url.into(),
            depth,
            crawl_in_progress: false,
            crawled_at: EPOCH0,
            claimed_at: None,
            media_type: None,
            content: Map::new(),
            info: Map::new(),
            actions: Vec::new(),
            body: None,
            urls_to_add: Vec::new(),
        }
    }

    /// Whether the resource was successfully crawled at least once.
    pub fn is_crawled(&self) -> bool {
        self.crawled_at != EPOCH0
    }

    /// Whether the fetched media type is HTML.
    pub fn is_html(&self) -> bool {
        self.media_type
            .as_deref()
            .is_some_and(|m| m.starts_with("text/html") || m.starts_with("application/xhtml"))
    }

    /// Fold a plugin's partial result into this working copy.
    pub fn absorb(&mut self, update: &ResourceUpdate) {
        merge_map(&mut self.content, &update.content);
        merge_map(&mut self.info, &update.info);
        append_unique(&mut self.actions, &update.actions);
        if update.media_type.is_some() {
            self.media_type.clone_from(&update.media_type);
        }
        if update.body.is_some() {
            self.body.clone_from(&update.body);
        }
        append_unique(&mut self.urls_to_add, &update.urls_to_add);
    }
}

/// Which subset of a site's resources to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceFilter {
    #[default]
    All,
    Crawled,
    NotCrawled,
}

impl std::str::FromStr for ResourceFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "crawled" => Ok(Self::Crawled),
            "not-crawled" => Ok(Self::NotCrawled),
            other => Err(format!(
                "unknown resource filter '{other}': expected all, crawled or not-crawled"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ResourceUpdate
// ---------------------------------------------------------------------------

/// Partial result returned by a plugin and merged across a pipeline run.
///
/// Objects merge key-wise, arrays append, scalars overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdate {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub content: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub info: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip)]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls_to_add: Vec<String>,
}

impl ResourceUpdate {
    /// Merge a later partial result into this one.
    pub fn merge(&mut self, other: ResourceUpdate) {
        merge_map(&mut self.content, &other.content);
        merge_map(&mut self.info, &other.info);
        append_unique(&mut self.actions, &other.actions);
        if other.media_type.is_some() {
            self.media_type = other.media_type;
        }
        if other.body.is_some() {
            self.body = other.body;
        }
        append_unique(&mut self.urls_to_add, &other.urls_to_add);
    }
}

/// Key-wise merge: nested objects recurse, arrays append, anything else overwrites.
pub fn merge_map(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, incoming) in source {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(inc)) => merge_map(existing, inc),
            (Some(Value::Array(existing)), Value::Array(inc)) => {
                existing.extend(inc.iter().cloned())
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

fn append_unique(target: &mut Vec<String>, source: &[String]) {
    for item in source {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// PluginPreset
// ---------------------------------------------------------------------------

/// A user-defined plugin: a named option overlay on a built-in plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginPreset {
    #[serde(default)]
    pub id: String,
    /// Unique name, usable in a site's plugin definitions.
    pub name: String,
    /// Built-in plugin this preset configures.
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub opts: Map<String, Value>,
}
