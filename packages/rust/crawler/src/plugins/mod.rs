//! Plugin trait, built-in plugins and the name-to-factory registry.
//!
//! A plugin is a named unit with a phase, a `test` predicate and an async
//! `apply`. Plugins run in the order a site lists them; phases only describe
//! what a plugin does. The registry resolves a [`PluginDefinition`] to a live
//! plugin by instantiating its options against the plugin's schema.

mod extract_content;
mod extract_urls;
mod fetch;
mod select;
mod upsert;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use sitecrawl_shared::{PluginDefinition, Resource, ResourceUpdate, Result, Site, SiteCrawlError};
use sitecrawl_storage::Storage;

use crate::schema;

pub use extract_content::ExtractHtmlContentPlugin;
pub use extract_urls::{ExtractUrlsPlugin, extract_links};
pub use fetch::{FetchPlugin, build_client, compute_hash, is_ssrf_target};
pub use select::SelectResourcePlugin;
pub use upsert::UpsertResourcePlugin;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// What a plugin contributes to a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Select,
    Fetch,
    Process,
    Save,
}

/// Result of one `apply` call.
#[derive(Debug)]
pub enum PluginOutput {
    /// A partial result to merge into the run.
    Update(ResourceUpdate),
    /// Outcome of a select plugin; `None` means nothing to crawl right now.
    Selected(Option<Resource>),
    /// The outcome was persisted; carries the stored resource.
    Committed(Resource),
}

/// Shared handles passed to every `apply` call.
pub struct PluginContext<'a> {
    pub storage: &'a Storage,
    pub client: &'a Client,
    /// Partial results merged so far in this run.
    pub merged: &'a ResourceUpdate,
}

/// A unit of crawl work.
///
/// Instances hold only their options and are reused across resources.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registered name, used in logs and errors.
    fn name(&self) -> &str;

    fn phase(&self) -> Phase;

    /// Whether `apply` should run for the current resource.
    ///
    /// `resource` is `None` until a select plugin has claimed one.
    fn test(&self, resource: Option<&Resource>) -> bool;

    async fn apply(
        &self,
        ctx: &PluginContext<'_>,
        site: &Site,
        resource: Option<&Resource>,
    ) -> Result<PluginOutput>;
}

/// Unwrap the current resource for plugins that need one.
pub(crate) fn require_resource<'r>(
    plugin: &str,
    resource: Option<&'r Resource>,
) -> Result<&'r Resource> {
    resource.ok_or_else(|| SiteCrawlError::plugin_apply(plugin, "no resource selected"))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Builds a plugin from its instantiated options.
pub type PluginFactory = Arc<dyn Fn(&Map<String, Value>) -> Result<Box<dyn Plugin>> + Send + Sync>;

/// A registered plugin kind.
#[derive(Clone)]
pub struct PluginSpec {
    pub name: String,
    pub phase: Phase,
    pub description: String,
    pub schema: Value,
    factory: PluginFactory,
}

/// Public description of a registered plugin kind.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub name: String,
    pub phase: Phase,
    pub description: String,
    pub opts_schema: Value,
}

/// Registered plugin kinds, in registration order.
#[derive(Clone)]
pub struct PluginRegistry {
    specs: Vec<PluginSpec>,
}

/// Names of the default pipeline, in order.
pub const DEFAULT_PIPELINE: [&str; 5] = [
    SelectResourcePlugin::NAME,
    FetchPlugin::NAME,
    ExtractUrlsPlugin::NAME,
    ExtractHtmlContentPlugin::NAME,
    UpsertResourcePlugin::NAME,
];

impl PluginRegistry {
    /// Create a registry holding all built-in plugins.
    pub fn new() -> Self {
        let mut registry = Self { specs: Vec::new() };
        registry.register(
            SelectResourcePlugin::NAME,
            Phase::Select,
            "Claims the next resource to crawl",
            select::schema(),
            |opts| Ok(Box::new(SelectResourcePlugin::from_opts(opts))),
        );
        registry.register(
            FetchPlugin::NAME,
            Phase::Fetch,
            "Fetches the resource over HTTP",
            fetch::schema(),
            |opts| Ok(Box::new(FetchPlugin::from_opts(opts))),
        );
        registry.register(
            ExtractUrlsPlugin::NAME,
            Phase::Process,
            "Collects links from HTML resources",
            extract_urls::schema(),
            |opts| Ok(Box::new(ExtractUrlsPlugin::from_opts(opts)?)),
        );
        registry.register(
            ExtractHtmlContentPlugin::NAME,
            Phase::Process,
            "Extracts element texts by CSS selector",
            extract_content::schema(),
            |opts| Ok(Box::new(ExtractHtmlContentPlugin::from_opts(opts)?)),
        );
        registry.register(
            UpsertResourcePlugin::NAME,
            Phase::Save,
            "Enqueues discovered links and marks the resource crawled",
            upsert::schema(),
            |_| Ok(Box::new(UpsertResourcePlugin)),
        );
        registry
    }

    /// Register a plugin kind. A kind with the same name is replaced.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        phase: Phase,
        description: impl Into<String>,
        schema: Value,
        factory: F,
    ) where
        F: Fn(&Map<String, Value>) -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        let spec = PluginSpec {
            name: name.into(),
            phase,
            description: description.into(),
            schema,
            factory: Arc::new(factory),
        };
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    /// Look up a registered kind by name.
    pub fn get(&self, name: &str) -> Option<&PluginSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Describe every registered kind.
    pub fn available(&self) -> Vec<PluginDescriptor> {
        self.specs
            .iter()
            .map(|s| PluginDescriptor {
                name: s.name.clone(),
                phase: s.phase,
                description: s.description.clone(),
                opts_schema: s.schema.clone(),
            })
            .collect()
    }

    /// Plugin definitions of the default pipeline, with default options.
    pub fn default_definitions(&self) -> Vec<PluginDefinition> {
        DEFAULT_PIPELINE
            .iter()
            .filter_map(|name| self.get(name))
            .map(|spec| PluginDefinition {
                name: spec.name.clone(),
                opts: schema::defaults(&spec.schema),
            })
            .collect()
    }

    /// Build a live plugin from a registered name and supplied options.
    pub fn instantiate(&self, name: &str, opts: &Map<String, Value>) -> Result<Box<dyn Plugin>> {
        let spec = self
            .get(name)
            .ok_or_else(|| SiteCrawlError::schema(name, "no such plugin"))?;
        let effective = schema::instantiate(&spec.name, &spec.schema, opts)?;
        (spec.factory)(&effective)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a string option, empty if absent.
pub(crate) fn opt_str<'a>(opts: &'a Map<String, Value>, key: &str) -> &'a str {
    opts.get(key).and_then(Value::as_str).unwrap_or("")
}

pub(crate) fn opt_bool(opts: &Map<String, Value>, key: &str) -> bool {
    opts.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn opt_f64(opts: &Map<String, Value>, key: &str) -> Option<f64> {
    opts.get(key).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builtins_are_available_in_order() {
        let registry = PluginRegistry::new();
        let names: Vec<String> = registry.available().into_iter().map(|d| d.name).collect();
        assert_eq!(names, DEFAULT_PIPELINE.map(String::from).to_vec());
        assert_eq!(registry.get(FetchPlugin::NAME).unwrap().phase, Phase::Fetch);
    }

    #[test]
    fn default_definitions_carry_schema_defaults() {
        let registry = PluginRegistry::new();
        let defs = registry.default_definitions();
        assert_eq!(defs.len(), 5);
        assert_eq!(defs[0].name, SelectResourcePlugin::NAME);
        assert_eq!(defs[0].opts["frequency"], -1);
        assert_eq!(defs[2].opts["sameHost"], true);
    }

    #[test]
    fn instantiate_builds_plugin() {
        let registry = PluginRegistry::new();
        let plugin = registry
            .instantiate(ExtractUrlsPlugin::NAME, &Map::new())
            .unwrap();
        assert_eq!(plugin.name(), ExtractUrlsPlugin::NAME);
        assert_eq!(plugin.phase(), Phase::Process);
    }

    #[test]
    fn instantiate_rejects_bad_options() {
        let registry = PluginRegistry::new();
        let opts = json!({ "pathnameRe": "([" }).as_object().cloned().unwrap();
        let err = registry
            .instantiate(ExtractUrlsPlugin::NAME, &opts)
            .err()
            .unwrap();
        assert!(matches!(err, SiteCrawlError::SchemaInstantiation { .. }));

        let opts = json!({ "selectors": "h1\ndiv[" }).as_object().cloned().unwrap();
        let err = registry
            .instantiate(ExtractHtmlContentPlugin::NAME, &opts)
            .err()
            .unwrap();
        assert!(matches!(err, SiteCrawlError::SchemaInstantiation { .. }));
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        let registry = PluginRegistry::new();
        let err = registry.instantiate("NoSuchPlugin", &Map::new()).err().unwrap();
        assert!(err.to_string().contains("NoSuchPlugin"));
    }

    struct Marker;

    #[async_trait]
    impl Plugin for Marker {
        fn name(&self) -> &str {
            "Marker"
        }
        fn phase(&self) -> Phase {
            Phase::Process
        }
        fn test(&self, resource: Option<&Resource>) -> bool {
            resource.is_some()
        }
        async fn apply(
            &self,
            _ctx: &PluginContext<'_>,
            _site: &Site,
            _resource: Option<&Resource>,
        ) -> Result<PluginOutput> {
            Ok(PluginOutput::Update(ResourceUpdate::default()))
        }
    }

    #[test]
    fn register_adds_custom_plugin() {
        let mut registry = PluginRegistry::new();
        registry.register(
            "Marker",
            Phase::Process,
            "test plugin",
            json!({ "type": "object", "properties": {} }),
            |_| Ok(Box::new(Marker)),
        );
        assert_eq!(registry.available().len(), 6);
        assert!(registry.instantiate("Marker", &Map::new()).is_ok());
    }
}
