//! Plugin pipeline executor.
//!
//! Runs a site's plugins in order against one resource. Each plugin's partial
//! result is merged into the running result and into the working copy of the
//! resource, so later plugins see what earlier ones produced.

use reqwest::Client;
use sitecrawl_shared::{Resource, ResourceUpdate, Result, Site, SiteCrawlError};
use sitecrawl_storage::Storage;
use tracing::{debug, instrument, warn};

use crate::plugins::{Phase, Plugin, PluginContext, PluginOutput};

/// Outcome of one pipeline run.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// No resource was selected: the frontier has nothing eligible right now.
    Empty,
    /// A resource went through the pipeline.
    Processed {
        resource: Resource,
        update: ResourceUpdate,
        /// Whether a save plugin already persisted the outcome.
        committed: bool,
    },
}

/// An ordered, instantiated list of plugins.
pub struct Pipeline {
    plugins: Vec<Box<dyn Plugin>>,
}

impl Pipeline {
    pub fn new(plugins: Vec<Box<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Plugin names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Whether any plugin can persist an outcome itself.
    pub fn has_save_phase(&self) -> bool {
        self.plugins.iter().any(|p| p.phase() == Phase::Save)
    }

    /// Run every plugin once.
    ///
    /// On the first failing `apply` the run stops and partial results are
    /// dropped. A claimed resource stays claimed. Claim, dedup insert and
    /// storage errors are returned unchanged, anything else as
    /// [`SiteCrawlError::PluginApply`].
    #[instrument(skip_all, fields(site = %site.name))]
    pub async fn run(&self, storage: &Storage, client: &Client, site: &Site) -> Result<PipelineOutcome> {
        let mut resource: Option<Resource> = None;
        let mut merged = ResourceUpdate::default();
        let mut committed = false;

        for plugin in &self.plugins {
            if !plugin.test(resource.as_ref()) {
                continue;
            }

            let output = {
                let ctx = PluginContext {
                    storage,
                    client,
                    merged: &merged,
                };
                plugin.apply(&ctx, site, resource.as_ref()).await
            };

            let output = output.map_err(|e| {
                warn!(plugin = plugin.name(), error = %e, "plugin failed");
                match e {
                    SiteCrawlError::Claim(_)
                    | SiteCrawlError::DedupInsert(_)
                    | SiteCrawlError::Storage(_)
                    | SiteCrawlError::PluginApply { .. } => e,
                    other => SiteCrawlError::plugin_apply(plugin.name(), other.to_string()),
                }
            })?;

            match output {
                PluginOutput::Selected(None) => {
                    debug!(plugin = plugin.name(), "nothing to select");
                    return Ok(PipelineOutcome::Empty);
                }
                PluginOutput::Selected(Some(selected)) => {
                    debug!(url = %selected.url, depth = selected.depth, "resource selected");
                    resource = Some(selected);
                }
                PluginOutput::Update(update) => {
                    if let Some(current) = resource.as_mut() {
                        current.absorb(&update);
                    }
                    merged.merge(update);
                }
                PluginOutput::Committed(stored) => {
                    committed = true;
                    if let Some(current) = resource.as_mut() {
                        current.crawled_at = stored.crawled_at;
                        current.crawl_in_progress = stored.crawl_in_progress;
                        current.claimed_at = stored.claimed_at;
                    }
                }
            }
        }

        Ok(match resource {
            Some(resource) => PipelineOutcome::Processed {
                resource,
                update: merged,
                committed,
            },
            None => PipelineOutcome::Empty,
        })
    }
}

/// Persist a pipeline outcome.
///
/// Discovered links are enqueued at `depth + 1` unless the resource sits at
/// the site's maximum depth, then the resource is marked crawled. If marking
/// fails the claim is released so the resource is offered again.
pub async fn commit_outcome(
    storage: &Storage,
    site: &Site,
    resource: &Resource,
    update: &ResourceUpdate,
) -> Result<Resource> {
    if !update.urls_to_add.is_empty() {
        if site.crawl_opts.expands_links_at(resource.depth) {
            let inserted = storage
                .enqueue(&site.id, &update.urls_to_add, resource.depth + 1)
                .await?;
            debug!(
                url = %resource.url,
                found = update.urls_to_add.len(),
                inserted,
                "links enqueued"
            );
        } else {
            debug!(url = %resource.url, depth = resource.depth, "max depth reached, links dropped");
        }
    }

    match storage.complete(resource, update).await {
        Ok(stored) => Ok(stored),
        Err(e) => {
            if let Err(reset) = storage.reset_interrupted(resource).await {
                warn!(url = %resource.url, error = %reset, "failed to release claim");
            }
            Err(e)
        }
    }
}
