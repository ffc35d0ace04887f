//! Save phase: persists the merged outcome of a pipeline run.

use async_trait::async_trait;
use serde_json::{Value, json};
use sitecrawl_shared::{Resource, Result, Site};

use super::{Phase, Plugin, PluginContext, PluginOutput};
use crate::pipeline::commit_outcome;

pub(super) fn schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Persists the run: enqueues discovered links one level deeper, then marks
/// the resource crawled with the merged result.
#[derive(Debug, Clone, Copy)]
pub struct UpsertResourcePlugin;

impl UpsertResourcePlugin {
    pub const NAME: &'static str = "UpsertResourcePlugin";
}

#[async_trait]
impl Plugin for UpsertResourcePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> Phase {
        Phase::Save
    }

    fn test(&self, resource: Option<&Resource>) -> bool {
        resource.is_some()
    }

    async fn apply(
        &self,
        ctx: &PluginContext<'_>,
        site: &Site,
        resource: Option<&Resource>,
    ) -> Result<PluginOutput> {
        let resource = super::require_resource(Self::NAME, resource)?;
        let stored = commit_outcome(ctx.storage, site, resource, ctx.merged).await?;
        Ok(PluginOutput::Committed(stored))
    }
}
