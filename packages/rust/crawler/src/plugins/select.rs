//! Frontier selection: claims the next resource of a site.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sitecrawl_shared::{Resource, Result, Site};

use super::{Phase, Plugin, PluginContext, PluginOutput, opt_f64};

pub(super) fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "frequency": {
                "type": "number",
                "default": -1,
                "description": "Hours after which a crawled resource is crawled again, -1 for never",
                "ui": { "label": "Re-crawl frequency (hours)" }
            }
        }
    })
}

/// Claims the next resource of the site from the frontier.
#[derive(Debug, Clone)]
pub struct SelectResourcePlugin {
    /// Re-crawl window in hours. `None` disables re-crawling.
    frequency: Option<f64>,
}

impl SelectResourcePlugin {
    pub const NAME: &'static str = "SelectResourcePlugin";

    pub(super) fn from_opts(opts: &Map<String, Value>) -> Self {
        Self {
            frequency: opt_f64(opts, "frequency").filter(|h| *h >= 0.0),
        }
    }
}

#[async_trait]
impl Plugin for SelectResourcePlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> Phase {
        Phase::Select
    }

    fn test(&self, resource: Option<&Resource>) -> bool {
        resource.is_none()
    }

    async fn apply(
        &self,
        ctx: &PluginContext<'_>,
        site: &Site,
        _resource: Option<&Resource>,
    ) -> Result<PluginOutput> {
        let claimed = ctx.storage.claim_next(&site.id, self.frequency).await?;
        Ok(PluginOutput::Selected(claimed))
    }
}
