//! CSS selector based text extraction.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{Map, Value, json};
use sitecrawl_shared::{Resource, ResourceUpdate, Result, Site, SiteCrawlError};

use super::{Phase, Plugin, PluginContext, PluginOutput, opt_str};

pub(super) fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "selectors": {
                "type": "string",
                "default": "title\nh1",
                "description": "CSS selectors, one per line",
                "ui": { "widget": "textarea" }
            }
        }
    })
}

/// Collects element texts of an HTML resource into `content[selector]`.
#[derive(Debug, Clone)]
pub struct ExtractHtmlContentPlugin {
    selectors: Vec<(String, Selector)>,
}

impl ExtractHtmlContentPlugin {
    pub const NAME: &'static str = "ExtractHtmlContentPlugin";

    pub(super) fn from_opts(opts: &Map<String, Value>) -> Result<Self> {
        let mut selectors = Vec::new();
        for line in opt_str(opts, "selectors").lines() {
            let css = line.trim();
            if css.is_empty() {
                continue;
            }
            let selector = Selector::parse(css).map_err(|e| {
                SiteCrawlError::schema(Self::NAME, format!("selector {css:?}: {e}"))
            })?;
            selectors.push((css.to_string(), selector));
        }
        Ok(Self { selectors })
    }

    fn extract(&self, html: &str) -> Map<String, Value> {
        let doc = Html::parse_document(html);
        let mut content = Map::new();
        for (css, selector) in &self.selectors {
            let texts: Vec<Value> = doc
                .select(selector)
                .map(|el| el.text().collect::<Vec<_>>().join(" "))
                .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|text| !text.is_empty())
                .map(Value::String)
                .collect();
            content.insert(css.clone(), Value::Array(texts));
        }
        content
    }
}

#[async_trait]
impl Plugin for ExtractHtmlContentPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> Phase {
        Phase::Process
    }

    fn test(&self, resource: Option<&Resource>) -> bool {
        resource.is_some_and(|r| r.body.is_some() && r.is_html())
    }

    async fn apply(
        &self,
        _ctx: &PluginContext<'_>,
        _site: &Site,
        resource: Option<&Resource>,
    ) -> Result<PluginOutput> {
        let resource = super::require_resource(Self::NAME, resource)?;
        let content = self.extract(resource.body.as_deref().unwrap_or_default());
        Ok(PluginOutput::Update(ResourceUpdate {
            content,
            ..Default::default()
        }))
    }
}
