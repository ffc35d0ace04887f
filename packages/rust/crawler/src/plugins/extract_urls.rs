//! Link discovery from fetched HTML pages.
//!
//! Collects `a[href]` (and optionally `img[src]`) targets, resolved against the
//! page URL, and keeps the http(s) links that pass the host and path filters.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value, json};
use sitecrawl_shared::{Resource, ResourceUpdate, Result, Site, SiteCrawlError};
use url::Url;

use super::{Phase, Plugin, PluginContext, PluginOutput, opt_bool, opt_str};

pub(super) fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sameHost": {
                "type": "boolean",
                "default": true,
                "description": "Only keep links on the resource's host"
            },
            "pathnameRe": {
                "type": "string",
                "subType": "regex",
                "default": "",
                "description": "Only keep links whose path matches, empty for all"
            },
            "includeImages": {
                "type": "boolean",
                "default": false,
                "description": "Also collect img[src] URLs"
            }
        }
    })
}

/// Collects outgoing links of an HTML resource into `urls_to_add`.
#[derive(Debug, Clone)]
pub struct ExtractUrlsPlugin {
    same_host: bool,
    pathname_re: Option<Regex>,
    include_images: bool,
}

impl ExtractUrlsPlugin {
    pub const NAME: &'static str = "ExtractUrlsPlugin";

    pub(super) fn from_opts(opts: &Map<String, Value>) -> Result<Self> {
        let pattern = opt_str(opts, "pathnameRe");
        let pathname_re = if pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(pattern)
                    .map_err(|e| SiteCrawlError::schema(Self::NAME, format!("pathnameRe: {e}")))?,
            )
        };
        Ok(Self {
            same_host: opt_bool(opts, "sameHost"),
            pathname_re,
            include_images: opt_bool(opts, "includeImages"),
        })
    }

    fn keep(&self, base: &Url, link: &Url) -> bool {
        if self.same_host && link.host_str() != base.host_str() {
            return false;
        }
        self.pathname_re
            .as_ref()
            .is_none_or(|re| re.is_match(link.path()))
    }
}

#[async_trait]
impl Plugin for ExtractUrlsPlugin {
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
        let base = Url::parse(&resource.url).map_err(|e| {
            SiteCrawlError::plugin_apply(Self::NAME, format!("{}: {e}", resource.url))
        })?;
        let body = resource.body.as_deref().unwrap_or_default();

        let mut urls = Vec::new();
        for link in extract_links(body, &base, self.include_images) {
            let Ok(parsed) = Url::parse(&link) else {
                continue;
            };
            if self.keep(&base, &parsed) && !urls.contains(&link) {
                urls.push(link);
            }
        }

        tracing::debug!(url = %resource.url, found = urls.len(), "links extracted");
        Ok(PluginOutput::Update(ResourceUpdate {
            urls_to_add: urls,
            ..Default::default()
        }))
    }
}

/// Extract link targets from an HTML document, resolved against `base_url`.
///
/// Fragments are stripped; only http(s) URLs are returned.
pub fn extract_links(html: &str, base_url: &Url, include_images: bool) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut sources = vec![("a[href]", "href")];
    if include_images {
        sources.push(("img[src]", "src"));
    }

    let mut links = Vec::new();
    for (css, attr) in sources {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        for el in doc.select(&selector) {
            let Some(href) = el.value().attr(attr).map(str::trim) else {
                continue;
            };
            // Skip anchors, javascript:, mailto:
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            if let Ok(mut resolved) = base_url.join(href) {
                if !matches!(resolved.scheme(), "http" | "https") {
                    continue;
                }
                resolved.set_fragment(None);
                links.push(resolved.to_string());
            }
        }
    }
    links
}
