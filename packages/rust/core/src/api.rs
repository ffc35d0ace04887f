//! Transport-agnostic request/response surface.
//!
//! Requests are keyed by method and path with optional JSON bodies; responses
//! carry a status code and a JSON body. Errors are `{"error": message}`.
//!
//! | method | path |
//! |---|---|
//! | GET, POST | `/sites` |
//! | GET, PUT, DELETE | `/site/{id}` |
//! | GET | `/site/{id}/resources?type=all\|crawled\|not-crawled` |
//! | GET, POST | `/site/{id}/crawl` |
//! | GET, POST | `/plugins` |
//! | GET, PUT, DELETE | `/plugin/{id}` |
//! | GET | `/plugindefs/available`, `/plugindefs/default` |

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sitecrawl_shared::{
    CrawlOpts, PluginDefinition, PluginPreset, ResourceFilter, Result, Site, SiteCrawlError,
    SiteId,
};
use tracing::{debug, warn};

use crate::context::{AppContext, NewSite, SiteChanges};
use crate::controller::{self, CrawlState};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl FromStr for Method {
    type Err = SiteCrawlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(SiteCrawlError::validation(format!("unknown method {other}"))),
        }
    }
}

/// An incoming request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path with an optional query string.
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A response: status code and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::error(500, e.to_string()),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }

    fn from_error(err: &SiteCrawlError) -> Self {
        let status = match err {
            SiteCrawlError::Validation { .. }
            | SiteCrawlError::SchemaInstantiation { .. }
            | SiteCrawlError::Parse { .. }
            | SiteCrawlError::Config { .. } => 400,
            SiteCrawlError::NotFound { .. } => 404,
            SiteCrawlError::Conflict(_) | SiteCrawlError::AlreadyCrawling(_) => 409,
            _ => 500,
        };
        if status == 500 {
            warn!(error = %err, "request failed");
        }
        Self::error(status, err.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// JSON view of a site.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteView<'a> {
    id: &'a SiteId,
    name: &'a str,
    url: &'a str,
    plugin_definitions: &'a [PluginDefinition],
    crawl_opts: &'a CrawlOpts,
    created_at: DateTime<Utc>,
    dedup: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<Value>,
}

impl<'a> SiteView<'a> {
    fn new(site: &'a Site) -> Self {
        Self {
            id: &site.id,
            name: &site.name,
            url: &site.url,
            plugin_definitions: &site.plugin_definitions,
            crawl_opts: &site.crawl_opts,
            created_at: site.created_at,
            dedup: json!({
                "bits": site.dedup.bit_count(),
                "hashes": site.dedup.hash_count(),
            }),
            stats: None,
        }
    }
}

/// Route a request.
pub async fn handle(ctx: &Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    debug!(method = ?req.method, path = %req.path, "handling request");
    match route(ctx, &req).await {
        Ok(response) => response,
        Err(e) => ApiResponse::from_error(&e),
    }
}

async fn route(ctx: &Arc<AppContext>, req: &ApiRequest) -> Result<ApiResponse> {
    let (path, query) = req.path.split_once('?').unwrap_or((req.path.as_str(), ""));
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method;

    use Method::*;
    match (segments.as_slice(), method) {
        (["sites"], Get) => list_sites(ctx).await,
        (["sites"], Post) => create_site(ctx, parse_body(req)?).await,
        (["site", id], Get) => get_site(ctx, &parse_id(id)?).await,
        (["site", id], Put) => update_site(ctx, &parse_id(id)?, parse_body(req)?).await,
        (["site", id], Delete) => delete_site(ctx, &parse_id(id)?).await,
        (["site", id, "resources"], Get) => list_resources(ctx, &parse_id(id)?, query).await,
        (["site", id, "crawl"], Get) => get_crawl(ctx, &parse_id(id)?).await,
        (["site", id, "crawl"], Post) => start_crawl(ctx, parse_id(id)?).await,
        (["plugins"], Get) => Ok(ApiResponse::json(200, &ctx.storage().list_plugins().await?)),
        (["plugins"], Post) => {
            let preset = ctx.create_preset(parse_body(req)?).await?;
            Ok(ApiResponse::json(201, &preset))
        }
        (["plugin", id], Get) => {
            let preset = ctx
                .storage()
                .get_plugin(id)
                .await?
                .ok_or_else(|| SiteCrawlError::not_found("plugin", *id))?;
            Ok(ApiResponse::json(200, &preset))
        }
        (["plugin", id], Put) => {
            let mut preset: PluginPreset = parse_body(req)?;
            preset.id = id.to_string();
            Ok(ApiResponse::json(200, &ctx.update_preset(preset).await?))
        }
        (["plugin", id], Delete) => {
            if !ctx.storage().delete_plugin(id).await? {
                return Err(SiteCrawlError::not_found("plugin", *id));
            }
            Ok(ApiResponse::json(200, &json!({ "deleted": id })))
        }
        (["plugindefs", "available"], Get) => {
            Ok(ApiResponse::json(200, &ctx.registry().available()))
        }
        (["plugindefs", "default"], Get) => {
            Ok(ApiResponse::json(200, &ctx.registry().default_definitions()))
        }
        (known, _) if is_known_route(known) => Ok(ApiResponse::error(
            405,
            format!("method {method:?} not allowed on {path}"),
        )),
        _ => Err(SiteCrawlError::not_found("route", path)),
    }
}

fn is_known_route(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["sites"]
            | ["site", _]
            | ["site", _, "resources" | "crawl"]
            | ["plugins"]
            | ["plugin", _]
            | ["plugindefs", "available" | "default"]
    )
}

async fn list_sites(ctx: &AppContext) -> Result<ApiResponse> {
    let sites = ctx.storage().list_sites().await?;
    let views: Vec<SiteView<'_>> = sites.iter().map(SiteView::new).collect();
    Ok(ApiResponse::json(200, &views))
}

async fn create_site(ctx: &AppContext, new: NewSite) -> Result<ApiResponse> {
    let site = ctx.create_site(new).await?;
    Ok(ApiResponse::json(201, &SiteView::new(&site)))
}

async fn get_site(ctx: &AppContext, id: &SiteId) -> Result<ApiResponse> {
    let site = ctx.get_site(id).await?;
    let storage = ctx.storage();
    let mut view = SiteView::new(&site);
    view.stats = Some(json!({
        "resources": storage.count_resources(id).await?,
        "crawled": storage.count_crawled(id).await?,
        "state": controller::crawl_state(ctx, id).await?,
    }));
    Ok(ApiResponse::json(200, &view))
}

async fn update_site(ctx: &AppContext, id: &SiteId, changes: SiteChanges) -> Result<ApiResponse> {
    if ctx.is_crawling(id) {
        return Err(SiteCrawlError::AlreadyCrawling(id.to_string()));
    }
    let site = ctx.update_site(id, changes).await?;
    Ok(ApiResponse::json(200, &SiteView::new(&site)))
}

async fn delete_site(ctx: &AppContext, id: &SiteId) -> Result<ApiResponse> {
    // hold the crawl mark so no crawl starts while rows are removed
    let _guard = ctx.begin_crawl(id)?;
    if !ctx.storage().delete_site(id).await? {
        return Err(SiteCrawlError::not_found("site", id.to_string()));
    }
    Ok(ApiResponse::json(200, &json!({ "deleted": id })))
}

async fn list_resources(ctx: &AppContext, id: &SiteId, query: &str) -> Result<ApiResponse> {
    ctx.get_site(id).await?;
    let filter = match query_param(query, "type") {
        Some(raw) => ResourceFilter::from_str(raw).map_err(SiteCrawlError::validation)?,
        None => ResourceFilter::All,
    };
    let resources = ctx.storage().list_resources(id, filter).await?;
    Ok(ApiResponse::json(200, &resources))
}

async fn get_crawl(ctx: &AppContext, id: &SiteId) -> Result<ApiResponse> {
    ctx.get_site(id).await?;
    let state: CrawlState = controller::crawl_state(ctx, id).await?;
    let last_run = ctx.storage().latest_crawl_run(id).await?;
    Ok(ApiResponse::json(
        200,
        &json!({ "siteId": id, "state": state, "lastRun": last_run }),
    ))
}

async fn start_crawl(ctx: &Arc<AppContext>, id: SiteId) -> Result<ApiResponse> {
    ctx.get_site(&id).await?;
    // the task runs on its own; its outcome is logged and recorded as a crawl run
    drop(controller::spawn_crawl(Arc::clone(ctx), id.clone())?);
    Ok(ApiResponse::json(
        202,
        &json!({ "siteId": id, "state": CrawlState::Crawling }),
    ))
}

fn parse_id(raw: &str) -> Result<SiteId> {
    raw.parse()
        .map_err(|e| SiteCrawlError::validation(format!("invalid site id '{raw}': {e}")))
}

fn parse_body<T: DeserializeOwned>(req: &ApiRequest) -> Result<T> {
    let body = req
        .body
        .clone()
        .ok_or_else(|| SiteCrawlError::validation("request body required"))?;
    serde_json::from_value(body)
        .map_err(|e| SiteCrawlError::validation(format!("invalid request body: {e}")))
}

fn query_param<'q>(query: &'q str, key: &str) -> Option<&'q str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}
