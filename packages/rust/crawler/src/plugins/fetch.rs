//! HTTP fetching with SSRF protection.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, LOCATION, USER_AGENT};
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use sitecrawl_shared::{FetchConfig, Resource, ResourceUpdate, Result, Site, SiteCrawlError};
use tracing::{debug, warn};
use url::Url;

use super::{Phase, Plugin, PluginContext, PluginOutput, opt_bool, opt_f64, opt_str};

/// Redirect hops followed per fetch.
const MAX_REDIRECTS: usize = 5;

pub(super) fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "allowPrivateHosts": {
                "type": "boolean",
                "default": false,
                "description": "Allow loopback and private network addresses"
            },
            "timeoutSecs": {
                "type": "integer",
                "default": 0,
                "description": "Per-request timeout, 0 for the client default"
            },
            "userAgent": {
                "type": "string",
                "default": "",
                "description": "User-Agent override, empty for the client default"
            }
        }
    })
}

/// Build the shared HTTP client.
///
/// The client does not follow redirects. [`FetchPlugin`] follows them itself
/// so every hop passes its host check.
pub fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| SiteCrawlError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetches the current resource and records status, hash, media type and body.
///
/// Non-2xx responses are recorded, not raised. Transport failures are errors.
#[derive(Debug, Clone, Default)]
pub struct FetchPlugin {
    allow_private_hosts: bool,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl FetchPlugin {
    pub const NAME: &'static str = "FetchPlugin";

    pub(super) fn from_opts(opts: &Map<String, Value>) -> Self {
        let user_agent = opt_str(opts, "userAgent");
        Self {
            allow_private_hosts: opt_bool(opts, "allowPrivateHosts"),
            timeout: opt_f64(opts, "timeoutSecs")
                .filter(|s| *s > 0.0)
                .map(Duration::from_secs_f64),
            user_agent: (!user_agent.is_empty()).then(|| user_agent.to_string()),
        }
    }
}

#[async_trait]
impl Plugin for FetchPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn phase(&self) -> Phase {
        Phase::Fetch
    }

    fn test(&self, resource: Option<&Resource>) -> bool {
        resource.is_some_and(|r| r.body.is_none())
    }

    async fn apply(
        &self,
        ctx: &PluginContext<'_>,
        _site: &Site,
        resource: Option<&Resource>,
    ) -> Result<PluginOutput> {
        let resource = super::require_resource(Self::NAME, resource)?;
        let url = Url::parse(&resource.url)
            .map_err(|e| SiteCrawlError::plugin_apply(Self::NAME, format!("{}: {e}", resource.url)))?;

        debug!(%url, depth = resource.depth, "fetching resource");
        let mut current = url;
        let mut hops = 0;
        let response = loop {
            if is_blocked_target(&current, self.allow_private_hosts) {
                warn!(url = %current, "SSRF protection: blocked");
                return Ok(PluginOutput::Update(blocked_update(resource, &current)));
            }

            let mut request = ctx.client.get(current.as_str());
            if let Some(timeout) = self.timeout {
                request = request.timeout(timeout);
            }
            if let Some(agent) = &self.user_agent {
                request = request.header(USER_AGENT, agent.as_str());
            }
            let response = request
                .send()
                .await
                .map_err(|e| SiteCrawlError::plugin_apply(Self::NAME, format!("{current}: {e}")))?;

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|_| response.status().is_redirection())
                .map(str::to_owned);
            let Some(location) = location else {
                break response;
            };
            if hops == MAX_REDIRECTS {
                return Err(SiteCrawlError::plugin_apply(
                    Self::NAME,
                    format!("{}: more than {MAX_REDIRECTS} redirects", resource.url),
                ));
            }
            let next = current.join(&location).map_err(|e| {
                SiteCrawlError::plugin_apply(Self::NAME, format!("{current}: bad redirect target: {e}"))
            })?;
            debug!(from = %current, to = %next, "following redirect");
            current = next;
            hops += 1;
        };
        let url = current;

        let status = response.status();
        let media_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());
        let final_url = response.url().to_string();

        let mut info = Map::new();
        info.insert("statusCode".into(), json!(status.as_u16()));
        if final_url != resource.url {
            info.insert("redirectedTo".into(), json!(final_url));
        }

        let mut update = ResourceUpdate {
            media_type,
            actions: vec!["fetch".into()],
            ..Default::default()
        };

        if status.is_success() {
            let body = response.text().await.map_err(|e| {
                SiteCrawlError::plugin_apply(Self::NAME, format!("{url}: body read failed: {e}"))
            })?;
            info.insert("contentHash".into(), json!(compute_hash(&body)));
            info.insert("contentLength".into(), json!(body.len()));
            update.body = Some(body);
        } else {
            warn!(%url, status = status.as_u16(), "non-success response");
        }

        update.info = info;
        Ok(PluginOutput::Update(update))
    }
}

/// Whether a fetch or redirect hop to `url` must not be requested.
///
/// Non-http schemes are always refused; private hosts only when not allowed.
fn is_blocked_target(url: &Url, allow_private_hosts: bool) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }
    !allow_private_hosts && is_ssrf_target(url)
}

fn blocked_update(resource: &Resource, target: &Url) -> ResourceUpdate {
    let mut info = Map::new();
    info.insert("blocked".into(), json!("private or non-http target"));
    if target.as_str() != resource.url {
        info.insert("redirectedTo".into(), json!(target.as_str()));
    }
    ResourceUpdate {
        info,
        ..Default::default()
    }
}

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Compute SHA-256 hash of content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_support::TestEnv;

    async fn fetch(plugin: &FetchPlugin, url: &str) -> Result<ResourceUpdate> {
        let env = TestEnv::new(url).await;
        let resource = Resource::new(env.site.id.clone(), url, 0);
        match plugin.apply(&env.ctx(), &env.site, Some(&resource)).await? {
            PluginOutput::Update(update) => Ok(update),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    fn local() -> FetchPlugin {
        FetchPlugin {
            allow_private_hosts: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_compute_hash() {
        let h1 = compute_hash("hello world");
        let h2 = compute_hash("hello world");
        let h3 = compute_hash("different content");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_ssrf_protection() {
        for blocked in [
            "file:///etc/passwd",
            "http://127.0.0.1/",
            "http://10.0.0.1/",
            "http://192.168.1.1/",
            "http://localhost:8080/",
            "http://[::1]/",
            "http://printer.local/",
        ] {
            assert!(is_ssrf_target(&Url::parse(blocked).unwrap()), "{blocked}");
        }
        assert!(!is_ssrf_target(&Url::parse("https://docs.example.com/").unwrap()));
        assert!(!is_ssrf_target(&Url::parse("http://93.184.216.34/").unwrap()));
    }

    #[tokio::test]
    async fn records_status_hash_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<h1>Hi</h1>"),
            )
            .mount(&server)
            .await;

        let update = fetch(&local(), &format!("{}/page", server.uri())).await.unwrap();
        assert_eq!(update.info["statusCode"], 200);
        assert_eq!(update.info["contentHash"], compute_hash("<h1>Hi</h1>"));
        assert_eq!(update.media_type.as_deref(), Some("text/html"));
        assert_eq!(update.body.as_deref(), Some("<h1>Hi</h1>"));
        assert_eq!(update.actions, vec!["fetch"]);
    }

    #[tokio::test]
    async fn non_success_is_recorded_not_raised() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let update = fetch(&local(), &format!("{}/missing", server.uri())).await.unwrap();
        assert_eq!(update.info["statusCode"], 404);
        assert!(update.body.is_none());
    }

    #[tokio::test]
    async fn sends_user_agent_override() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .and(header("user-agent", "TestBot/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let plugin = FetchPlugin {
            user_agent: Some("TestBot/1.0".into()),
            ..local()
        };
        let update = fetch(&plugin, &format!("{}/", server.uri())).await.unwrap();
        assert_eq!(update.info["statusCode"], 200);
    }

    #[tokio::test]
    async fn private_hosts_blocked_by_default() {
        let server = MockServer::start().await;
        let update = fetch(&FetchPlugin::default(), &server.uri()).await.unwrap();
        assert!(update.info.contains_key("blocked"));
        assert!(update.body.is_none());
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[test]
    fn every_hop_is_checked() {
        let private = Url::parse("http://10.0.0.1/admin").unwrap();
        let file = Url::parse("file:///etc/passwd").unwrap();
        let public = Url::parse("https://docs.example.com/").unwrap();
        assert!(is_blocked_target(&private, false));
        assert!(!is_blocked_target(&private, true));
        assert!(is_blocked_target(&file, true));
        assert!(!is_blocked_target(&public, false));
    }

    #[tokio::test]
    async fn follows_redirects_and_records_target() {
        let server = MockServer::start().await;
        Mock::given(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved here"))
            .mount(&server)
            .await;

        let update = fetch(&local(), &format!("{}/old", server.uri())).await.unwrap();
        assert_eq!(update.info["statusCode"], 200);
        assert_eq!(update.info["redirectedTo"], format!("{}/new", server.uri()));
        assert_eq!(update.body.as_deref(), Some("moved here"));
    }

    #[tokio::test]
    async fn redirect_to_refused_target_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(path("/escape"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "file:///etc/passwd"),
            )
            .mount(&server)
            .await;

        let update = fetch(&local(), &format!("{}/escape", server.uri())).await.unwrap();
        assert!(update.info.contains_key("blocked"));
        assert_eq!(update.info["redirectedTo"], "file:///etc/passwd");
        assert!(update.body.is_none());
    }

    #[tokio::test]
    async fn redirect_loops_are_cut_off() {
        let server = MockServer::start().await;
        Mock::given(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let err = fetch(&local(), &format!("{}/loop", server.uri())).await.unwrap_err();
        assert!(err.to_string().contains("redirects"), "{err}");
        assert_eq!(server.received_requests().await.unwrap().len(), MAX_REDIRECTS + 1);
    }

    #[tokio::test]
    async fn transport_failure_is_plugin_error() {
        // nothing listens on port 9 of the loopback interface
        let err = fetch(&local(), "http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, SiteCrawlError::PluginApply { .. }));
    }
}
