//! Crawl orchestration and the request API for SiteCrawl.
//!
//! This crate ties storage and the plugin pipeline together:
//! - [`context`]: the shared [`AppContext`] (storage, registry, client, active crawls)
//! - [`controller`]: per-site crawl loops with resume and single-flight guarantees
//! - [`api`]: a transport-agnostic request/response surface over the above

pub mod api;
pub mod context;
pub mod controller;

pub use api::{ApiRequest, ApiResponse, Method, handle};
pub use context::{AppContext, CrawlGuard, NewSite, SiteChanges, normalize_seed};
pub use controller::{
    CrawlProgress, CrawlState, CrawlSummary, SilentProgress, StopReason, crawl_site, crawl_state,
    spawn_crawl,
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use sitecrawl_crawler::{Phase, Plugin, PluginContext, PluginOutput, PluginRegistry};
    use sitecrawl_shared::{AppConfig, Resource, Result, Site, SiteCrawlError};
    use sitecrawl_storage::Storage;
    use uuid::Uuid;

    use crate::context::AppContext;

    pub(crate) async fn context_with(registry: PluginRegistry) -> Arc<AppContext> {
        let tmp = std::env::temp_dir().join(format!("sc_core_{}.db", Uuid::now_v7()));
        let mut config = AppConfig::default();
        config.defaults.db_path = tmp.to_string_lossy().into_owned();
        config.defaults.delay_ms = 0;
        let storage = Storage::open(&tmp).await.expect("open test db");
        Arc::new(AppContext::new(storage, config, registry).expect("build context"))
    }

    /// Context over a fresh temp database with the built-in plugins.
    pub(crate) async fn test_context() -> Arc<AppContext> {
        context_with(PluginRegistry::new()).await
    }

    /// Like [`test_context`], plus an `AlwaysFails` process plugin.
    pub(crate) async fn failing_context() -> Arc<AppContext> {
        let mut registry = PluginRegistry::new();
        registry.register(
            "AlwaysFails",
            Phase::Process,
            "fails on every resource",
            json!({ "type": "object", "properties": {} }),
            |_| Ok(Box::new(AlwaysFails)),
        );
        context_with(registry).await
    }

    struct AlwaysFails;

    #[async_trait]
    impl Plugin for AlwaysFails {
        fn name(&self) -> &str {
            "AlwaysFails"
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
            Err(SiteCrawlError::parse("boom"))
        }
    }
}
