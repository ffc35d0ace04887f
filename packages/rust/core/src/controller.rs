//! Site crawl controller.
//!
//! Drives one site's crawl: claim a resource through the pipeline, persist the
//! outcome, wait the politeness delay, repeat until the frontier is exhausted
//! or the resource budget is spent.
//!
//! ```text
//! Idle ──start──▶ Crawling ──frontier empty / limit──▶ Idle
//!                    │
//!                    └──error / process stop──▶ Interrupted ──start──▶ Crawling
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sitecrawl_crawler::{PipelineOutcome, commit_outcome};
use sitecrawl_shared::{Resource, Result, Site, SiteCrawlError, SiteId};
use sitecrawl_storage::RunStatus;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::context::{AppContext, CrawlGuard};

/// Crawl state of a site as seen from this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    Idle,
    Crawling,
    Interrupted,
}

/// Why a crawl loop ended normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    FrontierExhausted,
    MaxResources,
}

/// Summary of a finished crawl.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary {
    pub site_id: SiteId,
    /// Resources crawled during this run.
    pub crawled: u64,
    /// Resources ever crawled for the site.
    pub crawled_total: u64,
    /// Resources in the frontier.
    pub discovered: u64,
    pub stop_reason: StopReason,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Progress callbacks for reporting crawl status.
pub trait CrawlProgress: Send + Sync {
    /// Called once the pipeline is built and stale claims are recovered.
    fn started(&self, site: &Site);
    /// Called after each persisted resource.
    fn resource_crawled(&self, resource: &Resource, crawled: u64);
    /// Called when the loop ends normally.
    fn finished(&self, summary: &CrawlSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl CrawlProgress for SilentProgress {
    fn started(&self, _site: &Site) {}
    fn resource_crawled(&self, _resource: &Resource, _crawled: u64) {}
    fn finished(&self, _summary: &CrawlSummary) {}
}

/// Crawl a site to completion in the current task.
///
/// Fails with `AlreadyCrawling` if this process is already crawling the site.
pub async fn crawl_site(
    ctx: &AppContext,
    site_id: &SiteId,
    progress: &dyn CrawlProgress,
) -> Result<CrawlSummary> {
    let _guard = ctx.begin_crawl(site_id)?;
    run(ctx, site_id, progress).await
}

/// Start a crawl in a background task.
///
/// The single-flight check happens before spawning, so `AlreadyCrawling` is
/// returned to the caller directly.
pub fn spawn_crawl(
    ctx: Arc<AppContext>,
    site_id: SiteId,
) -> Result<JoinHandle<Result<CrawlSummary>>> {
    let guard: CrawlGuard = ctx.begin_crawl(&site_id)?;
    Ok(tokio::spawn(async move {
        let _guard = guard;
        let result = run(&ctx, &site_id, &SilentProgress).await;
        match &result {
            Ok(summary) => info!(
                site_id = %site_id,
                crawled = summary.crawled,
                "background crawl finished"
            ),
            Err(e) => error!(site_id = %site_id, error = %e, "background crawl failed"),
        }
        result
    }))
}

/// Current crawl state of a site.
pub async fn crawl_state(ctx: &AppContext, site_id: &SiteId) -> Result<CrawlState> {
    if ctx.is_crawling(site_id) {
        return Ok(CrawlState::Crawling);
    }
    Ok(match ctx.storage().latest_crawl_run(site_id).await? {
        // a run still open here was left by a process that stopped
        Some(run) if run.status != RunStatus::Completed => CrawlState::Interrupted,
        _ => CrawlState::Idle,
    })
}

#[instrument(skip_all, fields(site_id = %site_id))]
async fn run(ctx: &AppContext, site_id: &SiteId, progress: &dyn CrawlProgress) -> Result<CrawlSummary> {
    let start = Instant::now();
    let storage = ctx.storage();
    let site = ctx.get_site(site_id).await?;

    // Build before claiming anything so bad options never strand a claim.
    let pipeline = ctx.build_pipeline(&site.plugin_definitions).await?;

    let reopened = storage.close_open_runs(site_id).await?;
    let stale = Duration::from_secs(ctx.config().recovery.stale_claim_secs);
    let released = storage.reset_stale_claims(site_id, stale).await?;
    if reopened > 0 || released > 0 {
        info!(reopened, released, "resuming interrupted crawl");
    }

    let run_id = storage.insert_crawl_run(site_id).await?;
    info!(
        name = %site.name,
        url = %site.url,
        plugins = ?pipeline.names(),
        delay_ms = site.crawl_opts.delay_ms,
        max_depth = site.crawl_opts.max_depth,
        max_resources = site.crawl_opts.max_resources,
        "starting crawl"
    );
    progress.started(&site);

    let delay = Duration::from_millis(site.crawl_opts.delay_ms);
    let claim_retries = ctx.config().recovery.claim_retries;
    let mut claim_failures = 0u32;
    let mut crawled = 0u64;

    let outcome: Result<StopReason> = async {
        loop {
            let crawled_total = storage.count_crawled(site_id).await?;
            if site
                .crawl_opts
                .resource_limit_reached(crawled_total.max(crawled))
            {
                return Ok(StopReason::MaxResources);
            }

            match pipeline.run(storage, ctx.client(), &site).await {
                Ok(PipelineOutcome::Empty) => return Ok(StopReason::FrontierExhausted),
                Ok(PipelineOutcome::Processed {
                    resource,
                    update,
                    committed,
                }) => {
                    claim_failures = 0;
                    let stored = if committed {
                        resource
                    } else {
                        commit_outcome(storage, &site, &resource, &update).await?
                    };
                    crawled += 1;
                    debug!(url = %stored.url, depth = stored.depth, crawled, "resource crawled");
                    progress.resource_crawled(&stored, crawled);
                }
                Err(SiteCrawlError::Claim(message)) if claim_failures < claim_retries => {
                    claim_failures += 1;
                    warn!(attempt = claim_failures, %message, "claim failed, retrying");
                }
                Err(e) => return Err(e),
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
    .await;

    let summary_stats = |reason: Option<StopReason>| {
        serde_json::json!({ "crawled": crawled, "stopReason": reason }).to_string()
    };

    match outcome {
        Ok(stop_reason) => {
            storage
                .finish_crawl_run(&run_id, RunStatus::Completed, &summary_stats(Some(stop_reason)))
                .await?;
            let summary = CrawlSummary {
                site_id: site_id.clone(),
                crawled,
                crawled_total: storage.count_crawled(site_id).await?,
                discovered: storage.count_resources(site_id).await?,
                stop_reason,
                elapsed: start.elapsed(),
            };
            info!(
                crawled = summary.crawled,
                discovered = summary.discovered,
                stop_reason = ?summary.stop_reason,
                elapsed_ms = summary.elapsed.as_millis(),
                "crawl complete"
            );
            progress.finished(&summary);
            Ok(summary)
        }
        Err(e) => {
            error!(error = %e, crawled, "crawl interrupted");
            if let Err(close) = storage
                .finish_crawl_run(&run_id, RunStatus::Interrupted, &summary_stats(None))
                .await
            {
                warn!(error = %close, "failed to close crawl run");
            }
            Err(e)
        }
    }
}
