//! CLI command definitions, routing, and tracing setup.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use sitecrawl_core::{
    ApiRequest, AppContext, CrawlProgress, CrawlSummary, Method, NewSite, crawl_site,
};
use sitecrawl_shared::{
    AppConfig, CrawlOpts, Resource, ResourceFilter, Site, init_config, load_config,
};
use tracing::info;
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteCrawl: polite, resumable, plugin-driven site crawling.
#[derive(Parser)]
#[command(
    name = "sitecrawl",
    version,
    about = "Crawl websites through configurable plugin pipelines.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path, overriding `[defaults] db_path`.
    #[arg(long, env = "SITECRAWL_DB", global = true)]
    pub db: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Manage sites.
    Site {
        #[command(subcommand)]
        action: SiteAction,
    },

    /// Crawl a site until its frontier is exhausted or a limit is hit.
    Crawl {
        /// Site ID or name.
        site: String,
    },

    /// List a site's resources as JSON.
    Resources {
        /// Site ID or name.
        site: String,

        /// all, crawled or not-crawled.
        #[arg(long = "type", default_value = "all")]
        filter: String,
    },

    /// Release every claim a stopped crawl left behind.
    Reset {
        /// Site ID or name.
        site: String,
    },

    /// Inspect plugins and presets.
    Plugins {
        #[command(subcommand)]
        action: PluginsAction,
    },

    /// Send one request through the request API and print the response.
    Request {
        /// GET, POST, PUT or DELETE.
        method: String,

        /// Path, e.g. /sites or /site/<id>/resources?type=crawled.
        path: String,

        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum SiteAction {
    /// Register a site and seed its frontier.
    Add {
        /// Seed URL.
        url: String,

        /// Unique site name (defaults to the URL hostname).
        #[arg(short, long)]
        name: Option<String>,

        /// Link expansion depth, negative for unlimited.
        #[arg(long, allow_hyphen_values = true)]
        max_depth: Option<i64>,

        /// Crawled resource budget, negative for unlimited.
        #[arg(long, allow_hyphen_values = true)]
        max_resources: Option<i64>,

        /// Milliseconds between two crawled resources.
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// List sites.
    List,
    /// Show one site with its frontier counts and crawl state.
    Show { site: String },
    /// Delete a site and all its resources.
    Delete { site: String },
}

#[derive(Subcommand)]
pub(crate) enum PluginsAction {
    /// Registered plugin kinds and their option schemas.
    Available,
    /// The default pipeline for new sites.
    Defaults,
    /// Stored plugin presets.
    List,
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitecrawl=info",
        1 => "sitecrawl=debug",
        _ => "sitecrawl=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let db = cli.db;
    match cli.command {
        // config commands never open the database
        Command::Config { action } => cmd_config(action, &resolve_config(db.as_deref())?),
        command => {
            let ctx = Arc::new(AppContext::open(resolve_config(db.as_deref())?).await?);
            dispatch(&ctx, command).await
        }
    }
}

async fn dispatch(ctx: &Arc<AppContext>, command: Command) -> Result<()> {
    match command {
        Command::Site { action } => match action {
            SiteAction::Add {
                url,
                name,
                max_depth,
                max_resources,
                delay_ms,
            } => cmd_site_add(ctx, &url, name, max_depth, max_resources, delay_ms).await,
            SiteAction::List => print_request(ctx, Method::Get, "/sites".into(), None).await,
            SiteAction::Show { site } => {
                let site = ctx.find_site(&site).await?;
                print_request(ctx, Method::Get, format!("/site/{}", site.id), None).await
            }
            SiteAction::Delete { site } => {
                let site = ctx.find_site(&site).await?;
                print_request(ctx, Method::Delete, format!("/site/{}", site.id), None).await
            }
        },
        Command::Crawl { site } => cmd_crawl(ctx, &site).await,
        Command::Resources { site, filter } => cmd_resources(ctx, &site, &filter).await,
        Command::Reset { site } => cmd_reset(ctx, &site).await,
        Command::Plugins { action } => {
            let path = match action {
                PluginsAction::Available => "/plugindefs/available",
                PluginsAction::Defaults => "/plugindefs/default",
                PluginsAction::List => "/plugins",
            };
            print_request(ctx, Method::Get, path.into(), None).await
        }
        Command::Request { method, path, body } => {
            let body = body
                .map(|raw| serde_json::from_str::<Value>(&raw))
                .transpose()
                .map_err(|e| eyre!("invalid --body JSON: {e}"))?;
            print_request(ctx, method.parse()?, path, body).await
        }
        Command::Config { action } => cmd_config(action, ctx.config()),
    }
}

fn resolve_config(db: Option<&str>) -> Result<AppConfig> {
    let mut config = load_config()?;
    if let Some(db) = db {
        config.defaults.db_path = db.to_string();
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_site_add(
    ctx: &AppContext,
    url: &str,
    name: Option<String>,
    max_depth: Option<i64>,
    max_resources: Option<i64>,
    delay_ms: Option<u64>,
) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let name = name.unwrap_or_else(|| parsed.host_str().unwrap_or("site").to_string());

    let mut crawl_opts = CrawlOpts::from(ctx.config());
    if let Some(depth) = max_depth {
        crawl_opts.max_depth = depth;
    }
    if let Some(limit) = max_resources {
        crawl_opts.max_resources = limit;
    }
    if let Some(delay) = delay_ms {
        crawl_opts.delay_ms = delay;
    }

    let site = ctx
        .create_site(NewSite {
            name,
            url: url.to_string(),
            plugin_definitions: None,
            crawl_opts: Some(crawl_opts),
            max_entries: None,
            probability: None,
        })
        .await?;

    println!();
    println!("  Site registered.");
    println!("  ID:    {}", site.id);
    println!("  Name:  {}", site.name);
    println!("  Seed:  {}", site.url);
    println!();
    Ok(())
}

async fn cmd_crawl(ctx: &AppContext, key: &str) -> Result<()> {
    let site = ctx.find_site(key).await?;
    info!(site = %site.name, "crawling site");

    let reporter = CliProgress::new();
    let summary = crawl_site(ctx, &site.id, &reporter).await;
    reporter.spinner.finish_and_clear();
    let summary = summary?;

    println!();
    println!("  Crawl finished: {}", site.name);
    println!("  Crawled:    {}", summary.crawled);
    println!("  Total:      {}", summary.crawled_total);
    println!("  Discovered: {}", summary.discovered);
    println!("  Stopped:    {:?}", summary.stop_reason);
    println!("  Time:       {:.1}s", summary.elapsed.as_secs_f64());
    println!();
    Ok(())
}

async fn cmd_resources(ctx: &AppContext, key: &str, filter: &str) -> Result<()> {
    let site = ctx.find_site(key).await?;
    let filter: ResourceFilter = filter.parse().map_err(|e: String| eyre!(e))?;
    let resources = ctx.storage().list_resources(&site.id, filter).await?;
    println!("{}", serde_json::to_string_pretty(&resources)?);
    Ok(())
}

async fn cmd_reset(ctx: &AppContext, key: &str) -> Result<()> {
    let site = ctx.find_site(key).await?;
    // hold the crawl mark so nothing is claimed while releasing
    let _guard = ctx.begin_crawl(&site.id)?;
    let released = ctx
        .storage()
        .reset_stale_claims(&site.id, Duration::ZERO)
        .await?;
    let closed = ctx.storage().close_open_runs(&site.id).await?;
    println!("Released {released} claim(s), closed {closed} open run(s) for {}", site.name);
    Ok(())
}

async fn print_request(
    ctx: &Arc<AppContext>,
    method: Method,
    path: String,
    body: Option<Value>,
) -> Result<()> {
    let response = sitecrawl_core::handle(ctx, ApiRequest { method, path, body }).await;
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if !response.is_success() {
        return Err(eyre!("request failed with status {}", response.status));
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, config: &AppConfig) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = init_config()?;
            println!("Config initialized at: {}", path.display());
        }
        ConfigAction::Show => println!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Crawl progress on an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}") {
            spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl CrawlProgress for CliProgress {
    fn started(&self, site: &Site) {
        self.spinner.set_message(format!("Crawling {}", site.url));
    }

    fn resource_crawled(&self, resource: &Resource, crawled: u64) {
        self.spinner
            .set_message(format!("[{crawled}] depth {} {}", resource.depth, resource.url));
    }

    fn finished(&self, summary: &CrawlSummary) {
        self.spinner
            .set_message(format!("Done: {} crawled", summary.crawled));
    }
}
