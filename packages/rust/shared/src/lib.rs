//! Shared types, error model, and configuration for SiteCrawl.
//!
//! This crate is the foundation depended on by all other SiteCrawl crates.
//! It provides:
//! - [`SiteCrawlError`]: the unified error type
//! - Domain types ([`Site`], [`Resource`], [`PluginDefinition`], [`SiteId`])
//! - The per-site URL dedup filter ([`BloomFilter`])
//! - Configuration ([`AppConfig`], config loading)

pub mod bloom;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use bloom::BloomFilter;
pub use config::{
    AppConfig, DedupConfig, DefaultsConfig, FetchConfig, RecoveryConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{Result, SiteCrawlError};
pub use types::{
    CrawlOpts, EPOCH0, PluginDefinition, PluginPreset, Resource, ResourceFilter, ResourceUpdate,
    Site, SiteId, merge_map,
};
