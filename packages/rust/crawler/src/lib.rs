//! Crawl plugins and the pipeline that runs them.
//!
//! This crate provides:
//! - [`plugins`]: the [`Plugin`] trait, built-in plugins and the [`PluginRegistry`]
//! - [`schema`]: option schema instantiation (defaults overlaid with supplied options)
//! - [`pipeline`]: the per-resource [`Pipeline`] executor and [`commit_outcome`]

pub mod pipeline;
pub mod plugins;
pub mod schema;

pub use pipeline::{Pipeline, PipelineOutcome, commit_outcome};
pub use plugins::{
    DEFAULT_PIPELINE, ExtractHtmlContentPlugin, ExtractUrlsPlugin, FetchPlugin, Phase, Plugin,
    PluginContext, PluginDescriptor, PluginOutput, PluginRegistry, SelectResourcePlugin,
    UpsertResourcePlugin, build_client,
};
