//! Error types for SiteCrawl.
//!
//! Library crates use [`SiteCrawlError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SiteCrawl operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteCrawlError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of a plugin run.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or URL parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Reading or locking the next frontier resource failed.
    /// The controller retries on its next tick.
    #[error("claim error: {0}")]
    Claim(String),

    /// Inserting newly discovered URLs failed; nothing was applied.
    #[error("dedup insert error: {0}")]
    DedupInsert(String),

    /// A plugin's `apply` failed. The claimed resource stays locked.
    #[error("plugin {plugin} failed: {message}")]
    PluginApply { plugin: String, message: String },

    /// Plugin options do not satisfy the plugin's option schema.
    #[error("invalid options for plugin {plugin}: {message}")]
    SchemaInstantiation { plugin: String, message: String },

    /// A requested entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique name is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A crawl for this site is already running in this process.
    #[error("site {0} is already being crawled")]
    AlreadyCrawling(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad request body, invalid parameters, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteCrawlError>;

impl SiteCrawlError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a plugin apply error.
    pub fn plugin_apply(plugin: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::PluginApply {
            plugin: plugin.into(),
            message: msg.into(),
        }
    }

    /// Create a schema instantiation error.
    pub fn schema(plugin: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SchemaInstantiation {
            plugin: plugin.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SiteCrawlError::config("missing db path");
        assert_eq!(err.to_string(), "config error: missing db path");

        let err = SiteCrawlError::plugin_apply("FetchPlugin", "connection refused");
        assert_eq!(
            err.to_string(),
            "plugin FetchPlugin failed: connection refused"
        );

        let err = SiteCrawlError::not_found("site", "abc");
        assert_eq!(err.to_string(), "site not found: abc");
    }

    #[test]
    fn schema_error_names_plugin() {
        let err = SiteCrawlError::schema("ExtractUrlsPlugin", "pathnameRe: unclosed group");
        assert!(err.to_string().contains("ExtractUrlsPlugin"));
        assert!(err.to_string().contains("unclosed group"));
    }
}
