//! Source-file collaborator boundary.

use async_trait::async_trait;

/// Maps script identifiers to sources. The host owns caching and any remote
/// URI translation; the bridge only registers files it learns about and asks
/// for contents on demand.
#[async_trait]
pub trait FileCache: Send + Sync + 'static {
    /// Note that `path` participates in the session (e.g. a breakpoint or a
    /// continue-to-location target referenced it).
    async fn register_file(&self, path: &str);

    /// Fetch the source text for a script identifier.
    async fn get_file_source(&self, path: &str) -> eyre::Result<String>;
}
