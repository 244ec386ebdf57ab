//! Asset fetching abstraction for manifests, descriptors and vector data.

use async_trait::async_trait;
use crate::error::EnvError;
use url::Url;

/// Abstraction for retrieving text assets by URL.
///
/// # Implementations
///
/// - **Production**: `HttpFetcher` (http/https) and `FileFetcher` (file:// or
///   an origin mapped onto a local directory)
/// - **Simulation**: `SimFetcher` - in-memory documents with seeded latency
///
/// Fetches may complete in any order; callers that need ordering must
/// reassemble results themselves.
#[async_trait]
pub trait AssetFetcher: Send + Sync + 'static {
    /// Fetches the asset at `url` and returns its body as UTF-8 text.
    ///
    /// # Returns
    /// * `Ok(body)` - The asset was retrieved
    /// * `Err(EnvError::NotFound)` - Nothing lives at that address
    /// * `Err(_)` - Transport, status or decode failure
    async fn fetch_text(&self, url: &Url) -> Result<String, EnvError>;
}
