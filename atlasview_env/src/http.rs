//! HTTP(S) asset fetcher backed by reqwest.

use crate::error::EnvError;
use crate::fetch::AssetFetcher;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Fetches assets over HTTP(S).
///
/// Holds one pooled `reqwest::Client`; cloning the fetcher is cheap and
/// shares the pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a default client.
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    /// Creates a fetcher around an existing client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, EnvError> {
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(EnvError::UnsupportedScheme {
                    url: url.to_string(),
                    scheme: other.to_string(),
                })
            }
        }

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| EnvError::transport(url, e))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EnvError::not_found(url));
        }
        if !status.is_success() {
            return Err(EnvError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| EnvError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_fetcher_rejects_file_scheme() {
        let fetcher = HttpFetcher::new();
        let url = Url::parse("file:///tmp/manifest.json").unwrap();

        let err = fetcher.fetch_text(&url).await.unwrap_err();
        assert!(matches!(err, EnvError::UnsupportedScheme { ref scheme, .. } if scheme == "file"));
    }
}
