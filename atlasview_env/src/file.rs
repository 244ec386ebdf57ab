//! Filesystem asset fetcher backed by `tokio::fs`.

use crate::error::EnvError;
use crate::fetch::AssetFetcher;
use async_trait::async_trait;
use url::Url;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Serves assets from a local directory.
///
/// `file://` URLs are read as-is. URLs sharing the configured origin
/// (scheme, host and port) are mapped onto `root`, so a deployment's
/// `https://maps.example.org/assets/...` tree can be replayed from disk.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    origin: Option<Url>,
    root: PathBuf,
}

impl FileFetcher {
    /// Creates a fetcher that only serves `file://` URLs.
    pub fn new() -> Self {
        Self {
            origin: None,
            root: PathBuf::new(),
        }
    }

    /// Creates a fetcher that maps `origin` onto the `root` directory.
    pub fn mapped(origin: Url, root: impl Into<PathBuf>) -> Self {
        Self {
            origin: Some(origin),
            root: root.into(),
        }
    }

    /// Resolves a URL to the local path it is served from.
    pub fn local_path(&self, url: &Url) -> Result<PathBuf, EnvError> {
        if url.scheme() == "file" {
            return url
                .to_file_path()
                .map_err(|_| EnvError::not_found(url));
        }

        let origin = match &self.origin {
            Some(origin) if origin.origin() == url.origin() => origin,
            _ => {
                return Err(EnvError::UnsupportedScheme {
                    url: url.to_string(),
                    scheme: url.scheme().to_string(),
                })
            }
        };

        let prefix = origin.path().trim_end_matches('/');
        let relative = url
            .path()
            .strip_prefix(prefix)
            .unwrap_or(url.path())
            .trim_start_matches('/');

        // Refuse to escape the root with `..` segments.
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(EnvError::not_found(url));
        }

        Ok(self.root.join(relative))
    }
}

impl Default for FileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for FileFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, EnvError> {
        let path = self.local_path(url)?;

        match tokio::fs::read_to_string(&path).await {
            Ok(body) => Ok(body),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(EnvError::not_found(url)),
            Err(e) if e.kind() == ErrorKind::InvalidData => Err(EnvError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(source) => Err(EnvError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_origin_resolves_under_root() {
        let fetcher = FileFetcher::mapped(
            Url::parse("https://maps.example.org/").unwrap(),
            "/srv/atlas",
        );
        let url = Url::parse("https://maps.example.org/assets/datasets/sst/properties.json").unwrap();

        let path = fetcher.local_path(&url).unwrap();
        assert_eq!(path, PathBuf::from("/srv/atlas/assets/datasets/sst/properties.json"));
    }

    #[test]
    fn test_foreign_origin_is_rejected() {
        let fetcher = FileFetcher::mapped(
            Url::parse("https://maps.example.org/").unwrap(),
            "/srv/atlas",
        );
        let url = Url::parse("https://tiles.other.net/a.json").unwrap();

        assert!(fetcher.local_path(&url).is_err());
    }

    #[tokio::test]
    async fn test_reads_file_url() {
        let dir = std::env::temp_dir().join(format!("atlasview_env_{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("manifest.json");
        tokio::fs::write(&file, r#"{"layers":[]}"#).await.unwrap();

        let fetcher = FileFetcher::new();
        let url = Url::from_file_path(&file).unwrap();
        let body = fetcher.fetch_text(&url).await.unwrap();
        assert_eq!(body, r#"{"layers":[]}"#);

        let missing = Url::from_file_path(dir.join("missing.json")).unwrap();
        assert!(matches!(
            fetcher.fetch_text(&missing).await,
            Err(EnvError::NotFound(_))
        ));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
