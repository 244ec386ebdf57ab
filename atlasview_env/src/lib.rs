//! AtlasView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the AtlasView layer
//! engine run against a real deployment (tokio + HTTP/filesystem assets)
//! and against the deterministic simulation harness.
//!
//! # Core Concept
//!
//! Every source of non-determinism the engine touches is intercepted:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Asset I/O (`AssetFetcher::fetch_text()`)
//!
//! # Example
//!
//! ```ignore
//! use atlasview_env::{AssetFetcher, HttpFetcher, Url};
//!
//! async fn load_manifest(fetcher: &dyn AssetFetcher) {
//!     let url = Url::parse("https://maps.example.org/assets/datasets/manifest.json").unwrap();
//!     let body = fetcher.fetch_text(&url).await;
//! }
//! ```

mod context;
mod error;
mod fetch;
mod file;
mod http;
mod tokio_impl;

pub use context::AtlasContext;
pub use error::EnvError;
pub use fetch::AssetFetcher;
pub use file::FileFetcher;
pub use http::HttpFetcher;
pub use tokio_impl::TokioContext;

/// URL type used for every asset address in AtlasView.
pub use url::{ParseError as UrlParseError, Url};
