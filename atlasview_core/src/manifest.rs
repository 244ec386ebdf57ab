//! Manifest resolution: manifest document → ordered, URL-resolved catalog.
//!
//! Descriptor documents are fetched concurrently; the catalog is assembled
//! in manifest order regardless of completion order. A descriptor that
//! fails to fetch, parse or resolve is logged and dropped without affecting
//! the rest of the batch.

use crate::config::EngineConfig;
use crate::descriptor::{LayerDescriptor, LayerKey};
use crate::error::ResolutionError;
use atlasview_env::{AssetFetcher, Url};
use futures::future::join_all;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// The manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Auto-activated and locked on
    #[serde(default)]
    pub default: Vec<String>,
    /// Auto-activated, toggleable afterwards
    #[serde(default)]
    pub startup: Vec<String>,
    /// Every selectable layer, in display order
    pub layers: Vec<String>,
}

/// Resolved descriptors in manifest order.
#[derive(Debug, Clone, Default)]
pub struct LayerCatalog {
    layers: Vec<Arc<LayerDescriptor>>,
    default_keys: Vec<LayerKey>,
    startup_keys: Vec<LayerKey>,
}

impl LayerCatalog {
    /// Builds a catalog from already-resolved descriptors. Activation lists
    /// are filtered down to keys present in `layers`.
    pub fn new(layers: Vec<LayerDescriptor>, default: &[String], startup: &[String]) -> Self {
        let defaults: HashSet<&str> = default.iter().map(String::as_str).collect();
        let layers: Vec<Arc<LayerDescriptor>> = layers
            .into_iter()
            .map(|mut desc| {
                desc.is_default = defaults.contains(desc.key.as_str());
                Arc::new(desc)
            })
            .collect();

        let known: HashSet<&str> = layers.iter().map(|d| d.key.as_str()).collect();
        let keep = |list: &[String], which: &str| -> Vec<LayerKey> {
            list.iter()
                .filter(|key| {
                    let present = known.contains(key.as_str());
                    if !present {
                        warn!(layer = %key, list = which, "Activation list names an unavailable layer");
                    }
                    present
                })
                .map(|key| LayerKey::from(key.as_str()))
                .collect()
        };
        let default_keys = keep(default, "default");
        let startup_keys = keep(startup, "startup");

        Self {
            layers,
            default_keys,
            startup_keys,
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LayerDescriptor>> {
        self.layers.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<LayerDescriptor>> {
        self.layers.iter().find(|d| d.key.as_str() == key)
    }

    pub fn keys(&self) -> Vec<LayerKey> {
        self.layers.iter().map(|d| d.key.clone()).collect()
    }

    pub fn default_keys(&self) -> &[LayerKey] {
        &self.default_keys
    }

    pub fn startup_keys(&self) -> &[LayerKey] {
        &self.startup_keys
    }

    /// Unique categories in order of first appearance.
    pub fn categories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.layers
            .iter()
            .map(|d| d.category().to_string())
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }

    /// Layers of one category, in manifest order.
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Arc<LayerDescriptor>> {
        self.layers.iter().filter(move |d| d.category() == category)
    }
}

/// Fetches the manifest and every descriptor it lists.
pub struct ManifestResolver {
    config: EngineConfig,
    fetcher: Arc<dyn AssetFetcher>,
}

impl ManifestResolver {
    pub fn new(config: EngineConfig, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Fetches the configured manifest and resolves it.
    ///
    /// Only a manifest failure is an error; descriptor failures shrink the
    /// catalog.
    pub async fn resolve(&self) -> Result<LayerCatalog, ResolutionError> {
        let url = self.config.manifest_url().map_err(|e| ResolutionError::BadUrl {
            base: self.config.origin.to_string(),
            reference: self.config.manifest_path.clone(),
            reason: e.to_string(),
        })?;
        let body = self
            .fetcher
            .fetch_text(&url)
            .await
            .map_err(|source| ResolutionError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let manifest: Manifest = serde_json::from_str(&body).map_err(|e| ResolutionError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(self.resolve_manifest(&manifest).await)
    }

    /// Resolves every descriptor a manifest lists.
    pub async fn resolve_manifest(&self, manifest: &Manifest) -> LayerCatalog {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for key in &manifest.layers {
            if seen.insert(key.as_str()) {
                keys.push(key.as_str());
            } else {
                warn!(error = %ResolutionError::DuplicateKey(key.clone()), "Skipping duplicate");
            }
        }

        let results = join_all(keys.iter().map(|key| self.resolve_descriptor(key))).await;

        let layers: Vec<LayerDescriptor> = keys
            .iter()
            .zip(results)
            .filter_map(|(key, result)| match result {
                Ok(desc) => Some(desc),
                Err(e) => {
                    warn!(layer = key, error = %e, "Dropping layer");
                    None
                }
            })
            .collect();

        info!(resolved = layers.len(), listed = keys.len(), "Manifest resolved");
        LayerCatalog::new(layers, &manifest.default, &manifest.startup)
    }

    /// Fetches, parses and URL-resolves one descriptor.
    pub async fn resolve_descriptor(&self, key: &str) -> Result<LayerDescriptor, ResolutionError> {
        let base = self.config.layer_base(key).map_err(|e| ResolutionError::BadUrl {
            base: self.config.origin.to_string(),
            reference: key.to_string(),
            reason: e.to_string(),
        })?;
        let url = base
            .join(&self.config.descriptor_file)
            .map_err(|e| bad_url(&base, &self.config.descriptor_file, e))?;

        let body = self
            .fetcher
            .fetch_text(&url)
            .await
            .map_err(|source| ResolutionError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let mut desc: LayerDescriptor =
            serde_json::from_str(&body).map_err(|e| ResolutionError::Malformed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        desc.key = LayerKey::from(key);
        resolve_urls(&mut desc, &base)?;
        debug!(layer = key, kind = %desc.kind(), "Descriptor resolved");
        Ok(desc)
    }
}

fn bad_url(base: &Url, reference: &str, e: impl std::fmt::Display) -> ResolutionError {
    ResolutionError::BadUrl {
        base: base.to_string(),
        reference: reference.to_string(),
        reason: e.to_string(),
    }
}

/// Resolves `reference` against `base`, keeping `{token}` placeholders of
/// URL templates intact.
pub fn resolve_reference(base: &Url, reference: &str) -> Result<String, ResolutionError> {
    let joined = base.join(reference).map_err(|e| bad_url(base, reference, e))?;
    let resolved = String::from(joined);
    if reference.contains('{') {
        Ok(resolved.replace("%7B", "{").replace("%7D", "}"))
    } else {
        Ok(resolved)
    }
}

fn media_src_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)(<(?:img|video|audio|source)\b[^>]*?\ssrc\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
            .expect("static media src pattern")
    })
}

/// Rewrites the `src` of every `img`, `video`, `audio` and `source` tag to
/// an absolute URL. Plain text passes through unchanged; unresolvable
/// sources are left as written.
pub fn resolve_html(html: &str, base: &Url) -> String {
    media_src_pattern()
        .replace_all(html, |caps: &Captures| {
            let (value, quote) = match (caps.get(2), caps.get(3)) {
                (Some(v), _) => (v.as_str(), '"'),
                (None, Some(v)) => (v.as_str(), '\''),
                (None, None) => ("", '"'),
            };
            let resolved = base
                .join(value)
                .map(String::from)
                .unwrap_or_else(|_| value.to_string());
            format!("{}{quote}{resolved}{quote}", &caps[1])
        })
        .into_owned()
}

fn resolve_urls(desc: &mut LayerDescriptor, base: &Url) -> Result<(), ResolutionError> {
    if let Some(url) = &desc.url {
        desc.url = Some(resolve_reference(base, url)?);
    }
    if let Some(czml) = &desc.czml {
        desc.czml = Some(resolve_reference(base, czml)?);
    }
    if let Some(path) = desc.legend.as_mut().and_then(|l| l.path_mut()) {
        *path = resolve_reference(base, path)?;
    }
    if let Some(credits) = desc.credits.as_mut() {
        credits.credit = resolve_html(&credits.credit, base);
    }
    for field in [
        &mut desc.title,
        &mut desc.subtitle,
        &mut desc.copyright_license,
        &mut desc.description,
    ] {
        if let Some(text) = field.as_mut() {
            *text = resolve_html(text, base);
        }
    }
    Ok(())
}
