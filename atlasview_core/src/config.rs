//! Engine configuration.

use atlasview_env::{Url, UrlParseError};
use serde::{Deserialize, Serialize};

/// Tunables for manifest resolution, camera motion and video binding.
///
/// Deserializable from JSON so deployments can ship a config file next to
/// the manifest; every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Origin every relative asset path is resolved against
    pub origin: Url,

    /// Directory (relative to origin) holding one folder per layer key
    pub datasets_path: String,

    /// File name of the per-layer descriptor inside its folder
    pub descriptor_file: String,

    /// Manifest location (relative to origin)
    pub manifest_path: String,

    /// Camera spin rate in 3D, radians per second about +Z
    pub spin_rate_3d: f64,

    /// Camera pan rate in 2D / Columbus view, meters per second
    pub pan_rate_2d: f64,

    /// Allowed drift between clock and media before a video binding seeks
    pub video_tolerance_secs: f64,
}

impl EngineConfig {
    /// Base URL of a layer's folder (always ends with `/`).
    pub fn layer_base(&self, key: &str) -> Result<Url, UrlParseError> {
        let path = format!("{}/{}/", self.datasets_path.trim_matches('/'), key);
        self.origin.join(&path)
    }

    /// Absolute manifest URL.
    pub fn manifest_url(&self) -> Result<Url, UrlParseError> {
        self.origin.join(self.manifest_path.trim_start_matches('/'))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost/").expect("static origin parses"),
            datasets_path: "assets/datasets".to_string(),
            descriptor_file: "properties.json".to_string(),
            manifest_path: "assets/datasets/manifest.json".to_string(),
            spin_rate_3d: 0.2,
            pan_rate_2d: 1_000_000.0,
            video_tolerance_secs: 1.0,
        }
    }
}
