//! Layer descriptors - the normalized, URL-resolved configuration of one overlay.
//!
//! A descriptor is parsed from the per-layer JSON document, resolved by the
//! manifest resolver and is read-only from then on (shared as
//! `Arc<LayerDescriptor>`).

use crate::clock::ClockConfig;
use crate::legend::LegendSpec;
use crate::time_interval::TimeIntervalSpec;
use geo::{coord, Rect};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;

/// Unique identifier of a layer within a manifest (its dataset folder name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerKey(String);

impl LayerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LayerKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl Borrow<str> for LayerKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The six overlay categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Vector,
    VideoRectangle,
    SingleTile,
    TileMap,
    UrlTemplate,
    TimeDimensioned,
}

impl LayerKind {
    /// True for kinds that end up in the raster-layer stack.
    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            LayerKind::SingleTile
                | LayerKind::TileMap
                | LayerKind::UrlTemplate
                | LayerKind::TimeDimensioned
        )
    }

    /// Wire tag used in descriptor documents.
    pub fn tag(&self) -> &'static str {
        match self {
            LayerKind::Vector => "GeoJsonDataSource",
            LayerKind::VideoRectangle => "ImageMaterialProperty",
            LayerKind::SingleTile => "SingleTileImageryProvider",
            LayerKind::TileMap => "TileMapServiceImageryProvider",
            LayerKind::UrlTemplate => "UrlTemplateImageryProvider",
            LayerKind::TimeDimensioned => "WebMapTileServiceImageryProvider",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Attribution attached to a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credits {
    pub credit: String,
    #[serde(default)]
    pub show_on_screen: bool,
}

/// One overlay layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    /// Assigned from the manifest, never read from the document
    #[serde(skip)]
    pub key: LayerKey,

    /// Set when the key appears in the manifest's `default` list
    #[serde(skip)]
    pub is_default: bool,

    /// Primary data URL (a template for templated services)
    #[serde(default)]
    pub url: Option<String>,

    /// Secondary time-animated vector document
    #[serde(default)]
    pub czml: Option<String>,

    #[serde(default)]
    pub legend: Option<LegendSpec>,

    #[serde(default)]
    pub credits: Option<Credits>,

    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub update_date: Option<String>,
    #[serde(default)]
    pub copyright_license: Option<String>,
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub clock: Option<ClockConfig>,

    #[serde(default)]
    pub timeline_sync: bool,

    #[serde(default)]
    pub color_properties: Option<ColorAdjustment>,

    /// Kind tag plus kind-specific parameters
    #[serde(flatten)]
    pub params: LayerParams,
}

impl LayerDescriptor {
    pub fn kind(&self) -> LayerKind {
        self.params.kind()
    }

    /// Category used for grouping, `"Default"` when unset.
    pub fn category(&self) -> &str {
        self.category.as_deref().unwrap_or("Default")
    }

    /// Clock configuration that must be re-applied on activation, if any.
    pub fn synced_clock(&self) -> Option<&ClockConfig> {
        if self.timeline_sync {
            self.clock.as_ref()
        } else {
            None
        }
    }
}

/// Closed union over the six overlay kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayerParams {
    #[serde(rename = "GeoJsonDataSource")]
    Vector(VectorParams),
    #[serde(rename = "ImageMaterialProperty")]
    VideoRectangle(VideoRectangleParams),
    #[serde(rename = "SingleTileImageryProvider")]
    SingleTile(SingleTileParams),
    #[serde(rename = "TileMapServiceImageryProvider")]
    TileMap(TileMapParams),
    #[serde(rename = "UrlTemplateImageryProvider")]
    UrlTemplate(UrlTemplateParams),
    #[serde(rename = "WebMapTileServiceImageryProvider")]
    TimeDimensioned(TimeDimensionedParams),
}

impl LayerParams {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerParams::Vector(_) => LayerKind::Vector,
            LayerParams::VideoRectangle(_) => LayerKind::VideoRectangle,
            LayerParams::SingleTile(_) => LayerKind::SingleTile,
            LayerParams::TileMap(_) => LayerKind::TileMap,
            LayerParams::UrlTemplate(_) => LayerKind::UrlTemplate,
            LayerParams::TimeDimensioned(_) => LayerKind::TimeDimensioned,
        }
    }
}

/// Geographic extent in degrees: `[west, south, east, north]`.
pub type DegreesRect = [f64; 4];

/// Converts a degree extent to a rectangle, rejecting out-of-range or
/// inverted extents.
pub fn rect_from_degrees(extent: DegreesRect) -> Result<Rect<f64>, String> {
    let [west, south, east, north] = extent;
    if !extent.iter().all(|v| v.is_finite()) {
        return Err(format!("non-finite extent {extent:?}"));
    }
    if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
        return Err(format!("longitude out of range in {extent:?}"));
    }
    if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
        return Err(format!("latitude out of range in {extent:?}"));
    }
    if west > east || south > north {
        return Err(format!("inverted extent {extent:?}"));
    }
    Ok(Rect::new(coord! { x: west, y: south }, coord! { x: east, y: north }))
}

/// The whole globe.
pub fn full_extent() -> Rect<f64> {
    Rect::new(coord! { x: -180.0, y: -90.0 }, coord! { x: 180.0, y: 90.0 })
}

/// Tiling scheme of a raster pyramid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TilingScheme {
    /// Two tiles wide, one tall at level 0
    Geographic,
    /// One tile at level 0
    #[default]
    WebMercator,
}

impl TilingScheme {
    pub fn tiles_x(&self, level: u32) -> u64 {
        let root = match self {
            TilingScheme::Geographic => 2,
            TilingScheme::WebMercator => 1,
        };
        root << level.min(40)
    }

    pub fn tiles_y(&self, level: u32) -> u64 {
        1 << level.min(40)
    }
}

/// Subdomains for `{s}` rotation: either a string of single characters or
/// an explicit list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Subdomains {
    Letters(String),
    List(Vec<String>),
}

impl Subdomains {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Subdomains::Letters(s) => s.chars().map(String::from).collect(),
            Subdomains::List(list) => list.clone(),
        }
    }
}

impl Default for Subdomains {
    fn default() -> Self {
        Subdomains::Letters("abc".to_string())
    }
}

/// Raster color adjustments, each applied as a direct property write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjustment {
    pub brightness: Option<f64>,
    pub contrast: Option<f64>,
    pub gamma: Option<f64>,
    pub hue: Option<f64>,
    pub alpha: Option<f64>,
    pub saturation: Option<f64>,
}

/// A writable color property of a raster layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterProperty {
    Brightness,
    Contrast,
    Gamma,
    Hue,
    Alpha,
    Saturation,
}

impl ColorAdjustment {
    /// The supplied properties, in a fixed order.
    pub fn entries(&self) -> Vec<(RasterProperty, f64)> {
        [
            (RasterProperty::Brightness, self.brightness),
            (RasterProperty::Contrast, self.contrast),
            (RasterProperty::Gamma, self.gamma),
            (RasterProperty::Hue, self.hue),
            (RasterProperty::Alpha, self.alpha),
            (RasterProperty::Saturation, self.saturation),
        ]
        .into_iter()
        .filter_map(|(prop, value)| value.map(|v| (prop, v)))
        .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VectorParams {
    pub source_uri: Option<String>,
    pub marker_size: Option<f64>,
    pub marker_symbol: Option<String>,
    pub marker_color: Option<String>,
    pub stroke: Option<String>,
    pub stroke_width: Option<f64>,
    pub fill: Option<String>,
    pub clamp_to_ground: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoRectangleParams {
    pub rectangle: Option<DegreesRect>,
    pub repeat: Option<[f64; 2]>,
    pub loop_content: Option<bool>,
    pub muted: Option<bool>,
    pub playback_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SingleTileParams {
    pub rectangle: Option<DegreesRect>,
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TileMapParams {
    pub file_extension: Option<String>,
    pub minimum_level: Option<u32>,
    pub maximum_level: Option<u32>,
    pub rectangle: Option<DegreesRect>,
    pub tiling_scheme: Option<TilingScheme>,
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
    #[serde(rename = "flipXY")]
    pub flip_xy: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UrlTemplateParams {
    pub pick_features_url: Option<String>,
    pub url_scheme_zero_padding: Option<BTreeMap<String, String>>,
    pub subdomains: Option<Subdomains>,
    pub minimum_level: Option<u32>,
    pub maximum_level: Option<u32>,
    pub rectangle: Option<DegreesRect>,
    pub tiling_scheme: Option<TilingScheme>,
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
    pub has_alpha_channel: Option<bool>,
    pub enable_pick_features: Option<bool>,
    pub custom_tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeDimensionedParams {
    /// Sub-layer identifier (mandatory)
    pub layer: Option<String>,
    pub format: Option<String>,
    pub style: Option<String>,
    #[serde(rename = "tileMatrixSetID")]
    pub tile_matrix_set_id: Option<String>,
    pub tile_matrix_labels: Option<Vec<String>>,
    pub times: Option<TimeIntervalSpec>,
    pub dimensions: Option<BTreeMap<String, serde_json::Value>>,
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
    pub tiling_scheme: Option<TilingScheme>,
    pub rectangle: Option<DegreesRect>,
    pub minimum_level: Option<u32>,
    pub maximum_level: Option<u32>,
    pub subdomains: Option<Subdomains>,
}
