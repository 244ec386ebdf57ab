//! A canned deployment: manifest, descriptors and data files served from
//! one simulated origin.

use crate::fetcher::SimFetcher;
use crate::viewer::SimViewer;
use atlasview_core::EngineConfig;
use atlasview_env::Url;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const ORIGIN: &str = "https://atlas.sim/";

/// Keys in manifest order.
pub const LAYERS: [&str; 8] = [
    "blue_marble",
    "sst",
    "ports",
    "clouds",
    "cities",
    "satellites",
    "bad_wmts",
    "missing",
];

/// Keys whose descriptors resolve.
pub const RESOLVABLE: [&str; 7] = ["blue_marble", "sst", "ports", "clouds", "cities", "satellites", "bad_wmts"];

/// Keys that resolve but cannot be constructed.
pub const UNLOADABLE: [&str; 1] = ["bad_wmts"];

pub const CLOUDS_SECONDS: f64 = 20.0;

const MANIFEST: &str = r#"{
    "default": ["blue_marble"],
    "startup": ["sst", "ports"],
    "layers": ["blue_marble", "sst", "ports", "clouds", "cities", "satellites", "bad_wmts", "missing"]
}"#;

const BLUE_MARBLE: &str = r#"{
    "type": "TileMapServiceImageryProvider",
    "url": "tiles",
    "title": "Blue Marble",
    "fileExtension": "jpg",
    "maximumLevel": 8,
    "credits": {"credit": "<a href=\"https://earthobservatory.sim/\"><img src=\"nasa.png\"></a>", "showOnScreen": true}
}"#;

const SST: &str = r#"{
    "type": "WebMapTileServiceImageryProvider",
    "url": "https://gibs.sim/wmts/epsg4326/best/wmts.cgi",
    "layer": "GHRSST_L4_MUR_Sea_Surface_Temperature",
    "format": "image/png",
    "tileMatrixSetID": "1km",
    "maximumLevel": 7,
    "times": {
        "method": "fromIso8601",
        "iso8601": "2024-01-01T00:00:00Z/2024-01-05T00:00:00Z/P1D",
        "dataCallback": "dataCallback"
    },
    "clock": {
        "startTime": "2024-01-01T00:00:00Z",
        "stopTime": "2024-01-05T00:00:00Z",
        "clockRange": "LOOP_STOP",
        "multiplier": 3600
    },
    "timelineSync": true,
    "legend": "sst_legend.png",
    "category": "Ocean",
    "title": "Sea Surface Temperature",
    "description": "<p>Daily SST <img src=\"thumb.png\"></p>",
    "colorProperties": {"alpha": 0.8}
}"#;

const PORTS: &str = r##"{
    "type": "GeoJsonDataSource",
    "url": "ports.geojson",
    "markerColor": "#1f77b4",
    "stroke": "#000000",
    "category": "Infrastructure",
    "legend": "ports_legend.png",
    "credits": {"credit": "Port data <img src=\"port_logo.png\">", "showOnScreen": true}
}"##;

const PORTS_GEOJSON: &str = r#"{"type": "FeatureCollection", "features": [
    {"type": "Feature", "properties": {"name": "Rotterdam"}, "geometry": {"type": "Point", "coordinates": [4.4, 51.9]}},
    {"type": "Feature", "properties": {"name": "Singapore"}, "geometry": {"type": "Point", "coordinates": [103.8, 1.26]}},
    {"type": "Feature", "properties": {"name": "Shanghai"}, "geometry": {"type": "Point", "coordinates": [121.5, 31.2]}}
]}"#;

const CLOUDS: &str = r#"{
    "type": "ImageMaterialProperty",
    "url": "clouds.mp4",
    "rectangle": [-180, -90, 180, 90],
    "timelineSync": true,
    "clock": {"startTime": "2024-02-01T00:00:00Z", "shouldAnimate": true, "multiplier": 1},
    "category": "Atmosphere"
}"#;

const CITIES: &str = r#"{
    "type": "UrlTemplateImageryProvider",
    "url": "https://{s}.tiles.sim/lights/{z}/{x}/{reverseY}.png",
    "subdomains": "abc",
    "maximumLevel": 6,
    "legend": "legend.json",
    "category": "Atmosphere"
}"#;

const CITIES_LEGEND: &str = r##"{
    "gradient": "linear-gradient(90deg, #000000, #ffffff)",
    "title": "Radiance",
    "labels": [{"value": "0", "position": 0}, {"value": "100", "position": 100}]
}"##;

const SATELLITES: &str = r#"{
    "type": "SingleTileImageryProvider",
    "url": "overview.png",
    "czml": "tracks.czml",
    "rectangle": [-180, -90, 180, 90]
}"#;

const TRACKS: &str = r#"[
    {"id": "document", "name": "LEO tracks", "version": "1.0"},
    {"id": "sat-1", "availability": "2024-01-01T00:00:00Z/2024-01-02T00:00:00Z",
     "position": {"epoch": "2024-01-01T00:00:00Z", "cartographicDegrees": [0, 0, 0, 500000, 5400, 90, 0, 500000]}},
    {"id": "sat-2", "position": {"epoch": "2024-01-01T00:00:00Z", "cartographicDegrees": [0, 10, 45, 700000]}}
]"#;

const BAD_WMTS: &str = r#"{
    "type": "WebMapTileServiceImageryProvider",
    "url": "https://gibs.sim/wmts/epsg4326/best/wmts.cgi"
}"#;

/// A simulated deployment rooted at [`ORIGIN`].
pub struct Deployment {
    pub config: EngineConfig,
    docs: Vec<(String, String)>,
}

impl Deployment {
    pub fn standard() -> Self {
        Self::with_config(EngineConfig {
            origin: Url::parse(ORIGIN).expect("static origin parses"),
            ..Default::default()
        })
    }

    /// The standard documents laid out under `config`'s origin and paths.
    pub fn with_config(config: EngineConfig) -> Self {
        let mut deployment = Self {
            config,
            docs: Vec::new(),
        };
        let manifest = deployment.config.manifest_url().map(String::from).unwrap_or_default();
        deployment.docs.push((manifest, MANIFEST.to_string()));

        let descriptors = [
            ("blue_marble", BLUE_MARBLE),
            ("sst", SST),
            ("ports", PORTS),
            ("clouds", CLOUDS),
            ("cities", CITIES),
            ("satellites", SATELLITES),
            ("bad_wmts", BAD_WMTS),
        ];
        for (key, body) in descriptors {
            let url = deployment.layer_file(key, &deployment.config.descriptor_file);
            deployment.docs.push((url, body.to_string()));
        }
        for (key, file, body) in [
            ("ports", "ports.geojson", PORTS_GEOJSON),
            ("cities", "legend.json", CITIES_LEGEND),
            ("satellites", "tracks.czml", TRACKS),
        ] {
            let url = deployment.layer_file(key, file);
            deployment.docs.push((url, body.to_string()));
        }
        deployment
    }

    /// Absolute URL of `file` inside a layer folder.
    pub fn layer_file(&self, key: &str, file: &str) -> String {
        self.config
            .layer_base(key)
            .and_then(|base| base.join(file))
            .map(String::from)
            .unwrap_or_default()
    }

    pub fn docs(&self) -> &[(String, String)] {
        &self.docs
    }

    pub fn fetcher(&self, seed: u64, max_latency: u32) -> SimFetcher {
        SimFetcher::new(seed, max_latency).with_docs(self.docs.iter().cloned())
    }

    /// A viewer that knows the duration of every video in the deployment.
    pub fn viewer(&self, start: DateTime<Utc>) -> Arc<SimViewer> {
        let viewer = SimViewer::shared(start);
        viewer.set_media_duration(self.layer_file("clouds", "clouds.mp4"), CLOUDS_SECONDS);
        viewer
    }
}
