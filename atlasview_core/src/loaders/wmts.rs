//! Time-dimensioned Web Map Tile Service layers.
//!
//! The source keeps its time-interval collection and resolves dimension
//! values against the shared clock's current time on every tile request.

use crate::descriptor::{full_extent, rect_from_degrees, Credits, LayerDescriptor, TilingScheme, TimeDimensionedParams};
use crate::error::ConstructionError;
use crate::time_interval::TimeIntervalCollection;
use atlasview_env::Url;
use chrono::{DateTime, Utc};
use geo::Rect;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// How tile requests are addressed.
#[derive(Debug, Clone, PartialEq)]
pub enum WmtsEndpoint {
    /// Key-value-pair GetTile requests against a service URL
    Kvp(Url),
    /// RESTful template with `{TileMatrix}`, `{TileRow}`, `{TileCol}`, ...
    Rest(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WmtsSource {
    pub endpoint: WmtsEndpoint,
    pub layer: String,
    pub format: String,
    pub style: String,
    pub tile_matrix_set_id: String,
    pub tile_matrix_labels: Option<Vec<String>>,
    pub times: Option<TimeIntervalCollection>,
    /// Static dimension values
    pub dimensions: BTreeMap<String, String>,
    pub subdomains: Vec<String>,
    pub minimum_level: u32,
    pub maximum_level: Option<u32>,
    pub rectangle: Rect<f64>,
    pub tiling_scheme: TilingScheme,
    pub tile_width: u32,
    pub tile_height: u32,
    pub credit: Option<Credits>,
}

impl WmtsSource {
    /// Dimension values in effect at `time`: static dimensions overlaid with
    /// the data of the interval containing `time`.
    pub fn dimensions_at(&self, time: Option<&DateTime<Utc>>) -> BTreeMap<String, String> {
        let mut dimensions = self.dimensions.clone();
        let interval = match (&self.times, time) {
            (Some(times), Some(time)) => times.find_at(time),
            _ => None,
        };
        if let Some(data) = interval.and_then(|i| i.data.as_ref()) {
            dimensions.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        dimensions
    }

    fn tile_matrix(&self, level: u32) -> String {
        self.tile_matrix_labels
            .as_ref()
            .and_then(|labels| labels.get(level as usize).cloned())
            .unwrap_or_else(|| level.to_string())
    }

    /// URL of one tile at the given clock time.
    pub fn tile_url(&self, x: u64, y: u64, level: u32, time: Option<&DateTime<Utc>>) -> Option<String> {
        if level < self.minimum_level || self.maximum_level.is_some_and(|max| level > max) {
            return None;
        }
        if x >= self.tiling_scheme.tiles_x(level) || y >= self.tiling_scheme.tiles_y(level) {
            return None;
        }
        let matrix = self.tile_matrix(level);
        let dimensions = self.dimensions_at(time);

        match &self.endpoint {
            WmtsEndpoint::Kvp(base) => {
                let mut url = base.clone();
                {
                    let mut query = url.query_pairs_mut();
                    query
                        .append_pair("service", "WMTS")
                        .append_pair("version", "1.0.0")
                        .append_pair("request", "GetTile")
                        .append_pair("tilematrix", &matrix)
                        .append_pair("layer", &self.layer)
                        .append_pair("style", &self.style)
                        .append_pair("tilerow", &y.to_string())
                        .append_pair("tilecol", &x.to_string())
                        .append_pair("tilematrixset", &self.tile_matrix_set_id)
                        .append_pair("format", &self.format);
                    for (name, value) in &dimensions {
                        query.append_pair(name, value);
                    }
                }
                Some(url.into())
            }
            WmtsEndpoint::Rest(template) => {
                let mut url = template
                    .replace("{TileMatrix}", &matrix)
                    .replace("{TileRow}", &y.to_string())
                    .replace("{TileCol}", &x.to_string())
                    .replace("{TileMatrixSet}", &self.tile_matrix_set_id)
                    .replace("{Style}", &self.style)
                    .replace("{Layer}", &self.layer);
                if let Some(sub) = self.subdomain(x, y, level) {
                    url = url.replace("{s}", sub);
                }
                for (name, value) in &dimensions {
                    url = url.replace(&format!("{{{name}}}"), value);
                }
                Some(url)
            }
        }
    }

    fn subdomain(&self, x: u64, y: u64, level: u32) -> Option<&str> {
        if self.subdomains.is_empty() {
            return None;
        }
        let index = (x + y + u64::from(level)) % self.subdomains.len() as u64;
        self.subdomains.get(index as usize).map(String::as_str)
    }
}

fn dimension_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn build(desc: &LayerDescriptor, params: &TimeDimensionedParams) -> Result<WmtsSource, ConstructionError> {
    let key = desc.key.as_str();
    let url = desc
        .url
        .as_deref()
        .ok_or_else(|| ConstructionError::missing(key, "url"))?;
    let layer = params
        .layer
        .clone()
        .ok_or_else(|| ConstructionError::missing(key, "layer"))?;

    let endpoint = if url.contains('{') {
        WmtsEndpoint::Rest(url.to_string())
    } else {
        WmtsEndpoint::Kvp(Url::parse(url).map_err(|e| ConstructionError::invalid(key, "url", e))?)
    };

    let times = match &params.times {
        Some(spec) => TimeIntervalCollection::from_spec(spec)
            .map_err(|e| ConstructionError::invalid(key, "times", e))?,
        None => None,
    };
    if let Some(times) = &times {
        debug!(layer = key, intervals = times.len(), "Bound time intervals to clock");
    }

    let rectangle = match params.rectangle {
        Some(extent) => {
            rect_from_degrees(extent).map_err(|e| ConstructionError::invalid(key, "rectangle", e))?
        }
        None => full_extent(),
    };

    Ok(WmtsSource {
        endpoint,
        layer,
        format: params.format.clone().unwrap_or_else(|| "image/png".to_string()),
        style: params.style.clone().unwrap_or_else(|| "default".to_string()),
        tile_matrix_set_id: params
            .tile_matrix_set_id
            .clone()
            .unwrap_or_else(|| "default028mm".to_string()),
        tile_matrix_labels: params.tile_matrix_labels.clone(),
        times,
        dimensions: params
            .dimensions
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), dimension_value(v)))
            .collect(),
        subdomains: params.subdomains.clone().unwrap_or_default().to_vec(),
        minimum_level: params.minimum_level.unwrap_or(0),
        maximum_level: params.maximum_level,
        rectangle,
        tiling_scheme: params.tiling_scheme.unwrap_or_default(),
        tile_width: params.tile_width.unwrap_or(256),
        tile_height: params.tile_height.unwrap_or(256),
        credit: desc.credits.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LayerParams;
    use crate::time_interval::parse_iso8601;

    fn source(json: &str) -> Result<WmtsSource, ConstructionError> {
        let desc: LayerDescriptor = serde_json::from_str(json).unwrap();
        let LayerParams::TimeDimensioned(params) = &desc.params else {
            panic!("wrong kind");
        };
        build(&desc, params)
    }

    #[test]
    fn test_requires_url_and_layer() {
        assert!(matches!(
            source(r#"{"type":"WebMapTileServiceImageryProvider","url":"http://h/wmts"}"#),
            Err(ConstructionError::MissingField { field: "layer", .. })
        ));
        assert!(matches!(
            source(r#"{"type":"WebMapTileServiceImageryProvider","layer":"L"}"#),
            Err(ConstructionError::MissingField { field: "url", .. })
        ));
    }

    #[test]
    fn test_kvp_defaults() {
        let s = source(r#"{"type":"WebMapTileServiceImageryProvider","url":"http://h/wmts","layer":"L"}"#).unwrap();
        assert_eq!(s.format, "image/png");
        assert_eq!(s.style, "default");
        assert_eq!(s.tile_matrix_set_id, "default028mm");
        let url = s.tile_url(0, 0, 0, None).unwrap();
        assert!(url.starts_with("http://h/wmts?service=WMTS"));
        assert!(url.contains("layer=L"));
        assert!(url.contains("format=image%2Fpng"));
    }

    #[test]
    fn test_rest_template_with_time_dimension() {
        let s = source(
            r#"{"type":"WebMapTileServiceImageryProvider",
                "url":"http://h/{Layer}/{Style}/{Time}/{TileMatrixSet}/{TileMatrix}/{TileRow}/{TileCol}.png",
                "layer":"sst",
                "tileMatrixSetID":"250m",
                "times":{"method":"fromIso8601","iso8601":"2024-01-01/2024-01-03/P1D",
                         "leadingInterval":false,"trailingInterval":false,
                         "dataCallback":"dataCallback"}}"#,
        )
        .unwrap();
        assert_eq!(s.times.as_ref().unwrap().len(), 2);

        let t = parse_iso8601("2024-01-02T12:00:00Z").unwrap();
        assert_eq!(
            s.tile_url(0, 0, 1, Some(&t)).as_deref(),
            Some("http://h/sst/default/2024-01-02T00:00:00Z/250m/1/0/0.png")
        );
        // outside the collection the placeholder has nothing to bind to
        let before = parse_iso8601("2023-06-01").unwrap();
        assert!(s.dimensions_at(Some(&before)).is_empty());
    }

    #[test]
    fn test_static_dimensions_and_labels() {
        let s = source(
            r#"{"type":"WebMapTileServiceImageryProvider","url":"http://h/{TileMatrix}/{Depth}",
                "layer":"L","tileMatrixLabels":["EPSG:0","EPSG:1"],"dimensions":{"Depth":10}}"#,
        )
        .unwrap();
        assert_eq!(s.tile_url(1, 0, 1, None).as_deref(), Some("http://h/EPSG:1/10"));
    }

    #[test]
    fn test_bad_interval_is_construction_error() {
        assert!(matches!(
            source(
                r#"{"type":"WebMapTileServiceImageryProvider","url":"http://h/w","layer":"L",
                    "times":{"method":"fromIso8601","iso8601":"garbage"}}"#
            ),
            Err(ConstructionError::Invalid { what: "times", .. })
        ));
    }
}
