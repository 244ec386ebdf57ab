//! GeoJSON vector overlays.

use crate::color::Color;
use crate::descriptor::{LayerDescriptor, VectorParams};
use crate::entity::{DataSource, DataSourceFormat, Entity, EntityGraphics, FeatureStyle};
use crate::error::ConstructionError;
use atlasview_env::{AssetFetcher, Url};
use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Fetches the GeoJSON document and turns every feature into an entity.
pub async fn build(
    desc: &LayerDescriptor,
    params: &VectorParams,
    fetcher: &dyn AssetFetcher,
) -> Result<DataSource, ConstructionError> {
    let key = desc.key.as_str();
    let url = desc
        .url
        .as_deref()
        .ok_or_else(|| ConstructionError::missing(key, "url"))?;
    let parsed = Url::parse(url).map_err(|e| ConstructionError::invalid(key, "url", e))?;

    let body = fetcher
        .fetch_text(&parsed)
        .await
        .map_err(|source| ConstructionError::Fetch {
            key: key.to_string(),
            url: url.to_string(),
            source,
        })?;
    let document: Value =
        serde_json::from_str(&body).map_err(|e| ConstructionError::invalid(key, "GeoJSON", e))?;

    let style = style_from(key, params);
    let features =
        parse_features(&document).map_err(|e| ConstructionError::invalid(key, "GeoJSON", e))?;

    let entities = features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let id = feature.id.unwrap_or_else(|| format!("{key}-{i}"));
            let name = ["title", "name"]
                .iter()
                .find_map(|k| feature.properties.get(*k).and_then(Value::as_str))
                .map(str::to_string);
            let graphics = match feature.geometry {
                Some(geometry) => EntityGraphics::Feature {
                    geometry,
                    style: style.clone(),
                },
                None => EntityGraphics::Empty,
            };
            let mut entity = Entity::new(id, graphics);
            entity.name = name;
            entity.properties = feature.properties;
            entity
        })
        .collect::<Vec<_>>();

    debug!(layer = key, entities = entities.len(), "Created GeoJSON data source");
    Ok(DataSource {
        name: source_name(params.source_uri.as_deref().unwrap_or(url)),
        format: DataSourceFormat::GeoJson,
        entities,
        credit: desc.credits.clone(),
    })
}

fn source_name(uri: &str) -> String {
    let bare = uri.split(['?', '#']).next().unwrap_or(uri);
    bare.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(bare)
        .to_string()
}

fn style_from(key: &str, params: &VectorParams) -> FeatureStyle {
    let defaults = FeatureStyle::default();
    let color = |field: &str, value: &Option<String>, fallback: Color| match value {
        None => fallback,
        Some(raw) => Color::parse(raw).unwrap_or_else(|| {
            warn!(layer = key, field, value = %raw, "Malformed color, using default");
            fallback
        }),
    };

    FeatureStyle {
        marker_size: params.marker_size.unwrap_or(defaults.marker_size),
        marker_symbol: params.marker_symbol.clone(),
        marker_color: color("markerColor", &params.marker_color, defaults.marker_color),
        stroke: color("stroke", &params.stroke, defaults.stroke),
        stroke_width: params.stroke_width.unwrap_or(defaults.stroke_width),
        fill: color("fill", &params.fill, defaults.fill),
        clamp_to_ground: params.clamp_to_ground.unwrap_or(false),
    }
}

/// A parsed GeoJSON feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub geometry: Option<Geometry<f64>>,
    pub properties: Map<String, Value>,
}

/// Accepts a FeatureCollection, a single Feature or a bare geometry.
pub fn parse_features(document: &Value) -> Result<Vec<Feature>, String> {
    match type_of(document)? {
        "FeatureCollection" => document
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| "FeatureCollection without features array".to_string())?
            .iter()
            .map(parse_feature)
            .collect(),
        "Feature" => Ok(vec![parse_feature(document)?]),
        _ => Ok(vec![Feature {
            id: None,
            geometry: Some(parse_geometry(document)?),
            properties: Map::new(),
        }]),
    }
}

fn type_of(value: &Value) -> Result<&str, String> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| "object without a type".to_string())
}

fn parse_feature(value: &Value) -> Result<Feature, String> {
    if type_of(value)? != "Feature" {
        return Err("expected a Feature".to_string());
    }
    let id = match value.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    let geometry = match value.get("geometry") {
        None | Some(Value::Null) => None,
        Some(g) => Some(parse_geometry(g)?),
    };
    let properties = value
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(Feature {
        id,
        geometry,
        properties,
    })
}

/// Parses a GeoJSON geometry object.
pub fn parse_geometry(value: &Value) -> Result<Geometry<f64>, String> {
    let kind = type_of(value)?;
    if kind == "GeometryCollection" {
        let members = value
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| "GeometryCollection without geometries".to_string())?
            .iter()
            .map(parse_geometry)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Geometry::GeometryCollection(GeometryCollection(members)));
    }

    let coords = value
        .get("coordinates")
        .ok_or_else(|| format!("{kind} without coordinates"))?;
    let geometry = match kind {
        "Point" => Geometry::Point(Point::from(position(coords)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint::new(
            positions(coords)?.into_iter().map(Point::from).collect(),
        )),
        "LineString" => Geometry::LineString(LineString::new(positions(coords)?)),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString::new(
            array(coords)?
                .iter()
                .map(|line| positions(line).map(LineString::new))
                .collect::<Result<_, _>>()?,
        )),
        "Polygon" => Geometry::Polygon(polygon(coords)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon::new(
            array(coords)?.iter().map(polygon).collect::<Result<_, _>>()?,
        )),
        other => return Err(format!("unsupported geometry type {other}")),
    };
    Ok(geometry)
}

fn array(value: &Value) -> Result<&Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| "coordinates must be arrays".to_string())
}

fn position(value: &Value) -> Result<Coord<f64>, String> {
    let parts = array(value)?;
    let x = parts.first().and_then(Value::as_f64);
    let y = parts.get(1).and_then(Value::as_f64);
    match (x, y) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err("position needs two numbers".to_string()),
    }
}

fn positions(value: &Value) -> Result<Vec<Coord<f64>>, String> {
    array(value)?.iter().map(position).collect()
}

fn polygon(value: &Value) -> Result<Polygon<f64>, String> {
    let mut rings = array(value)?
        .iter()
        .map(|ring| positions(ring).map(LineString::new));
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon without exterior ring".to_string())??;
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}
