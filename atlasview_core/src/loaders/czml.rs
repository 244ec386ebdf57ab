//! Secondary time-animated vector documents (CZML packet arrays).

use crate::descriptor::LayerDescriptor;
use crate::entity::{DataSource, DataSourceFormat, Entity, EntityGraphics, SampledPosition};
use crate::error::ConstructionError;
use crate::time_interval::parse_iso8601;
use atlasview_env::{AssetFetcher, Url};
use nalgebra::Point3;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Packet {
    id: Option<String>,
    name: Option<String>,
    availability: Option<String>,
    position: Option<PositionPacket>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionPacket {
    epoch: Option<String>,
    #[serde(default)]
    cartographic_degrees: Vec<f64>,
}

/// Fetches and parses the layer's `czml` document, if it has one.
pub async fn build(
    desc: &LayerDescriptor,
    fetcher: &dyn AssetFetcher,
) -> Result<Option<DataSource>, ConstructionError> {
    let key = desc.key.as_str();
    let url = match desc.czml.as_deref() {
        Some(url) => url,
        None => return Ok(None),
    };
    let parsed = Url::parse(url).map_err(|e| ConstructionError::invalid(key, "czml", e))?;
    let body = fetcher
        .fetch_text(&parsed)
        .await
        .map_err(|source| ConstructionError::Fetch {
            key: key.to_string(),
            url: url.to_string(),
            source,
        })?;

    let source = parse_document(key, &body).map_err(|e| ConstructionError::invalid(key, "czml", e))?;
    debug!(layer = key, entities = source.entities.len(), "CZML data source loaded");
    Ok(Some(source))
}

/// Parses a packet array. The `document` packet names the source; every
/// other packet with an id becomes one entity.
pub fn parse_document(key: &str, body: &str) -> Result<DataSource, String> {
    let packets: Vec<Packet> = serde_json::from_str(body).map_err(|e| e.to_string())?;

    let mut name = key.to_string();
    let mut entities = Vec::new();
    for packet in packets {
        let id = match packet.id {
            Some(id) => id,
            None => continue,
        };
        if id == "document" {
            if let Some(doc_name) = packet.name {
                name = doc_name;
            }
            continue;
        }

        let graphics = match packet.position {
            Some(position) => EntityGraphics::Animated {
                position: sampled_position(&id, &position)?,
            },
            None => EntityGraphics::Empty,
        };
        let mut entity = Entity::new(id, graphics);
        entity.name = packet.name;
        entity.properties = packet.properties;
        if let Some(span) = packet.availability {
            entity.availability = Some(availability(&span)?);
        }
        entities.push(entity);
    }

    Ok(DataSource {
        name,
        format: DataSourceFormat::Czml,
        entities,
        credit: None,
    })
}

fn availability(span: &str) -> Result<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>), String> {
    let (start, stop) = span
        .split_once('/')
        .ok_or_else(|| format!("availability '{span}' is not an interval"))?;
    let start = parse_iso8601(start).map_err(|e| e.to_string())?;
    let stop = parse_iso8601(stop).map_err(|e| e.to_string())?;
    Ok((start, stop))
}

fn sampled_position(id: &str, packet: &PositionPacket) -> Result<SampledPosition, String> {
    let epoch = packet
        .epoch
        .as_deref()
        .map(parse_iso8601)
        .transpose()
        .map_err(|e| e.to_string())?;
    let values = &packet.cartographic_degrees;

    let samples = match (epoch.is_some(), values.len()) {
        (false, 3) => vec![(0.0, Point3::new(values[0], values[1], values[2]))],
        (true, n) if n % 4 == 0 && n > 0 => values
            .chunks_exact(4)
            .map(|c| (c[0], Point3::new(c[1], c[2], c[3])))
            .collect(),
        _ => return Err(format!("packet {id}: malformed cartographicDegrees")),
    };
    Ok(SampledPosition { epoch, samples })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"[
        {"id": "document", "name": "ISS track", "version": "1.0"},
        {"id": "iss", "name": "ISS",
         "availability": "2024-01-01T00:00:00Z/2024-01-01T01:00:00Z",
         "position": {"epoch": "2024-01-01T00:00:00Z",
                      "cartographicDegrees": [0, 10, 20, 400000, 60, 11, 21, 400000]}},
        {"id": "ground", "position": {"cartographicDegrees": [5, 50, 0]}},
        {"name": "no id, skipped"}
    ]"#;

    #[test]
    fn test_packets_become_entities() {
        let ds = parse_document("iss_layer", DOC).unwrap();
        assert_eq!(ds.name, "ISS track");
        assert_eq!(ds.format, DataSourceFormat::Czml);
        assert_eq!(ds.entities.len(), 2);
        assert!(ds.entities[0].availability.is_some());
        match &ds.entities[0].graphics {
            EntityGraphics::Animated { position } => assert_eq!(position.samples.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_document_name_defaults_to_key() {
        let ds = parse_document("k", r#"[{"id":"a"}]"#).unwrap();
        assert_eq!(ds.name, "k");
        assert_eq!(ds.entities[0].graphics, EntityGraphics::Empty);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(parse_document("k", r#"{"id":"a"}"#).is_err());
        assert!(parse_document(
            "k",
            r#"[{"id":"a","position":{"epoch":"2024-01-01","cartographicDegrees":[1,2,3]}}]"#
        )
        .is_err());
        assert!(parse_document("k", r#"[{"id":"a","availability":"2024-01-01"}]"#).is_err());
    }
}
