//! Entities, data sources and media specs handed to the viewer.

use crate::color::Color;
use crate::descriptor::Credits;
use crate::viewer::MediaHandle;
use chrono::{DateTime, Utc};
use geo::{Geometry, Rect};
use nalgebra::Point3;
use serde_json::{Map, Value};

/// Styling applied to vector features.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStyle {
    pub marker_size: f64,
    pub marker_symbol: Option<String>,
    pub marker_color: Color,
    pub stroke: Color,
    pub stroke_width: f64,
    pub fill: Color,
    pub clamp_to_ground: bool,
}

impl Default for FeatureStyle {
    fn default() -> Self {
        Self {
            marker_size: 48.0,
            marker_symbol: None,
            marker_color: Color::rgb8(0x43, 0x6e, 0xff),
            stroke: Color::BLACK,
            stroke_width: 2.0,
            fill: Color::rgba8(0xff, 0xff, 0x00, 0x80),
            clamp_to_ground: false,
        }
    }
}

/// Video texture on a rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMaterial {
    pub media: MediaHandle,
    pub repeat: [f64; 2],
}

/// Position over time: `(offset seconds from epoch, lon°, lat°, height m)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledPosition {
    pub epoch: Option<DateTime<Utc>>,
    pub samples: Vec<(f64, Point3<f64>)>,
}

impl SampledPosition {
    /// Linearly interpolated position at `time`, clamped to the sample range.
    pub fn at(&self, time: &DateTime<Utc>) -> Option<Point3<f64>> {
        let first = self.samples.first()?;
        let offset = match self.epoch {
            Some(epoch) => (*time - epoch).num_milliseconds() as f64 / 1000.0,
            None => return Some(first.1),
        };

        let after = self.samples.iter().position(|(t, _)| *t > offset);
        match after {
            Some(0) => Some(first.1),
            None => self.samples.last().map(|(_, p)| *p),
            Some(i) => {
                let (t0, p0) = self.samples[i - 1];
                let (t1, p1) = self.samples[i];
                let f = (offset - t0) / (t1 - t0);
                Some(p0 + (p1 - p0) * f)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityGraphics {
    /// A GeoJSON feature geometry
    Feature { geometry: Geometry<f64>, style: FeatureStyle },
    /// A video-textured rectangle
    VideoRectangle { coordinates: Rect<f64>, material: VideoMaterial },
    /// A time-animated point
    Animated { position: SampledPosition },
    /// Packet with no drawable graphics
    Empty,
}

/// One drawable entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub name: Option<String>,
    pub show: bool,
    /// Time span the entity exists in, unbounded when absent
    pub availability: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub graphics: EntityGraphics,
    pub properties: Map<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>, graphics: EntityGraphics) -> Self {
        Self {
            id: id.into(),
            name: None,
            show: true,
            availability: None,
            graphics,
            properties: Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_available(&self, time: &DateTime<Utc>) -> bool {
        match &self.availability {
            Some((start, stop)) => time >= start && time <= stop,
            None => true,
        }
    }
}

/// Where a data source came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceFormat {
    GeoJson,
    Czml,
}

/// A named set of entities.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub name: String,
    pub format: DataSourceFormat,
    pub entities: Vec<Entity>,
    /// Attribution shown by the viewer while the source is visible
    pub credit: Option<Credits>,
}

/// Media element to create for a video texture.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSpec {
    pub src: String,
    pub looping: bool,
    pub muted: bool,
    pub playback_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_interval::parse_iso8601;

    #[test]
    fn test_sampled_position_interpolates_and_clamps() {
        let epoch = parse_iso8601("2024-01-01T00:00:00Z").unwrap();
        let track = SampledPosition {
            epoch: Some(epoch),
            samples: vec![
                (0.0, Point3::new(0.0, 0.0, 0.0)),
                (10.0, Point3::new(10.0, 20.0, 100.0)),
            ],
        };

        let mid = track.at(&parse_iso8601("2024-01-01T00:00:05Z").unwrap()).unwrap();
        approx::assert_relative_eq!(mid.x, 5.0);
        approx::assert_relative_eq!(mid.z, 50.0);

        let before = track.at(&parse_iso8601("2023-12-31T23:00:00Z").unwrap()).unwrap();
        assert_eq!(before, Point3::new(0.0, 0.0, 0.0));
        let after = track.at(&parse_iso8601("2024-01-02T00:00:00Z").unwrap()).unwrap();
        assert_eq!(after, Point3::new(10.0, 20.0, 100.0));
    }

    #[test]
    fn test_availability() {
        let mut e = Entity::new("sat", EntityGraphics::Empty);
        let t = parse_iso8601("2024-01-01T12:00:00Z").unwrap();
        assert!(e.is_available(&t));
        e.availability = Some((
            parse_iso8601("2024-01-02").unwrap(),
            parse_iso8601("2024-01-03").unwrap(),
        ));
        assert!(!e.is_available(&t));
    }
}
