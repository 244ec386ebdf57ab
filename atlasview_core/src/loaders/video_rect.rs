//! Video-textured rectangles.

use crate::descriptor::{full_extent, rect_from_degrees, LayerDescriptor, VideoRectangleParams};
use crate::entity::{Entity, EntityGraphics, MediaSpec, VideoMaterial};
use crate::error::ConstructionError;
use crate::viewer::MediaHandle;
use geo::Rect;

/// A rectangle entity waiting for its media element.
///
/// The media element is created by the viewer at insertion time, so the
/// factory hands back the spec and [`VideoRectangleSource::into_entity`]
/// finishes the entity once the handle exists.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRectangleSource {
    pub name: String,
    pub coordinates: Rect<f64>,
    pub repeat: [f64; 2],
    pub media: MediaSpec,
}

impl VideoRectangleSource {
    pub fn into_entity(self, id: &str, media: MediaHandle) -> Entity {
        Entity::new(
            id,
            EntityGraphics::VideoRectangle {
                coordinates: self.coordinates,
                material: VideoMaterial {
                    media,
                    repeat: self.repeat,
                },
            },
        )
        .with_name(self.name)
    }
}

pub fn build(
    desc: &LayerDescriptor,
    params: &VideoRectangleParams,
) -> Result<VideoRectangleSource, ConstructionError> {
    let key = desc.key.as_str();
    let url = desc
        .url
        .as_deref()
        .ok_or_else(|| ConstructionError::missing(key, "url"))?;

    let coordinates = match params.rectangle {
        Some(extent) => {
            rect_from_degrees(extent).map_err(|e| ConstructionError::invalid(key, "rectangle", e))?
        }
        None => full_extent(),
    };

    Ok(VideoRectangleSource {
        name: desc
            .title
            .clone()
            .unwrap_or_else(|| "ImageMaterialProperty".to_string()),
        coordinates,
        repeat: params.repeat.unwrap_or([1.0, 1.0]),
        media: MediaSpec {
            src: url.to_string(),
            looping: params.loop_content.unwrap_or(true),
            muted: params.muted.unwrap_or(true),
            playback_rate: params.playback_rate.unwrap_or(1.0),
        },
    })
}
