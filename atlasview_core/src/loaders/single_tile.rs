//! Single-image raster covering one rectangle.

use crate::descriptor::{full_extent, rect_from_degrees, Credits, LayerDescriptor, SingleTileParams};
use crate::error::ConstructionError;
use geo::Rect;

#[derive(Debug, Clone, PartialEq)]
pub struct SingleTileSource {
    pub url: String,
    pub rectangle: Rect<f64>,
    /// Taken from the image when absent
    pub tile_width: Option<u32>,
    pub tile_height: Option<u32>,
    pub credit: Option<Credits>,
}

pub fn build(
    desc: &LayerDescriptor,
    params: &SingleTileParams,
) -> Result<SingleTileSource, ConstructionError> {
    let key = desc.key.as_str();
    let url = desc
        .url
        .as_deref()
        .ok_or_else(|| ConstructionError::missing(key, "url"))?;
    let rectangle = match params.rectangle {
        Some(extent) => {
            rect_from_degrees(extent).map_err(|e| ConstructionError::invalid(key, "rectangle", e))?
        }
        None => full_extent(),
    };

    Ok(SingleTileSource {
        url: url.to_string(),
        rectangle,
        tile_width: params.tile_width,
        tile_height: params.tile_height,
        credit: desc.credits.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::LayerParams;

    #[test]
    fn test_single_tile_extent() {
        let desc: LayerDescriptor = serde_json::from_str(
            r#"{"type":"SingleTileImageryProvider","url":"http://h/sst.png","rectangle":[-10,30,40,70]}"#,
        )
        .unwrap();
        let LayerParams::SingleTile(params) = &desc.params else {
            panic!("wrong kind");
        };
        let source = build(&desc, params).unwrap();
        assert_eq!(source.rectangle.max().y, 70.0);
        assert!(source.tile_width.is_none());

        let mut no_url = desc.clone();
        no_url.url = None;
        assert!(build(&no_url, params).is_err());
    }
}
