//! Tile Map Service pyramids (`{base}/{level}/{x}/{row}.{ext}`).

use crate::descriptor::{full_extent, rect_from_degrees, Credits, LayerDescriptor, TileMapParams, TilingScheme};
use crate::error::ConstructionError;
use geo::Rect;

#[derive(Debug, Clone, PartialEq)]
pub struct TileMapSource {
    pub url: String,
    pub file_extension: String,
    pub minimum_level: u32,
    pub maximum_level: Option<u32>,
    pub rectangle: Rect<f64>,
    pub tiling_scheme: TilingScheme,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Rows are addressed top-down instead of the TMS bottom-up convention
    pub flip_xy: bool,
    pub credit: Option<Credits>,
}

impl TileMapSource {
    /// URL of one tile, `None` outside the level range or the grid.
    pub fn tile_url(&self, x: u64, y: u64, level: u32) -> Option<String> {
        if level < self.minimum_level || self.maximum_level.is_some_and(|max| level > max) {
            return None;
        }
        let rows = self.tiling_scheme.tiles_y(level);
        if x >= self.tiling_scheme.tiles_x(level) || y >= rows {
            return None;
        }
        let row = if self.flip_xy { y } else { rows - 1 - y };
        Some(format!(
            "{}/{}/{}/{}.{}",
            self.url.trim_end_matches('/'),
            level,
            x,
            row,
            self.file_extension
        ))
    }
}

pub fn build(desc: &LayerDescriptor, params: &TileMapParams) -> Result<TileMapSource, ConstructionError> {
    let key = desc.key.as_str();
    let url = desc
        .url
        .as_deref()
        .ok_or_else(|| ConstructionError::missing(key, "url"))?;

    let minimum_level = params.minimum_level.unwrap_or(0);
    if let Some(max) = params.maximum_level {
        if max < minimum_level {
            return Err(ConstructionError::invalid(
                key,
                "maximumLevel",
                format!("{max} is below minimumLevel {minimum_level}"),
            ));
        }
    }
    let rectangle = match params.rectangle {
        Some(extent) => {
            rect_from_degrees(extent).map_err(|e| ConstructionError::invalid(key, "rectangle", e))?
        }
        None => full_extent(),
    };

    Ok(TileMapSource {
        url: url.to_string(),
        file_extension: params
            .file_extension
            .clone()
            .unwrap_or_else(|| "png".to_string()),
        minimum_level,
        maximum_level: params.maximum_level,
        rectangle,
        tiling_scheme: params.tiling_scheme.unwrap_or_default(),
        tile_width: params.tile_width.unwrap_or(256),
        tile_height: params.tile_height.unwrap_or(256),
        flip_xy: params.flip_xy.unwrap_or(false),
        credit: desc.credits.clone(),
    })
}
