//! Loader registry: one factory per overlay kind.
//!
//! Factories only build descriptions of what to insert; nothing touches the
//! viewer until every part of a layer (primary resource and optional
//! animated document) has been built. A failed build therefore leaves the
//! viewer unchanged.

pub mod czml;
pub mod single_tile;
pub mod tile_map;
pub mod url_template;
pub mod vector;
pub mod video_rect;
pub mod wmts;

pub use single_tile::SingleTileSource;
pub use tile_map::TileMapSource;
pub use url_template::UrlTemplateSource;
pub use video_rect::VideoRectangleSource;
pub use wmts::{WmtsEndpoint, WmtsSource};

use crate::descriptor::{Credits, LayerDescriptor, LayerKind, LayerParams};
use crate::entity::DataSource;
use crate::error::ConstructionError;
use crate::viewer::{DataSourceHandle, EntityHandle, MediaHandle, RasterHandle, Viewer};
use atlasview_env::AssetFetcher;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error};

/// A raster-stack entry.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterSource {
    SingleTile(SingleTileSource),
    TileMap(TileMapSource),
    UrlTemplate(UrlTemplateSource),
    TimeDimensioned(WmtsSource),
}

impl RasterSource {
    pub fn kind(&self) -> LayerKind {
        match self {
            RasterSource::SingleTile(_) => LayerKind::SingleTile,
            RasterSource::TileMap(_) => LayerKind::TileMap,
            RasterSource::UrlTemplate(_) => LayerKind::UrlTemplate,
            RasterSource::TimeDimensioned(_) => LayerKind::TimeDimensioned,
        }
    }

    pub fn credit(&self) -> Option<&Credits> {
        match self {
            RasterSource::SingleTile(s) => s.credit.as_ref(),
            RasterSource::TileMap(s) => s.credit.as_ref(),
            RasterSource::UrlTemplate(s) => s.credit.as_ref(),
            RasterSource::TimeDimensioned(s) => s.credit.as_ref(),
        }
    }

    /// URL of one tile; `time` is the shared clock's current time and only
    /// matters for time-dimensioned sources.
    pub fn tile_url(&self, x: u64, y: u64, level: u32, time: Option<&DateTime<Utc>>) -> Option<String> {
        match self {
            RasterSource::SingleTile(s) => (level == 0 && x == 0 && y == 0).then(|| s.url.clone()),
            RasterSource::TileMap(s) => s.tile_url(x, y, level),
            RasterSource::UrlTemplate(s) => s.tile_url(x, y, level),
            RasterSource::TimeDimensioned(s) => s.tile_url(x, y, level, time),
        }
    }
}

/// Output of a kind factory, not yet inserted.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerBuild {
    Raster(RasterSource),
    VideoRectangle(VideoRectangleSource),
    DataSource(DataSource),
}

/// The viewer object a layer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Raster(RasterHandle),
    Entity(EntityHandle),
    DataSource(DataSourceHandle),
}

/// A layer inserted into the viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedResource {
    pub kind: LayerKind,
    pub primitive: Primitive,
    /// Attached animated data source (from the `czml` document)
    pub animated: Option<DataSourceHandle>,
    /// Media element of a video rectangle
    pub media: Option<MediaHandle>,
}

/// Dispatches descriptors to the kind factories and inserts the result.
pub struct LoaderRegistry {
    fetcher: Arc<dyn AssetFetcher>,
}

impl LoaderRegistry {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { fetcher }
    }

    /// Runs the factory for the descriptor's kind.
    pub async fn build(&self, desc: &LayerDescriptor) -> Result<LayerBuild, ConstructionError> {
        let fetcher = self.fetcher.as_ref();
        let build = match &desc.params {
            LayerParams::Vector(p) => LayerBuild::DataSource(vector::build(desc, p, fetcher).await?),
            LayerParams::VideoRectangle(p) => LayerBuild::VideoRectangle(video_rect::build(desc, p)?),
            LayerParams::SingleTile(p) => {
                LayerBuild::Raster(RasterSource::SingleTile(single_tile::build(desc, p)?))
            }
            LayerParams::TileMap(p) => LayerBuild::Raster(RasterSource::TileMap(tile_map::build(desc, p)?)),
            LayerParams::UrlTemplate(p) => {
                LayerBuild::Raster(RasterSource::UrlTemplate(url_template::build(desc, p)?))
            }
            LayerParams::TimeDimensioned(p) => {
                LayerBuild::Raster(RasterSource::TimeDimensioned(wmts::build(desc, p)?))
            }
        };
        Ok(build)
    }

    /// Builds the primary resource and the animated document concurrently,
    /// then inserts both.
    ///
    /// # Returns
    /// `None` (logged) when either build fails; the viewer is untouched.
    pub async fn construct<V>(&self, viewer: &V, desc: &LayerDescriptor) -> Option<LoadedResource>
    where
        V: Viewer + ?Sized,
    {
        let key = desc.key.as_str();
        let (primary, animated) =
            futures::join!(self.build(desc), czml::build(desc, self.fetcher.as_ref()));

        let primary = match primary {
            Ok(build) => build,
            Err(e) => {
                error!(layer = key, error = %e, "Failed to load layer");
                return None;
            }
        };
        let animated = match animated {
            Ok(animated) => animated,
            Err(e) => {
                error!(layer = key, error = %e, "Failed to load animated document");
                return None;
            }
        };

        let mut resource = insert(viewer, desc, primary);
        if let Some(source) = animated {
            resource.animated = Some(viewer.add_data_source(source));
        }

        if let (Some(colors), Primitive::Raster(handle)) = (&desc.color_properties, resource.primitive) {
            for (property, value) in colors.entries() {
                viewer.set_raster_property(handle, property, value);
            }
            debug!(layer = key, "Applied color properties");
        }

        debug!(layer = key, kind = %resource.kind, "Loaded layer");
        Some(resource)
    }
}

fn insert<V>(viewer: &V, desc: &LayerDescriptor, build: LayerBuild) -> LoadedResource
where
    V: Viewer + ?Sized,
{
    let kind = desc.kind();
    match build {
        LayerBuild::Raster(source) => {
            let handle = viewer.add_raster(source);
            viewer.raise_to_top(handle);
            LoadedResource {
                kind,
                primitive: Primitive::Raster(handle),
                animated: None,
                media: None,
            }
        }
        LayerBuild::VideoRectangle(source) => {
            let media = viewer.create_media(source.media.clone());
            let entity = source.into_entity(desc.key.as_str(), media);
            LoadedResource {
                kind,
                primitive: Primitive::Entity(viewer.add_entity(entity)),
                animated: None,
                media: Some(media),
            }
        }
        LayerBuild::DataSource(source) => LoadedResource {
            kind,
            primitive: Primitive::DataSource(viewer.add_data_source(source)),
            animated: None,
            media: None,
        },
    }
}
