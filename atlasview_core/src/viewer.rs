//! The viewer collaborator surface the engine drives.
//!
//! The rendering engine is external. It exposes a raster-layer stack, an
//! entity collection, a data-source collection, a shared clock with tick
//! notification, a media host for video textures and camera control. The
//! engine only ever talks to these traits, so the same code drives a real
//! renderer binding or the simulation viewer.

use crate::clock::ClockState;
use crate::descriptor::RasterProperty;
use crate::entity::{DataSource, Entity, MediaSpec};
use crate::loaders::RasterSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nalgebra::{Unit, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", &self.0.to_string()[..8])
            }
        }
    };
}

handle_type!(
    /// A layer in the raster stack.
    RasterHandle
);
handle_type!(
    /// An entity, either top-level or owned by a data source.
    EntityHandle
);
handle_type!(DataSourceHandle);
handle_type!(
    /// A media element backing a video texture.
    MediaHandle
);
handle_type!(
    /// A registered clock tick listener.
    ListenerId
);

/// Callback invoked with the clock state after every tick.
pub type TickListener = Arc<dyn Fn(&ClockState) + Send + Sync>;

/// Ordered stack of raster layers; later layers draw on top.
pub trait RasterStack: Send + Sync {
    fn add_raster(&self, source: RasterSource) -> RasterHandle;

    fn raise_to_top(&self, handle: RasterHandle);

    /// `None` for an unknown handle.
    fn raster_shown(&self, handle: RasterHandle) -> Option<bool>;

    fn set_raster_shown(&self, handle: RasterHandle, show: bool);

    fn set_raster_property(&self, handle: RasterHandle, property: RasterProperty, value: f64);
}

/// Top-level entities. Show flags also address entities owned by data
/// sources.
pub trait EntityCollection: Send + Sync {
    fn add_entity(&self, entity: Entity) -> EntityHandle;

    fn entity_shown(&self, handle: EntityHandle) -> Option<bool>;

    fn set_entity_shown(&self, handle: EntityHandle, show: bool);
}

/// Vector data sources, each owning a set of entities.
pub trait DataSourceCollection: Send + Sync {
    fn add_data_source(&self, source: DataSource) -> DataSourceHandle;

    /// Entities of the data source in document order.
    fn data_source_entities(&self, handle: DataSourceHandle) -> Vec<EntityHandle>;
}

/// The viewer's single shared simulation clock.
pub trait SharedClock: Send + Sync {
    fn clock(&self) -> ClockState;

    /// Replaces every clock field in one write.
    fn set_clock(&self, state: ClockState);

    /// Re-fits the timeline widget to `[start, stop]`.
    fn fit_timeline(&self, start: DateTime<Utc>, stop: DateTime<Utc>);

    fn add_tick_listener(&self, listener: TickListener) -> ListenerId;

    /// # Returns
    /// `true` if the listener was registered.
    fn remove_tick_listener(&self, id: ListenerId) -> bool;
}

/// Media elements used as video textures. Positions are in seconds.
pub trait MediaHost: Send + Sync {
    fn create_media(&self, spec: MediaSpec) -> MediaHandle;

    /// `None` until the media metadata is known.
    fn media_duration(&self, handle: MediaHandle) -> Option<f64>;

    fn media_position(&self, handle: MediaHandle) -> Option<f64>;

    fn seek_media(&self, handle: MediaHandle, seconds: f64);

    fn set_media_rate(&self, handle: MediaHandle, rate: f64);

    fn play_media(&self, handle: MediaHandle);

    fn pause_media(&self, handle: MediaHandle);

    fn media_paused(&self, handle: MediaHandle) -> bool;
}

/// Projection the scene is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SceneMode {
    #[default]
    Scene3D,
    Scene2D,
    Columbus,
}

pub trait CameraControl: Send + Sync {
    fn scene_mode(&self) -> SceneMode;

    /// Rotates the camera about `axis` through the globe centre.
    fn rotate_camera(&self, axis: &Unit<Vector3<f64>>, radians: f64);

    /// Pans right by `meters`; negative pans left.
    fn move_camera_right(&self, meters: f64);
}

/// Frame pacing and readiness of the rendering host.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Resolves once the viewer can accept layers.
    async fn ready(&self);

    /// Resolves at the next rendered frame with the time since the previous
    /// one. `None` once the viewer is torn down.
    async fn next_frame(&self) -> Option<Duration>;
}

/// Everything the engine needs from a viewer.
pub trait Viewer:
    RasterStack
    + EntityCollection
    + DataSourceCollection
    + SharedClock
    + MediaHost
    + CameraControl
    + FrameSource
    + 'static
{
}

impl<T> Viewer for T where
    T: RasterStack
        + EntityCollection
        + DataSourceCollection
        + SharedClock
        + MediaHost
        + CameraControl
        + FrameSource
        + 'static
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_short_display() {
        let a = RasterHandle::new();
        let b = RasterHandle::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 8);
    }
}
