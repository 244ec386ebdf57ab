//! AtlasView Core - Layer Orchestration and Temporal Sync for Geospatial Viewers
//!
//! This library turns a manifest of layer descriptors into live overlays on
//! a 3D/2D globe viewer and keeps them in step with one shared clock:
//! 1. **Manifest resolution**: descriptors fetched concurrently, reassembled in manifest order
//! 2. **Loading**: six overlay kinds built off-viewer and inserted atomically
//! 3. **Temporal sync**: clock configuration, time-dimensioned tiles and video playback
//! 4. **Lifecycle**: cached activation, visibility toggles and the legend panel
//!
//! The viewer itself is a collaborator behind the traits in [`viewer`].

pub mod camera;
pub mod clock;
pub mod color;
pub mod config;
pub mod descriptor;
pub mod entity;
pub mod error;
pub mod legend;
pub mod lifecycle;
pub mod loaders;
pub mod manifest;
pub mod time_interval;
pub mod video;
pub mod viewer;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use camera::CameraSpin;
pub use clock::{ClockConfig, ClockRange, ClockState, ClockStep, ClockSynchronizer};
pub use config::EngineConfig;
pub use descriptor::{LayerDescriptor, LayerKey, LayerKind, LayerParams};
pub use error::{ClockApplyError, ConstructionError, IntervalError, ResolutionError};
pub use legend::{ActiveLegend, LegendKind, LegendSelector, LegendSpec};
pub use lifecycle::{Activation, LayerManager, LayerState, ToggleOutcome};
pub use loaders::{LoadedResource, LoaderRegistry, Primitive, RasterSource};
pub use manifest::{LayerCatalog, Manifest, ManifestResolver};
pub use time_interval::{TimeInterval, TimeIntervalCollection};
pub use video::VideoSynchronizer;
pub use viewer::Viewer;
