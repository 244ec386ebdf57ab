//! Layer lifecycle: activation, caching and visibility toggling.
//!
//! Per key the state machine is `absent → loaded-active ⇄ loaded-inactive`.
//! A key is cached for good once its first activation succeeds. Default
//! layers are activated at startup and never toggle afterwards.
//!
//! Concurrent activations of the same uncached key share one in-flight
//! construction instead of racing two.

use crate::clock::ClockSynchronizer;
use crate::config::EngineConfig;
use crate::descriptor::{LayerDescriptor, LayerKey};
use crate::legend::{ActiveLegend, LegendSelector};
use crate::loaders::{LoadedResource, LoaderRegistry, Primitive};
use crate::manifest::LayerCatalog;
use crate::video::VideoSynchronizer;
use crate::viewer::Viewer;
use atlasview_env::{AssetFetcher, AtlasContext};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

type InFlight = Shared<BoxFuture<'static, Option<LoadedResource>>>;

/// Observable state of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Absent,
    Loading,
    Active,
    Inactive,
}

/// Result of a toggle request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Default layers ignore toggles
    Locked,
    /// Key is not in the catalog
    Unknown,
    /// First activation succeeded
    Activated,
    /// First activation failed; the key stays absent
    ActivationFailed,
    Shown,
    Hidden,
}

/// Result of one activation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated,
    AlreadyLoaded,
    Failed,
}

#[derive(Debug, Clone)]
struct LoadedLayer {
    resource: LoadedResource,
    active: bool,
    primary_shown: bool,
    animated_shown: bool,
}

#[derive(Default)]
struct ManagerState {
    loaded: HashMap<LayerKey, LoadedLayer>,
    in_flight: HashMap<LayerKey, InFlight>,
    legend: LegendSelector,
}

/// Owns every layer's lifecycle for one viewer.
pub struct LayerManager<V: Viewer, C: AtlasContext> {
    viewer: Arc<V>,
    catalog: LayerCatalog,
    registry: Arc<LoaderRegistry>,
    clock: ClockSynchronizer<C>,
    video: VideoSynchronizer<V>,
    state: Mutex<ManagerState>,
}

impl<V: Viewer, C: AtlasContext> LayerManager<V, C> {
    pub fn new(
        viewer: Arc<V>,
        ctx: Arc<C>,
        fetcher: Arc<dyn AssetFetcher>,
        catalog: LayerCatalog,
        config: &EngineConfig,
    ) -> Self {
        Self {
            video: VideoSynchronizer::new(viewer.clone(), config.video_tolerance_secs),
            viewer,
            catalog,
            registry: Arc::new(LoaderRegistry::new(fetcher)),
            clock: ClockSynchronizer::new(ctx),
            state: Mutex::new(ManagerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    pub fn viewer(&self) -> &Arc<V> {
        &self.viewer
    }

    pub fn video(&self) -> &VideoSynchronizer<V> {
        &self.video
    }

    /// Waits for the viewer, then activates default layers one after the
    /// other and startup layers concurrently.
    pub async fn start(&self) {
        self.viewer.ready().await;

        for key in self.catalog.default_keys() {
            self.activate(key).await;
        }
        let startup = self.catalog.startup_keys().iter().map(|key| self.activate(key));
        let results = join_all(startup).await;

        let failed = results.iter().filter(|r| **r == Activation::Failed).count();
        info!(
            defaults = self.catalog.default_keys().len(),
            startup = results.len(),
            failed,
            "Startup layers activated"
        );
    }

    /// Activates `key` if it is not loaded yet.
    pub async fn activate(&self, key: &LayerKey) -> Activation {
        let desc = match self.catalog.get(key.as_str()) {
            Some(desc) => desc.clone(),
            None => {
                warn!(layer = %key, "Activation of unknown layer");
                return Activation::Failed;
            }
        };

        let (construction, leader) = {
            let mut state = self.lock();
            if state.loaded.contains_key(key) {
                return Activation::AlreadyLoaded;
            }
            match state.in_flight.get(key) {
                Some(shared) => (shared.clone(), false),
                None => {
                    let registry = self.registry.clone();
                    let viewer = self.viewer.clone();
                    let owned = desc.clone();
                    let shared = async move { registry.construct(viewer.as_ref(), &owned).await }
                        .boxed()
                        .shared();
                    state.in_flight.insert(key.clone(), shared.clone());
                    (shared, true)
                }
            }
        };

        if leader {
            if let Some(config) = desc.synced_clock() {
                self.clock.apply_logged(self.viewer.as_ref(), key.as_str(), Some(config));
            }
        } else {
            debug!(layer = %key, "Joining in-flight activation");
        }

        let result = construction.clone().await;

        let resource = {
            let mut state = self.lock();
            // A retry may already have registered a newer construction.
            if state.in_flight.get(key).is_some_and(|current| current.ptr_eq(&construction)) {
                state.in_flight.remove(key);
            }
            let resource = match result {
                Some(resource) => resource,
                None => return Activation::Failed,
            };
            if state.loaded.contains_key(key) {
                return Activation::AlreadyLoaded;
            }
            state.loaded.insert(
                key.clone(),
                LoadedLayer {
                    resource: resource.clone(),
                    active: true,
                    primary_shown: true,
                    animated_shown: true,
                },
            );
            state.legend.on_activated(key, desc.legend.as_ref());
            resource
        };

        self.video.update(&desc, &resource, true);
        info!(layer = %key, kind = %desc.kind(), "Layer activated");
        Activation::Activated
    }

    /// Handles a user toggle for `key`.
    pub async fn toggle(&self, key: &LayerKey) -> ToggleOutcome {
        let desc = match self.catalog.get(key.as_str()) {
            Some(desc) => desc.clone(),
            None => return ToggleOutcome::Unknown,
        };
        if desc.is_default {
            debug!(layer = %key, "Default layer ignores toggle");
            return ToggleOutcome::Locked;
        }

        let loaded = self.lock().loaded.contains_key(key);
        if !loaded {
            return match self.activate(key).await {
                Activation::Failed => ToggleOutcome::ActivationFailed,
                Activation::Activated => ToggleOutcome::Activated,
                // Lost a race with a concurrent activation; that one counts.
                Activation::AlreadyLoaded => ToggleOutcome::Activated,
            };
        }

        let Some((visible, resource)) = self.flip(&desc) else {
            return ToggleOutcome::Unknown;
        };
        self.video.update(&desc, &resource, visible);
        if visible {
            ToggleOutcome::Shown
        } else {
            ToggleOutcome::Hidden
        }
    }

    fn flip(&self, desc: &Arc<LayerDescriptor>) -> Option<(bool, LoadedResource)> {
        let key = &desc.key;
        let viewer = self.viewer.as_ref();
        let mut guard = self.lock();
        let state = &mut *guard;
        let entry = state.loaded.get_mut(key)?;

        let primary = !entry.primary_shown;
        let animated_entities = entry
            .resource
            .animated
            .map(|ds| viewer.data_source_entities(ds))
            .unwrap_or_default();
        let visible = if animated_entities.is_empty() {
            primary
        } else {
            !entry.animated_shown
        };

        if visible {
            if let Some(config) = desc.synced_clock() {
                self.clock.apply_logged(viewer, key.as_str(), Some(config));
            }
        }

        match entry.resource.primitive {
            Primitive::Raster(handle) => {
                viewer.set_raster_shown(handle, primary);
                if primary {
                    viewer.raise_to_top(handle);
                }
            }
            Primitive::Entity(handle) => viewer.set_entity_shown(handle, primary),
            Primitive::DataSource(handle) => {
                for entity in viewer.data_source_entities(handle) {
                    viewer.set_entity_shown(entity, primary);
                }
            }
        }
        entry.primary_shown = primary;
        if !animated_entities.is_empty() {
            for entity in animated_entities {
                viewer.set_entity_shown(entity, visible);
            }
            entry.animated_shown = visible;
        }
        entry.active = visible;
        let resource = entry.resource.clone();

        if visible {
            state.legend.on_activated(key, desc.legend.as_ref());
        } else {
            let still_active: Vec<_> = self
                .catalog
                .iter()
                .filter(|d| d.key != *key)
                .filter(|d| state.loaded.get(&d.key).is_some_and(|l| l.active))
                .filter_map(|d| d.legend.as_ref().map(|legend| (&d.key, legend)))
                .collect();
            state.legend.on_deactivated(key, still_active);
        }

        debug!(layer = %key, visible, "Layer toggled");
        Some((visible, resource))
    }

    pub fn state(&self, key: &LayerKey) -> LayerState {
        let state = self.lock();
        match state.loaded.get(key) {
            Some(l) if l.active => LayerState::Active,
            Some(_) => LayerState::Inactive,
            None if state.in_flight.contains_key(key) => LayerState::Loading,
            None => LayerState::Absent,
        }
    }

    pub fn is_active(&self, key: &LayerKey) -> bool {
        self.state(key) == LayerState::Active
    }

    /// Active keys in manifest order.
    pub fn active_keys(&self) -> Vec<LayerKey> {
        let state = self.lock();
        self.catalog
            .iter()
            .filter(|d| state.loaded.get(&d.key).is_some_and(|l| l.active))
            .map(|d| d.key.clone())
            .collect()
    }

    pub fn resource(&self, key: &LayerKey) -> Option<LoadedResource> {
        self.lock().loaded.get(key).map(|l| l.resource.clone())
    }

    pub fn active_legend(&self) -> Option<ActiveLegend> {
        self.lock().legend.active().cloned()
    }
}
