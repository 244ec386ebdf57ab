//! Deterministic in-memory viewer.
//!
//! Implements every collaborator trait the engine needs. Nothing renders;
//! the harness drives time through [`SimViewer::tick`], which advances the
//! shared clock, plays media, fires tick listeners and releases one frame
//! to the camera loop.

use async_trait::async_trait;
use atlasview_core::clock::ClockState;
use atlasview_core::descriptor::{Credits, RasterProperty};
use atlasview_core::entity::{DataSource, Entity, MediaSpec};
use atlasview_core::loaders::RasterSource;
use atlasview_core::viewer::{
    CameraControl, DataSourceCollection, DataSourceHandle, EntityCollection, EntityHandle, FrameSource,
    ListenerId, MediaHandle, MediaHost, RasterHandle, RasterStack, SceneMode, SharedClock, TickListener,
};
use chrono::{DateTime, Utc};
use nalgebra::{Unit, Vector3};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// Observable state of one media element.
#[derive(Debug, Clone, PartialEq)]
pub struct SimMedia {
    pub spec: MediaSpec,
    pub duration: Option<f64>,
    pub position: f64,
    pub rate: f64,
    pub paused: bool,
    pub seeks: usize,
}

#[derive(Debug, Clone)]
struct SimRaster {
    handle: RasterHandle,
    source: RasterSource,
    shown: bool,
    properties: HashMap<RasterProperty, f64>,
}

#[derive(Debug, Clone)]
struct SimDataSource {
    handle: DataSourceHandle,
    name: String,
    members: Vec<EntityHandle>,
    credit: Option<Credits>,
}

#[derive(Default)]
struct ViewerState {
    /// Bottom to top
    rasters: Vec<SimRaster>,
    entities: HashMap<EntityHandle, Entity>,
    data_sources: Vec<SimDataSource>,
    clock: Option<ClockState>,
    timeline: Option<(DateTime<Utc>, DateTime<Utc>)>,
    listeners: Vec<(ListenerId, TickListener)>,
    media: HashMap<MediaHandle, SimMedia>,
    /// Known media durations by source URL
    durations: HashMap<String, f64>,
    scene_mode: SceneMode,
    heading: f64,
    offset_east: f64,
}

pub struct SimViewer {
    state: Mutex<ViewerState>,
    ready: watch::Sender<bool>,
    frame_tx: Mutex<Option<mpsc::UnboundedSender<Duration>>>,
    frame_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Duration>>,
}

impl SimViewer {
    /// A viewer whose clock starts (paused) at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        let (ready, _) = watch::channel(false);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(ViewerState {
                clock: Some(ClockState::at(start)),
                ..Default::default()
            }),
            ready,
            frame_tx: Mutex::new(Some(tx)),
            frame_rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn shared(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    fn lock(&self) -> MutexGuard<'_, ViewerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Releases everyone waiting on [`FrameSource::ready`].
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    /// Ends the frame stream; pending and future `next_frame` calls see `None`.
    pub fn close(&self) {
        self.frame_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Registers the duration media created from `src` will report.
    pub fn set_media_duration(&self, src: impl Into<String>, secs: f64) {
        self.lock().durations.insert(src.into(), secs);
    }

    pub fn set_scene_mode(&self, mode: SceneMode) {
        self.lock().scene_mode = mode;
    }

    /// Advances one frame of `elapsed` wall time.
    pub fn tick(&self, elapsed: Duration) {
        let dt = elapsed.as_secs_f64();
        let (clock, listeners) = {
            let mut state = self.lock();
            for media in state.media.values_mut().filter(|m| !m.paused) {
                play_forward(media, dt);
            }
            let mut clock = state.clock.clone().unwrap_or_else(|| ClockState::at(DateTime::<Utc>::UNIX_EPOCH));
            clock.advance(elapsed);
            state.clock = Some(clock.clone());
            let listeners: Vec<TickListener> = state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (clock, listeners)
        };

        for listener in listeners {
            listener(&clock);
        }

        if let Some(tx) = self.frame_tx.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            // The camera loop may not be running; dropped frames are fine.
            let _ = tx.send(elapsed);
        }
        trace!(current = %clock.current, "tick");
    }

    /// Raster handles, bottom to top.
    pub fn raster_order(&self) -> Vec<RasterHandle> {
        self.lock().rasters.iter().map(|r| r.handle).collect()
    }

    pub fn raster_property(&self, handle: RasterHandle, property: RasterProperty) -> Option<f64> {
        let state = self.lock();
        let raster = state.rasters.iter().find(|r| r.handle == handle)?;
        raster.properties.get(&property).copied()
    }

    /// Root tile URL of every shown raster at the current clock time, bottom
    /// to top.
    pub fn root_tiles(&self) -> Vec<String> {
        let state = self.lock();
        let now = state.clock.as_ref().map(|c| c.current);
        state
            .rasters
            .iter()
            .filter(|r| r.shown)
            .filter_map(|r| r.source.tile_url(0, 0, 0, now.as_ref()))
            .collect()
    }

    pub fn entity(&self, handle: EntityHandle) -> Option<Entity> {
        self.lock().entities.get(&handle).cloned()
    }

    pub fn shown_entities(&self, handle: DataSourceHandle) -> usize {
        let state = self.lock();
        state
            .data_sources
            .iter()
            .find(|ds| ds.handle == handle)
            .map(|ds| {
                ds.members
                    .iter()
                    .filter(|e| state.entities.get(e).is_some_and(|e| e.show))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn data_source_name(&self, handle: DataSourceHandle) -> Option<String> {
        let state = self.lock();
        state
            .data_sources
            .iter()
            .find(|ds| ds.handle == handle)
            .map(|ds| ds.name.clone())
    }

    /// On-screen credits of every visible layer: rasters bottom to top, then
    /// data sources with at least one shown entity.
    pub fn screen_credits(&self) -> Vec<String> {
        let state = self.lock();
        let rasters = state
            .rasters
            .iter()
            .filter(|r| r.shown)
            .filter_map(|r| r.source.credit());
        let sources = state
            .data_sources
            .iter()
            .filter(|ds| ds.members.iter().any(|e| state.entities.get(e).is_some_and(|e| e.show)))
            .filter_map(|ds| ds.credit.as_ref());
        rasters
            .chain(sources)
            .filter(|c| c.show_on_screen)
            .map(|c| c.credit.clone())
            .collect()
    }

    pub fn timeline(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.lock().timeline
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn media(&self, handle: MediaHandle) -> Option<SimMedia> {
        self.lock().media.get(&handle).cloned()
    }

    /// Accumulated camera heading (radians) and eastward offset (meters).
    pub fn camera(&self) -> (f64, f64) {
        let state = self.lock();
        (state.heading, state.offset_east)
    }
}

fn play_forward(media: &mut SimMedia, dt: f64) {
    let next = media.position + media.rate * dt;
    media.position = match media.duration {
        Some(d) if d > 0.0 && media.spec.looping => next.rem_euclid(d),
        Some(d) if d > 0.0 => {
            if next >= d {
                media.paused = true;
            }
            next.clamp(0.0, d)
        }
        _ => next.max(0.0),
    };
}

impl RasterStack for SimViewer {
    fn add_raster(&self, source: RasterSource) -> RasterHandle {
        let handle = RasterHandle::new();
        self.lock().rasters.push(SimRaster {
            handle,
            source,
            shown: true,
            properties: HashMap::new(),
        });
        handle
    }

    fn raise_to_top(&self, handle: RasterHandle) {
        let mut state = self.lock();
        if let Some(i) = state.rasters.iter().position(|r| r.handle == handle) {
            let raster = state.rasters.remove(i);
            state.rasters.push(raster);
        }
    }

    fn raster_shown(&self, handle: RasterHandle) -> Option<bool> {
        self.lock().rasters.iter().find(|r| r.handle == handle).map(|r| r.shown)
    }

    fn set_raster_shown(&self, handle: RasterHandle, show: bool) {
        if let Some(raster) = self.lock().rasters.iter_mut().find(|r| r.handle == handle) {
            raster.shown = show;
        }
    }

    fn set_raster_property(&self, handle: RasterHandle, property: RasterProperty, value: f64) {
        if let Some(raster) = self.lock().rasters.iter_mut().find(|r| r.handle == handle) {
            raster.properties.insert(property, value);
        }
    }
}

impl EntityCollection for SimViewer {
    fn add_entity(&self, entity: Entity) -> EntityHandle {
        let handle = EntityHandle::new();
        self.lock().entities.insert(handle, entity);
        handle
    }

    fn entity_shown(&self, handle: EntityHandle) -> Option<bool> {
        self.lock().entities.get(&handle).map(|e| e.show)
    }

    fn set_entity_shown(&self, handle: EntityHandle, show: bool) {
        if let Some(entity) = self.lock().entities.get_mut(&handle) {
            entity.show = show;
        }
    }
}

impl DataSourceCollection for SimViewer {
    fn add_data_source(&self, source: DataSource) -> DataSourceHandle {
        let handle = DataSourceHandle::new();
        let mut state = self.lock();
        let members = source
            .entities
            .into_iter()
            .map(|entity| {
                let h = EntityHandle::new();
                state.entities.insert(h, entity);
                h
            })
            .collect();
        state.data_sources.push(SimDataSource {
            handle,
            name: source.name,
            members,
            credit: source.credit,
        });
        handle
    }

    fn data_source_entities(&self, handle: DataSourceHandle) -> Vec<EntityHandle> {
        self.lock()
            .data_sources
            .iter()
            .find(|ds| ds.handle == handle)
            .map(|ds| ds.members.clone())
            .unwrap_or_default()
    }
}

impl SharedClock for SimViewer {
    fn clock(&self) -> ClockState {
        self.lock()
            .clock
            .clone()
            .unwrap_or_else(|| ClockState::at(DateTime::<Utc>::UNIX_EPOCH))
    }

    fn set_clock(&self, state: ClockState) {
        self.lock().clock = Some(state);
    }

    fn fit_timeline(&self, start: DateTime<Utc>, stop: DateTime<Utc>) {
        self.lock().timeline = Some((start, stop));
    }

    fn add_tick_listener(&self, listener: TickListener) -> ListenerId {
        let id = ListenerId::new();
        self.lock().listeners.push((id, listener));
        id
    }

    fn remove_tick_listener(&self, id: ListenerId) -> bool {
        let mut state = self.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(l, _)| *l != id);
        state.listeners.len() != before
    }
}

impl MediaHost for SimViewer {
    fn create_media(&self, spec: MediaSpec) -> MediaHandle {
        let handle = MediaHandle::new();
        let mut state = self.lock();
        let duration = state.durations.get(&spec.src).copied();
        let rate = spec.playback_rate;
        state.media.insert(
            handle,
            SimMedia {
                spec,
                duration,
                position: 0.0,
                rate,
                paused: true,
                seeks: 0,
            },
        );
        handle
    }

    fn media_duration(&self, handle: MediaHandle) -> Option<f64> {
        self.lock().media.get(&handle).and_then(|m| m.duration)
    }

    fn media_position(&self, handle: MediaHandle) -> Option<f64> {
        self.lock().media.get(&handle).map(|m| m.position)
    }

    fn seek_media(&self, handle: MediaHandle, seconds: f64) {
        if let Some(media) = self.lock().media.get_mut(&handle) {
            media.position = seconds;
            media.seeks += 1;
        }
    }

    fn set_media_rate(&self, handle: MediaHandle, rate: f64) {
        if let Some(media) = self.lock().media.get_mut(&handle) {
            media.rate = rate;
        }
    }

    fn play_media(&self, handle: MediaHandle) {
        if let Some(media) = self.lock().media.get_mut(&handle) {
            media.paused = false;
        }
    }

    fn pause_media(&self, handle: MediaHandle) {
        if let Some(media) = self.lock().media.get_mut(&handle) {
            media.paused = true;
        }
    }

    fn media_paused(&self, handle: MediaHandle) -> bool {
        self.lock().media.get(&handle).map_or(true, |m| m.paused)
    }
}

impl CameraControl for SimViewer {
    fn scene_mode(&self) -> SceneMode {
        self.lock().scene_mode
    }

    fn rotate_camera(&self, axis: &Unit<Vector3<f64>>, radians: f64) {
        // Only rotation about +Z changes the heading we track
        let mut state = self.lock();
        state.heading += radians * axis.z;
    }

    fn move_camera_right(&self, meters: f64) {
        self.lock().offset_east += meters;
    }
}

#[async_trait]
impl FrameSource for SimViewer {
    async fn ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as the viewer, so this only ends on `true`.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    async fn next_frame(&self) -> Option<Duration> {
        self.frame_rx.lock().await.recv().await
    }
}
