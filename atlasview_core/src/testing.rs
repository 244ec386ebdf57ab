//! In-crate test doubles: a recording viewer and a map-backed fetcher.

use crate::clock::ClockState;
use crate::descriptor::{Credits, LayerDescriptor, LayerKey, LayerKind, RasterProperty};
use crate::entity::{DataSource, Entity, MediaSpec};
use crate::loaders::{LoadedResource, Primitive, RasterSource};
use crate::viewer::*;
use async_trait::async_trait;
use atlasview_env::{AssetFetcher, EnvError, Url};
use chrono::{DateTime, Utc};
use nalgebra::{Unit, Vector3};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockMedia {
    pub spec: MediaSpec,
    pub duration: Option<f64>,
    pub position: f64,
    pub rate: f64,
    pub paused: bool,
}

#[derive(Default)]
pub struct MockState {
    pub rasters: Vec<(RasterHandle, RasterSource, bool)>,
    pub raster_props: HashMap<(RasterHandle, RasterProperty), f64>,
    pub entities: HashMap<EntityHandle, (Entity, bool)>,
    pub data_sources: Vec<(DataSourceHandle, String, Vec<EntityHandle>)>,
    pub data_source_credits: HashMap<DataSourceHandle, Credits>,
    pub clock: Option<ClockState>,
    pub fitted: Vec<(DateTime<Utc>, DateTime<Utc>)>,
    pub listeners: Vec<(ListenerId, TickListener)>,
    pub media: HashMap<MediaHandle, MockMedia>,
    pub scene_mode: SceneMode,
    pub rotation: f64,
    pub panned: f64,
    pub frames_left: usize,
}

pub struct MockViewer {
    pub state: Mutex<MockState>,
}

impl MockViewer {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                clock: Some(ClockState::at(DateTime::<Utc>::UNIX_EPOCH)),
                frames_left: 0,
                ..Default::default()
            }),
        })
    }

    pub fn tick(&self, elapsed: Duration) {
        let (state, listeners) = {
            let mut s = self.state.lock().unwrap();
            let mut clock = s.clock.clone().unwrap();
            clock.advance(elapsed);
            s.clock = Some(clock.clone());
            let listeners: Vec<TickListener> = s.listeners.iter().map(|(_, l)| l.clone()).collect();
            (clock, listeners)
        };
        for listener in listeners {
            listener(&state);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().listeners.len()
    }

    pub fn raster_order(&self) -> Vec<RasterHandle> {
        self.state.lock().unwrap().rasters.iter().map(|(h, _, _)| *h).collect()
    }

    pub fn insert_count(&self) -> usize {
        let s = self.state.lock().unwrap();
        s.rasters.len() + s.data_sources.len() + s.entities.len()
            - s.data_sources.iter().map(|(_, _, e)| e.len()).sum::<usize>()
    }

    pub fn set_frames(&self, frames: usize) {
        self.state.lock().unwrap().frames_left = frames;
    }

    pub fn set_media_duration(&self, media: MediaHandle, secs: f64) {
        if let Some(m) = self.state.lock().unwrap().media.get_mut(&media) {
            m.duration = Some(secs);
        }
    }
}

impl RasterStack for MockViewer {
    fn add_raster(&self, source: RasterSource) -> RasterHandle {
        let handle = RasterHandle::new();
        self.state.lock().unwrap().rasters.push((handle, source, true));
        handle
    }

    fn raise_to_top(&self, handle: RasterHandle) {
        let mut s = self.state.lock().unwrap();
        if let Some(i) = s.rasters.iter().position(|(h, _, _)| *h == handle) {
            let entry = s.rasters.remove(i);
            s.rasters.push(entry);
        }
    }

    fn raster_shown(&self, handle: RasterHandle) -> Option<bool> {
        let s = self.state.lock().unwrap();
        s.rasters.iter().find(|(h, _, _)| *h == handle).map(|(_, _, shown)| *shown)
    }

    fn set_raster_shown(&self, handle: RasterHandle, show: bool) {
        let mut s = self.state.lock().unwrap();
        if let Some(entry) = s.rasters.iter_mut().find(|(h, _, _)| *h == handle) {
            entry.2 = show;
        }
    }

    fn set_raster_property(&self, handle: RasterHandle, property: RasterProperty, value: f64) {
        self.state.lock().unwrap().raster_props.insert((handle, property), value);
    }
}

impl EntityCollection for MockViewer {
    fn add_entity(&self, entity: Entity) -> EntityHandle {
        let handle = EntityHandle::new();
        let show = entity.show;
        self.state.lock().unwrap().entities.insert(handle, (entity, show));
        handle
    }

    fn entity_shown(&self, handle: EntityHandle) -> Option<bool> {
        self.state.lock().unwrap().entities.get(&handle).map(|(_, shown)| *shown)
    }

    fn set_entity_shown(&self, handle: EntityHandle, show: bool) {
        if let Some(entry) = self.state.lock().unwrap().entities.get_mut(&handle) {
            entry.1 = show;
        }
    }
}

impl DataSourceCollection for MockViewer {
    fn add_data_source(&self, source: DataSource) -> DataSourceHandle {
        let handle = DataSourceHandle::new();
        let mut s = self.state.lock().unwrap();
        let mut handles = Vec::new();
        for entity in source.entities {
            let h = EntityHandle::new();
            let show = entity.show;
            s.entities.insert(h, (entity, show));
            handles.push(h);
        }
        if let Some(credit) = source.credit {
            s.data_source_credits.insert(handle, credit);
        }
        s.data_sources.push((handle, source.name, handles));
        handle
    }

    fn data_source_entities(&self, handle: DataSourceHandle) -> Vec<EntityHandle> {
        let s = self.state.lock().unwrap();
        s.data_sources
            .iter()
            .find(|(h, _, _)| *h == handle)
            .map(|(_, _, e)| e.clone())
            .unwrap_or_default()
    }
}

impl SharedClock for MockViewer {
    fn clock(&self) -> ClockState {
        self.state.lock().unwrap().clock.clone().unwrap()
    }

    fn set_clock(&self, state: ClockState) {
        self.state.lock().unwrap().clock = Some(state);
    }

    fn fit_timeline(&self, start: DateTime<Utc>, stop: DateTime<Utc>) {
        self.state.lock().unwrap().fitted.push((start, stop));
    }

    fn add_tick_listener(&self, listener: TickListener) -> ListenerId {
        let id = ListenerId::new();
        self.state.lock().unwrap().listeners.push((id, listener));
        id
    }

    fn remove_tick_listener(&self, id: ListenerId) -> bool {
        let mut s = self.state.lock().unwrap();
        let before = s.listeners.len();
        s.listeners.retain(|(l, _)| *l != id);
        s.listeners.len() != before
    }
}

impl MediaHost for MockViewer {
    fn create_media(&self, spec: MediaSpec) -> MediaHandle {
        let handle = MediaHandle::new();
        let rate = spec.playback_rate;
        self.state.lock().unwrap().media.insert(
            handle,
            MockMedia {
                spec,
                duration: None,
                position: 0.0,
                rate,
                paused: true,
            },
        );
        handle
    }

    fn media_duration(&self, handle: MediaHandle) -> Option<f64> {
        self.state.lock().unwrap().media.get(&handle).and_then(|m| m.duration)
    }

    fn media_position(&self, handle: MediaHandle) -> Option<f64> {
        self.state.lock().unwrap().media.get(&handle).map(|m| m.position)
    }

    fn seek_media(&self, handle: MediaHandle, seconds: f64) {
        if let Some(m) = self.state.lock().unwrap().media.get_mut(&handle) {
            m.position = seconds;
        }
    }

    fn set_media_rate(&self, handle: MediaHandle, rate: f64) {
        if let Some(m) = self.state.lock().unwrap().media.get_mut(&handle) {
            m.rate = rate;
        }
    }

    fn play_media(&self, handle: MediaHandle) {
        if let Some(m) = self.state.lock().unwrap().media.get_mut(&handle) {
            m.paused = false;
        }
    }

    fn pause_media(&self, handle: MediaHandle) {
        if let Some(m) = self.state.lock().unwrap().media.get_mut(&handle) {
            m.paused = true;
        }
    }

    fn media_paused(&self, handle: MediaHandle) -> bool {
        self.state
            .lock()
            .unwrap()
            .media
            .get(&handle)
            .map(|m| m.paused)
            .unwrap_or(true)
    }
}

impl CameraControl for MockViewer {
    fn scene_mode(&self) -> SceneMode {
        self.state.lock().unwrap().scene_mode
    }

    fn rotate_camera(&self, _axis: &Unit<Vector3<f64>>, radians: f64) {
        self.state.lock().unwrap().rotation += radians;
    }

    fn move_camera_right(&self, meters: f64) {
        self.state.lock().unwrap().panned += meters;
    }
}

#[async_trait]
impl FrameSource for MockViewer {
    async fn ready(&self) {}

    async fn next_frame(&self) -> Option<Duration> {
        tokio::task::yield_now().await;
        let mut s = self.state.lock().unwrap();
        if s.frames_left == 0 {
            return None;
        }
        s.frames_left -= 1;
        Some(Duration::from_millis(100))
    }
}

/// Fetcher serving canned documents by absolute URL.
#[derive(Default)]
pub struct MapFetcher {
    pub docs: Mutex<HashMap<String, String>>,
    pub requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn with(docs: &[(&str, &str)]) -> Arc<Self> {
        let fetcher = Self::default();
        {
            let mut map = fetcher.docs.lock().unwrap();
            for (url, body) in docs {
                map.insert(url.to_string(), body.to_string());
            }
        }
        Arc::new(fetcher)
    }
}

#[async_trait]
impl AssetFetcher for MapFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, EnvError> {
        self.requests.lock().unwrap().push(url.to_string());
        tokio::task::yield_now().await;
        self.docs
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| EnvError::not_found(url.as_str()))
    }
}

pub fn descriptor(key: &str, json: &str) -> LayerDescriptor {
    let mut desc: LayerDescriptor = serde_json::from_str(json).unwrap();
    desc.key = LayerKey::from(key);
    desc
}

pub fn video_descriptor(key: &str, timeline_sync: bool) -> LayerDescriptor {
    descriptor(
        key,
        &format!(
            r#"{{"type":"ImageMaterialProperty","url":"http://h/{key}.mp4","timelineSync":{timeline_sync}}}"#
        ),
    )
}

/// Inserts a video rectangle directly, with a known media duration.
pub fn loaded_video(viewer: &MockViewer, desc: &LayerDescriptor, duration: Option<f64>) -> LoadedResource {
    let media = viewer.create_media(MediaSpec {
        src: desc.url.clone().unwrap_or_default(),
        looping: true,
        muted: true,
        playback_rate: 1.0,
    });
    if let Some(secs) = duration {
        viewer.set_media_duration(media, secs);
    }
    let entity = viewer.add_entity(Entity::new(desc.key.as_str(), crate::entity::EntityGraphics::Empty));
    LoadedResource {
        kind: LayerKind::VideoRectangle,
        primitive: Primitive::Entity(entity),
        animated: None,
        media: Some(media),
    }
}
