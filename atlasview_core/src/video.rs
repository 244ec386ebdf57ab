//! Video synchronizer: keeps video textures in step with the shared clock.
//!
//! Each participating layer owns at most one binding, a tick listener that
//! drives the media position from `clock.current - epoch`. The registry is
//! owned by the synchronizer instance, one per viewer.

use crate::clock::ClockState;
use crate::descriptor::{LayerDescriptor, LayerKey, LayerKind, LayerParams};
use crate::loaders::LoadedResource;
use crate::viewer::{ListenerId, MediaHandle, TickListener, Viewer};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Binding {
    listener: ListenerId,
    media: MediaHandle,
}

/// Per-binding parameters captured by the tick listener.
#[derive(Debug, Clone, Copy)]
struct BindingParams {
    media: MediaHandle,
    epoch: DateTime<Utc>,
    looping: bool,
    tolerance: f64,
}

pub struct VideoSynchronizer<V: Viewer> {
    viewer: Arc<V>,
    bindings: Mutex<HashMap<LayerKey, Binding>>,
    /// Allowed drift in seconds before a seek
    tolerance: f64,
}

impl<V: Viewer> VideoSynchronizer<V> {
    pub fn new(viewer: Arc<V>, tolerance: f64) -> Self {
        Self {
            viewer,
            bindings: Mutex::new(HashMap::new()),
            tolerance,
        }
    }

    /// Whether `desc` takes part in video synchronization at all.
    pub fn participates(desc: &LayerDescriptor) -> bool {
        desc.kind() == LayerKind::VideoRectangle && desc.timeline_sync
    }

    /// Enables or disables the binding for a loaded layer. Non-participating
    /// layers are ignored.
    pub fn update(&self, desc: &LayerDescriptor, resource: &LoadedResource, enabled: bool) {
        if !Self::participates(desc) {
            return;
        }
        let media = match resource.media {
            Some(media) => media,
            None => {
                warn!(layer = %desc.key, "Video layer has no media element");
                return;
            }
        };
        if enabled {
            let looping = match &desc.params {
                LayerParams::VideoRectangle(p) => p.loop_content.unwrap_or(true),
                _ => true,
            };
            self.enable(&desc.key, media, looping);
        } else {
            self.disable(&desc.key, media);
        }
    }

    fn enable(&self, key: &LayerKey, media: MediaHandle, looping: bool) {
        let viewer = &self.viewer;

        let mut clock = viewer.clock();
        if clock.stop.is_none() {
            clock.stop = viewer.media_duration(media).and_then(|secs| {
                let delta = TimeDelta::milliseconds((secs * 1000.0).round() as i64);
                clock.start.checked_add_signed(delta)
            });
        }
        clock.current = clock.start;
        let epoch = clock.start;
        viewer.set_clock(clock);

        viewer.pause_media(media);
        viewer.seek_media(media, 0.0);

        let params = BindingParams {
            media,
            epoch,
            looping,
            tolerance: self.tolerance,
        };
        let weak: Weak<V> = Arc::downgrade(viewer);
        let listener: TickListener = Arc::new(move |state: &ClockState| {
            if let Some(viewer) = weak.upgrade() {
                sync_media(viewer.as_ref(), &params, state);
            }
        });

        let mut bindings = self.bindings.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = bindings.remove(key) {
            viewer.remove_tick_listener(old.listener);
        }
        let id = viewer.add_tick_listener(listener);
        bindings.insert(key.clone(), Binding { listener: id, media });
        drop(bindings);

        viewer.play_media(media);
        debug!(layer = %key, epoch = %epoch, "Video binding created");
    }

    fn disable(&self, key: &LayerKey, media: MediaHandle) {
        self.viewer.pause_media(media);
        let removed = self
            .bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if let Some(binding) = removed {
            self.viewer.remove_tick_listener(binding.listener);
            debug!(layer = %key, "Video binding destroyed");
        }
    }

    pub fn is_bound(&self, key: &LayerKey) -> bool {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Media element bound for `key`.
    pub fn bound_media(&self, key: &LayerKey) -> Option<MediaHandle> {
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|b| b.media)
    }
}

/// Media position the clock asks for, in seconds.
fn target_position(state: &ClockState, epoch: DateTime<Utc>, duration: Option<f64>, looping: bool) -> f64 {
    let offset = (state.current - epoch).num_milliseconds() as f64 / 1000.0;
    match duration {
        Some(d) if d > 0.0 && looping => offset.rem_euclid(d),
        Some(d) if d > 0.0 => offset.clamp(0.0, d),
        _ => offset.max(0.0),
    }
}

fn sync_media<V: Viewer + ?Sized>(viewer: &V, params: &BindingParams, state: &ClockState) {
    let media = params.media;
    let target = target_position(state, params.epoch, viewer.media_duration(media), params.looping);

    // Forward playback runs the media itself; anything else scrubs.
    if state.is_animating() && state.multiplier > 0.0 {
        viewer.set_media_rate(media, state.multiplier);
        if viewer.media_paused(media) {
            viewer.play_media(media);
        }
        let drift = viewer
            .media_position(media)
            .map(|pos| (pos - target).abs())
            .unwrap_or(f64::INFINITY);
        if drift > params.tolerance {
            viewer.seek_media(media, target);
        }
    } else {
        if !viewer.media_paused(media) {
            viewer.pause_media(media);
        }
        viewer.seek_media(media, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{loaded_video, video_descriptor, MockViewer};
    use crate::time_interval::parse_iso8601;
    use crate::viewer::{MediaHost, SharedClock};
    use std::time::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        parse_iso8601(s).unwrap()
    }

    #[test]
    fn test_target_position_wraps_when_looping() {
        let mut state = ClockState::at(utc("2024-01-01T00:00:00Z"));
        state.current = utc("2024-01-01T00:00:25Z");
        let epoch = utc("2024-01-01T00:00:00Z");
        approx::assert_relative_eq!(target_position(&state, epoch, Some(10.0), true), 5.0);
        approx::assert_relative_eq!(target_position(&state, epoch, Some(10.0), false), 10.0);
        approx::assert_relative_eq!(target_position(&state, epoch, None, true), 25.0);
    }

    #[test]
    fn test_enable_twice_keeps_one_binding() {
        let viewer = MockViewer::shared();
        let sync = VideoSynchronizer::new(viewer.clone(), 1.0);
        let desc = video_descriptor("clouds", true);
        let resource = loaded_video(viewer.as_ref(), &desc, Some(30.0));

        sync.update(&desc, &resource, true);
        sync.update(&desc, &resource, true);

        assert_eq!(sync.binding_count(), 1);
        assert_eq!(viewer.listener_count(), 1);
        assert!(!viewer.media_paused(resource.media.unwrap()));
    }

    #[test]
    fn test_enable_derives_stop_and_resets_position() {
        let viewer = MockViewer::shared();
        let sync = VideoSynchronizer::new(viewer.clone(), 1.0);
        let desc = video_descriptor("clouds", true);
        let resource = loaded_video(viewer.as_ref(), &desc, Some(30.0));
        let media = resource.media.unwrap();
        viewer.seek_media(media, 12.0);

        sync.update(&desc, &resource, true);

        let clock = viewer.clock();
        assert_eq!(clock.current, clock.start);
        assert_eq!(clock.stop, Some(clock.start + TimeDelta::seconds(30)));
        assert_eq!(viewer.media_position(media), Some(0.0));
    }

    #[test]
    fn test_disable_pauses_and_unbinds() {
        let viewer = MockViewer::shared();
        let sync = VideoSynchronizer::new(viewer.clone(), 1.0);
        let desc = video_descriptor("clouds", true);
        let resource = loaded_video(viewer.as_ref(), &desc, Some(30.0));

        sync.update(&desc, &resource, true);
        sync.update(&desc, &resource, false);

        assert!(!sync.is_bound(&desc.key));
        assert_eq!(viewer.listener_count(), 0);
        assert!(viewer.media_paused(resource.media.unwrap()));
    }

    #[test]
    fn test_non_participants_are_ignored() {
        let viewer = MockViewer::shared();
        let sync = VideoSynchronizer::new(viewer.clone(), 1.0);
        let desc = video_descriptor("clouds", false);
        let resource = loaded_video(viewer.as_ref(), &desc, Some(30.0));

        sync.update(&desc, &resource, true);
        assert_eq!(sync.binding_count(), 0);
        assert_eq!(viewer.listener_count(), 0);
    }

    #[test]
    fn test_binding_seeks_on_drift_and_pauses_when_stopped() {
        let viewer = MockViewer::shared();
        let sync = VideoSynchronizer::new(viewer.clone(), 1.0);
        let desc = video_descriptor("clouds", true);
        let resource = loaded_video(viewer.as_ref(), &desc, Some(30.0));
        let media = resource.media.unwrap();

        let mut clock = viewer.clock();
        clock.should_animate = true;
        viewer.set_clock(clock);
        sync.update(&desc, &resource, true);

        // The mock media does not advance on its own, so the drift grows.
        viewer.tick(Duration::from_secs(5));
        approx::assert_relative_eq!(viewer.media_position(media).unwrap(), 5.0);

        let mut clock = viewer.clock();
        clock.should_animate = false;
        viewer.set_clock(clock);
        viewer.tick(Duration::from_secs(1));
        assert!(viewer.media_paused(media));
    }
}
