//! Continuous camera spin: a per-frame task that rotates the globe in 3D
//! or pans the map in 2D and Columbus view.

use crate::config::EngineConfig;
use crate::viewer::{SceneMode, Viewer};
use atlasview_env::AtlasContext;
use nalgebra::Vector3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct CameraSpin<V: Viewer> {
    viewer: Arc<V>,
    running: Arc<AtomicBool>,
    /// Radians per second about +Z
    spin_rate: f64,
    /// Meters per second
    pan_rate: f64,
}

impl<V: Viewer> Clone for CameraSpin<V> {
    fn clone(&self) -> Self {
        Self {
            viewer: self.viewer.clone(),
            running: self.running.clone(),
            spin_rate: self.spin_rate,
            pan_rate: self.pan_rate,
        }
    }
}

impl<V: Viewer> CameraSpin<V> {
    pub fn new(viewer: Arc<V>, config: &EngineConfig) -> Self {
        Self {
            viewer,
            running: Arc::new(AtomicBool::new(false)),
            spin_rate: config.spin_rate_3d,
            pan_rate: config.pan_rate_2d,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the frame loop. Returns `false` if it is already running.
    pub fn start<C: AtlasContext>(&self, ctx: &C) -> bool {
        if self.running.swap(true, Ordering::AcqRel) {
            return false;
        }
        let spin = self.clone();
        ctx.spawn("camera-spin", async move { spin.run().await });
        debug!(spin_rate = self.spin_rate, pan_rate = self.pan_rate, "Camera spin started");
        true
    }

    /// Takes effect at the next frame boundary.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("Camera spin stopped");
        }
    }

    /// Frame loop body; ends when stopped or when the viewer stops producing
    /// frames.
    pub async fn run(&self) {
        while let Some(dt) = self.viewer.next_frame().await {
            if !self.is_running() {
                break;
            }
            self.step(dt);
        }
    }

    /// One frame's worth of motion.
    pub fn step(&self, dt: Duration) {
        let dt = dt.as_secs_f64();
        match self.viewer.scene_mode() {
            SceneMode::Scene3D => self.viewer.rotate_camera(&Vector3::z_axis(), self.spin_rate * dt),
            SceneMode::Scene2D | SceneMode::Columbus => self.viewer.move_camera_right(-self.pan_rate * dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockViewer;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_spins_once_per_frame_in_3d() {
        let viewer = MockViewer::shared();
        let spin = CameraSpin::new(viewer.clone(), &EngineConfig::default());
        viewer.set_frames(3);
        spin.running.store(true, Ordering::Release);

        spin.run().await;

        // three 100ms frames at 0.2 rad/s
        assert_relative_eq!(viewer.state.lock().unwrap().rotation, 0.06, epsilon = 1e-12);
    }

    #[tokio::test]
    async fn test_pans_left_in_2d() {
        let viewer = MockViewer::shared();
        viewer.state.lock().unwrap().scene_mode = SceneMode::Scene2D;
        let spin = CameraSpin::new(viewer.clone(), &EngineConfig::default());

        spin.step(Duration::from_millis(500));

        let s = viewer.state.lock().unwrap();
        assert_relative_eq!(s.panned, -500_000.0);
        assert_eq!(s.rotation, 0.0);
    }

    #[tokio::test]
    async fn test_no_step_after_stop() {
        let viewer = MockViewer::shared();
        let spin = CameraSpin::new(viewer.clone(), &EngineConfig::default());
        viewer.set_frames(5);
        spin.running.store(true, Ordering::Release);
        spin.stop();

        spin.run().await;

        assert_eq!(viewer.state.lock().unwrap().rotation, 0.0);
        // the boundary frame was consumed, nothing after it
        assert_eq!(viewer.state.lock().unwrap().frames_left, 4);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let viewer = MockViewer::shared();
        let spin = CameraSpin::new(viewer.clone(), &EngineConfig::default());
        let ctx = atlasview_env::TokioContext::new();
        assert!(spin.start(&ctx));
        assert!(!spin.start(&ctx));
        spin.stop();
        assert!(!spin.is_running());
    }
}
