//! Core environment context trait for the AtlasView engine.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for time and task interaction.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `SystemTime::now`
/// - **Simulation**: `SimContext` - virtual clock advanced by the harness
///
/// The clock synchronizer asks this context for "now" whenever a layer's
/// clock configuration leaves the start time open, so simulated runs stay
/// reproducible.
#[async_trait]
pub trait AtlasContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time.
    ///
    /// In simulation, this is derived from virtual clock + epoch offset.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    ///
    /// In production: `tokio::spawn`
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
