//! Simulation context implementing AtlasContext on a virtual clock.

use async_trait::async_trait;
use atlasview_env::AtlasContext;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 2024-01-01T00:00:00Z, where every simulated session starts.
const SESSION_EPOCH_SECS: u64 = 1_704_067_200;

/// Virtual clock shared by the harness and the engine.
///
/// Time moves only when the harness ticks the viewer or a task sleeps.
/// Spawned tasks are recorded by name so scenarios can check how many
/// background loops the engine started.
#[derive(Clone)]
pub struct SimContext {
    seed: u64,
    elapsed_ns: Arc<Mutex<u64>>,
    spawned: Arc<Mutex<Vec<String>>>,
}

impl SimContext {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            elapsed_ns: Arc::new(Mutex::new(0)),
            spawned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn advance_time(&self, duration: Duration) {
        let mut elapsed = self.elapsed_ns.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed = elapsed.saturating_add(duration.as_nanos() as u64);
    }

    pub fn time_ns(&self) -> u64 {
        *self.elapsed_ns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of every task spawned through this context, in spawn order.
    pub fn spawned_tasks(&self) -> Vec<String> {
        self.spawned.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// How many tasks named `name` have been spawned.
    pub fn spawn_count(&self, name: &str) -> usize {
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }
}

#[async_trait]
impl AtlasContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(SESSION_EPOCH_SECS) + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, at_ns = self.time_ns(), "spawning simulated task");
        self.spawned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        tokio::spawn(future);
    }
}
