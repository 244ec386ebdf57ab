//! In-memory asset fetcher with seeded latency and fault injection.

use async_trait::async_trait;
use atlasview_env::{AssetFetcher, EnvError, Url};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, PoisonError};

/// Serves canned documents by absolute URL.
///
/// Latency is measured in scheduler yields, so the completion order of
/// concurrent fetches depends only on the seed and the URLs involved,
/// never on wall-clock timing.
pub struct SimFetcher {
    seed: u64,

    /// Upper bound on yields per fetch
    max_latency: u32,

    docs: HashMap<String, String>,

    /// URLs that fail with a transport error
    broken: HashSet<String>,

    /// Every requested URL, in request order
    requests: Mutex<Vec<String>>,
}

impl SimFetcher {
    pub fn new(seed: u64, max_latency: u32) -> Self {
        Self {
            seed,
            max_latency,
            docs: HashMap::new(),
            broken: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_doc(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.docs.insert(url.into(), body.into());
        self
    }

    pub fn with_docs<I, K, V>(mut self, docs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.docs.extend(docs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Makes every fetch of `url` fail.
    pub fn break_url(mut self, url: impl Into<String>) -> Self {
        self.broken.insert(url.into());
        self
    }

    /// Latency of `url` in yields; stable per seed.
    pub fn latency_of(&self, url: &str) -> u32 {
        if self.max_latency == 0 {
            return 0;
        }
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        url.hash(&mut hasher);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ hasher.finish());
        rng.gen_range(0..=self.max_latency)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl AssetFetcher for SimFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, EnvError> {
        let url = url.as_str();
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        for _ in 0..self.latency_of(url) {
            tokio::task::yield_now().await;
        }

        if self.broken.contains(url) {
            return Err(EnvError::transport(url, "connection reset (injected)"));
        }
        self.docs
            .get(url)
            .cloned()
            .ok_or_else(|| EnvError::not_found(url))
    }
}
