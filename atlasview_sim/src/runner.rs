//! Scenario runner - drives the engine against the simulated viewer.

use crate::context::SimContext;
use crate::fetcher::SimFetcher;
use crate::fixtures::{self, Deployment};
use crate::scenarios::ScenarioId;
use crate::viewer::SimViewer;

use anyhow::{bail, ensure, Context as _};
use atlasview_core::legend::{fetch_gradient, LegendKind};
use atlasview_core::viewer::{MediaHost, SceneMode, SharedClock};
use atlasview_core::{CameraSpin, EngineConfig, LayerKey, LayerManager, LayerState, ManifestResolver, ToggleOutcome};
use atlasview_env::{AtlasContext, Url};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: ScenarioId,

    pub seed: u64,

    /// Whether every check held
    pub passed: bool,

    pub failure_reason: Option<String>,

    pub metrics: ScenarioMetrics,
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Layers in the resolved catalog
    pub layers_resolved: usize,

    /// Asset requests issued
    pub fetches: usize,

    pub toggles: u64,

    /// Viewer frames driven
    pub frames: u64,
}

/// One booted engine on a simulated viewer.
pub struct Harness {
    pub deployment: Deployment,
    pub ctx: Arc<SimContext>,
    pub fetcher: Arc<SimFetcher>,
    pub viewer: Arc<SimViewer>,
    pub manager: LayerManager<SimViewer, SimContext>,
}

impl Harness {
    /// Boots the standard deployment.
    pub async fn boot(seed: u64, max_latency: u32) -> anyhow::Result<Self> {
        let deployment = Deployment::standard();
        let fetcher = deployment.fetcher(seed, max_latency);
        Self::boot_with(deployment, fetcher, seed).await
    }

    /// Resolves the manifest, marks the viewer ready and runs startup.
    pub async fn boot_with(deployment: Deployment, fetcher: SimFetcher, seed: u64) -> anyhow::Result<Self> {
        let ctx = SimContext::shared(seed);
        let fetcher = Arc::new(fetcher);
        let viewer = deployment.viewer(DateTime::<Utc>::from(ctx.system_time()));

        let resolver = ManifestResolver::new(deployment.config.clone(), fetcher.clone());
        let catalog = resolver.resolve().await.context("manifest did not resolve")?;

        let manager = LayerManager::new(viewer.clone(), ctx.clone(), fetcher.clone(), catalog, &deployment.config);
        viewer.mark_ready();
        manager.start().await;

        Ok(Self {
            deployment,
            ctx,
            fetcher,
            viewer,
            manager,
        })
    }

    pub async fn toggle(&self, key: &str) -> ToggleOutcome {
        self.manager.toggle(&LayerKey::from(key)).await
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.manager.is_active(&LayerKey::from(key))
    }

    /// Drives `n` frames of `dt` through the viewer and the virtual clock.
    pub fn run_frames(&self, n: u64, dt: Duration) {
        for _ in 0..n {
            self.ctx.advance_time(dt);
            self.viewer.tick(dt);
        }
    }

    /// Lets spawned tasks drain whatever the last frames queued.
    pub async fn settle(&self) {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
    }

    /// `Time` dimension of the sea-surface-temperature root tile.
    pub fn sst_time(&self) -> anyhow::Result<String> {
        let tile = self
            .viewer
            .root_tiles()
            .into_iter()
            .find(|t| t.contains("gibs.sim"))
            .context("sst tile not rendered")?;
        let url = Url::parse(&tile)?;
        let time = url
            .query_pairs()
            .find(|(name, _)| name == "Time")
            .map(|(_, value)| value.into_owned())
            .context("sst tile has no Time dimension")?;
        Ok(time)
    }
}

fn utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(atlasview_core::time_interval::parse_iso8601(s)?)
}

/// Runs scenarios on a fresh single-threaded runtime each.
pub struct ScenarioRunner {
    seed: u64,

    /// Upper bound on simulated fetch latency, in scheduler yields
    max_latency: u32,

    /// Engine configuration the deployment is laid out under
    config: EngineConfig,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_latency: 16,
            config: Deployment::standard().config,
        }
    }

    pub fn with_latency(mut self, max_latency: u32) -> Self {
        self.max_latency = max_latency;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    fn deployment(&self) -> Deployment {
        Deployment::with_config(self.config.clone())
    }

    async fn boot(&self) -> anyhow::Result<Harness> {
        let deployment = self.deployment();
        let fetcher = deployment.fetcher(self.seed, self.max_latency);
        Harness::boot_with(deployment, fetcher, self.seed).await
    }

    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!(scenario = %scenario, seed = self.seed, "Running scenario");
        let outcome = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .context("failed to build runtime")
            .and_then(|runtime| runtime.block_on(self.execute(scenario)));

        match outcome {
            Ok(metrics) => ScenarioResult {
                scenario,
                seed: self.seed,
                passed: true,
                failure_reason: None,
                metrics,
            },
            Err(e) => {
                warn!(scenario = %scenario, seed = self.seed, error = %format!("{e:#}"), "Scenario failed");
                ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    failure_reason: Some(format!("{e:#}")),
                    metrics: ScenarioMetrics::default(),
                }
            }
        }
    }

    async fn execute(&self, scenario: ScenarioId) -> anyhow::Result<ScenarioMetrics> {
        let mut metrics = ScenarioMetrics::default();
        let harness = match scenario {
            ScenarioId::Startup => self.startup(&mut metrics).await?,
            ScenarioId::ToggleStorm => self.toggle_storm(&mut metrics).await?,
            ScenarioId::TimeScrub => self.time_scrub(&mut metrics).await?,
            ScenarioId::VideoSync => self.video_sync(&mut metrics).await?,
            ScenarioId::LegendHandoff => self.legend_handoff(&mut metrics).await?,
            ScenarioId::FlakyAssets => self.flaky_assets(&mut metrics).await?,
            ScenarioId::CameraSpin => self.camera_spin(&mut metrics).await?,
        };
        metrics.layers_resolved = harness.manager.catalog().len();
        metrics.fetches = harness.fetcher.requests().len();
        Ok(metrics)
    }

    async fn startup(&self, _metrics: &mut ScenarioMetrics) -> anyhow::Result<Harness> {
        let h = self.boot().await?;

        let keys: Vec<String> = h.manager.catalog().keys().iter().map(|k| k.to_string()).collect();
        ensure!(keys == fixtures::RESOLVABLE, "catalog out of manifest order: {keys:?}");

        for key in ["blue_marble", "sst", "ports"] {
            ensure!(h.is_active(key), "{key} not active after startup");
        }
        for key in ["clouds", "cities", "satellites", "bad_wmts"] {
            ensure!(!h.is_active(key), "{key} active without a request");
        }
        ensure!(h.toggle("blue_marble").await == ToggleOutcome::Locked, "default layer toggled");

        let tiles = h.viewer.root_tiles();
        ensure!(
            tiles.last().is_some_and(|t| t.contains("gibs.sim")),
            "startup raster not above default: {tiles:?}"
        );
        ensure!(
            h.viewer.timeline() == Some((utc("2024-01-01T00:00:00Z")?, utc("2024-01-05T00:00:00Z")?)),
            "sst clock not applied"
        );

        let credits = h.viewer.screen_credits();
        ensure!(credits.len() == 2, "expected base map and ports credits: {credits:?}");
        ensure!(credits[0].contains("/blue_marble/nasa.png"), "base map credit not resolved: {}", credits[0]);
        ensure!(credits[1].contains("/ports/port_logo.png"), "ports credit not resolved: {}", credits[1]);
        ensure!(h.toggle("ports").await == ToggleOutcome::Hidden, "ports did not hide");
        ensure!(h.viewer.screen_credits().len() == 1, "hidden layer kept its credit");
        ensure!(h.toggle("ports").await == ToggleOutcome::Shown, "ports did not come back");
        Ok(h)
    }

    async fn toggle_storm(&self, metrics: &mut ScenarioMetrics) -> anyhow::Result<Harness> {
        let h = self.boot().await?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut loaded: HashSet<&str> = ["blue_marble", "sst", "ports"].into();
        let mut active = loaded.clone();

        for step in 0..200 {
            let key = fixtures::LAYERS[rng.gen_range(0..fixtures::LAYERS.len())];
            let expected = match key {
                "blue_marble" => ToggleOutcome::Locked,
                "missing" => ToggleOutcome::Unknown,
                k if fixtures::UNLOADABLE.contains(&k) => ToggleOutcome::ActivationFailed,
                k if !loaded.contains(k) => {
                    loaded.insert(k);
                    active.insert(k);
                    ToggleOutcome::Activated
                }
                k => {
                    if active.remove(k) {
                        ToggleOutcome::Hidden
                    } else {
                        active.insert(k);
                        ToggleOutcome::Shown
                    }
                }
            };
            let outcome = h.toggle(key).await;
            metrics.toggles += 1;
            ensure!(outcome == expected, "step {step}: {key} gave {outcome:?}, expected {expected:?}");
        }

        let actual: HashSet<String> = h.manager.active_keys().iter().map(|k| k.to_string()).collect();
        let model: HashSet<String> = active.iter().map(|k| k.to_string()).collect();
        ensure!(actual == model, "active set diverged: {actual:?} vs {model:?}");

        for (key, file) in [("ports", "ports.geojson"), ("satellites", "tracks.czml")] {
            let url = h.deployment.layer_file(key, file);
            let count = h.fetcher.request_count(&url);
            ensure!(count <= 1, "{file} fetched {count} times");
        }
        Ok(h)
    }

    async fn time_scrub(&self, metrics: &mut ScenarioMetrics) -> anyhow::Result<Harness> {
        let h = self.boot().await?;
        let mut clock = h.viewer.clock();
        clock.should_animate = true;
        h.viewer.set_clock(clock);

        ensure!(h.sst_time()? == "2024-01-01T00:00:00Z", "wrong initial time: {}", h.sst_time()?);

        // One frame per second at 3600x: 30 frames is 30 hours.
        h.run_frames(30, Duration::from_secs(1));
        ensure!(h.sst_time()? == "2024-01-02T00:00:00Z", "wrong day-2 time: {}", h.sst_time()?);

        // Past the stop the loop range wraps back to the start.
        h.run_frames(72, Duration::from_secs(1));
        ensure!(h.sst_time()? == "2024-01-01T00:00:00Z", "no wrap: {}", h.sst_time()?);
        metrics.frames = 102;
        Ok(h)
    }

    async fn video_sync(&self, metrics: &mut ScenarioMetrics) -> anyhow::Result<Harness> {
        let h = self.boot().await?;
        let clouds = LayerKey::from("clouds");
        let tolerance = h.deployment.config.video_tolerance_secs;

        ensure!(h.toggle("clouds").await == ToggleOutcome::Activated, "clouds did not load");
        let media = h.manager.video().bound_media(&clouds).context("clouds not bound")?;
        let start = utc("2024-02-01T00:00:00Z")?;
        ensure!(h.viewer.clock().current == start, "clock not reset to the clouds epoch");

        h.run_frames(25, Duration::from_secs(1));
        metrics.frames += 25;
        let position = h.viewer.media_position(media).context("media vanished")?;
        let expected = 25.0 % fixtures::CLOUDS_SECONDS;
        ensure!((position - expected).abs() <= tolerance, "media at {position}, clock wants {expected}");

        let mut clock = h.viewer.clock();
        clock.should_animate = false;
        h.viewer.set_clock(clock);
        h.run_frames(1, Duration::from_secs(1));
        metrics.frames += 1;
        ensure!(h.viewer.media(media).is_some_and(|m| m.paused), "media plays on a stopped clock");

        ensure!(h.toggle("clouds").await == ToggleOutcome::Hidden, "clouds did not hide");
        ensure!(!h.manager.video().is_bound(&clouds), "binding survived hide");
        ensure!(h.viewer.listener_count() == 0, "tick listener leaked");

        ensure!(h.toggle("clouds").await == ToggleOutcome::Shown, "clouds did not reshow");
        ensure!(h.viewer.listener_count() == 1, "rebinding did not replace the listener");
        ensure!(h.viewer.media_position(media) == Some(0.0), "reshow did not rewind");
        ensure!(h.viewer.clock().current == start, "reshow did not restore the clock");
        Ok(h)
    }

    async fn legend_handoff(&self, _metrics: &mut ScenarioMetrics) -> anyhow::Result<Harness> {
        let h = self.boot().await?;
        let owner = h.manager.active_legend().context("no legend after startup")?;
        let other = match owner.key.as_str() {
            "sst" => "ports",
            "ports" => "sst",
            key => bail!("unexpected legend owner {key}"),
        };
        debug!(owner = %owner.key, "Startup legend owner");

        ensure!(h.toggle("cities").await == ToggleOutcome::Activated, "cities did not load");
        let cities = h.manager.active_legend().context("cities legend missing")?;
        ensure!(cities.key.as_str() == "cities", "cities legend not shown");
        ensure!(cities.spec.kind() == LegendKind::GradientDocument, "cities legend is not a gradient");
        let path = cities.spec.path().context("gradient legend has no path")?;
        let gradient = fetch_gradient(h.fetcher.as_ref(), &Url::parse(path)?).await?;
        ensure!(gradient.title.as_deref() == Some("Radiance"), "wrong gradient document");

        ensure!(h.toggle("cities").await == ToggleOutcome::Hidden, "cities did not hide");
        let fallback = h.manager.active_legend().context("no fallback legend")?;
        ensure!(fallback.key == owner.key, "fell back to {}, expected {}", fallback.key, owner.key);

        ensure!(h.toggle(owner.key.as_str()).await == ToggleOutcome::Hidden, "owner did not hide");
        let last = h.manager.active_legend().context("no second fallback")?;
        ensure!(last.key.as_str() == other, "fell back to {}, expected {other}", last.key);

        ensure!(h.toggle(other).await == ToggleOutcome::Hidden, "{other} did not hide");
        ensure!(h.manager.active_legend().is_none(), "legend outlived every owner");
        Ok(h)
    }

    async fn flaky_assets(&self, _metrics: &mut ScenarioMetrics) -> anyhow::Result<Harness> {
        let deployment = self.deployment();
        let ports_data = deployment.layer_file("ports", "ports.geojson");
        let cities_descriptor = deployment.layer_file("cities", &deployment.config.descriptor_file);
        let fetcher = deployment
            .fetcher(self.seed, self.max_latency)
            .break_url(ports_data.clone())
            .break_url(cities_descriptor);
        let h = Harness::boot_with(deployment, fetcher, self.seed).await?;

        ensure!(h.manager.catalog().get("cities").is_none(), "broken descriptor kept");
        ensure!(h.manager.catalog().len() == fixtures::RESOLVABLE.len() - 1, "catalog size");
        ensure!(h.manager.state(&LayerKey::from("ports")) == LayerState::Absent, "failed startup layer cached");

        ensure!(h.toggle("ports").await == ToggleOutcome::ActivationFailed, "ports loaded from a broken URL");
        ensure!(h.fetcher.request_count(&ports_data) == 2, "failed activation not retried");
        ensure!(h.toggle("bad_wmts").await == ToggleOutcome::ActivationFailed, "bad_wmts loaded");
        ensure!(h.viewer.raster_order().len() == 2, "failed layers inserted rasters");

        ensure!(h.toggle("satellites").await == ToggleOutcome::Activated, "satellites did not load");
        let animated = h
            .manager
            .resource(&LayerKey::from("satellites"))
            .and_then(|r| r.animated)
            .context("satellites has no animated source")?;
        ensure!(h.viewer.shown_entities(animated) == 2, "satellite tracks not shown");
        ensure!(h.viewer.data_source_name(animated).as_deref() == Some("LEO tracks"), "track name");
        Ok(h)
    }

    async fn camera_spin(&self, metrics: &mut ScenarioMetrics) -> anyhow::Result<Harness> {
        let h = self.boot().await?;
        let config = &h.deployment.config;
        let spin = CameraSpin::new(h.viewer.clone(), config);
        let dt = Duration::from_millis(100);

        ensure!(spin.start(h.ctx.as_ref()), "spin refused to start");
        ensure!(!spin.start(h.ctx.as_ref()), "second start spawned another loop");
        ensure!(h.ctx.spawn_count("camera-spin") == 1, "expected one spin task");
        h.run_frames(10, dt);
        h.settle().await;
        let (heading, _) = h.viewer.camera();
        let expected = config.spin_rate_3d * 10.0 * dt.as_secs_f64();
        ensure!((heading - expected).abs() < 1e-9, "heading {heading}, expected {expected}");

        // The boundary frame after stop() must not move the camera.
        spin.stop();
        h.run_frames(1, dt);
        h.settle().await;
        ensure!(h.viewer.camera().0 == heading, "camera moved after stop");

        h.viewer.set_scene_mode(SceneMode::Scene2D);
        ensure!(spin.start(h.ctx.as_ref()), "spin did not restart");
        ensure!(h.ctx.spawn_count("camera-spin") == 2, "restart did not spawn a fresh loop");
        h.run_frames(5, dt);
        h.settle().await;
        let (_, east) = h.viewer.camera();
        let expected = -config.pan_rate_2d * 5.0 * dt.as_secs_f64();
        ensure!((east - expected).abs() < 1e-6, "panned {east}, expected {expected}");

        spin.stop();
        h.viewer.close();
        h.settle().await;
        metrics.frames = 16;
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_scenario_passes_for_fixed_seed() {
        for scenario in ScenarioId::all() {
            let result = ScenarioRunner::new(42).run(scenario);
            assert!(result.passed, "{scenario}: {:?}", result.failure_reason);
        }
    }

    #[test]
    fn test_startup_is_seed_independent() {
        for seed in [1, 7, 1234] {
            let result = ScenarioRunner::new(seed).with_latency(40).run(ScenarioId::Startup);
            assert!(result.passed, "seed {seed}: {:?}", result.failure_reason);
            assert_eq!(result.metrics.layers_resolved, fixtures::RESOLVABLE.len());
        }
    }
}
