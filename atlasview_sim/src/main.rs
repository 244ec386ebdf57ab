//! AtlasView Simulator CLI
//!
//! Runs the deterministic scenarios, or resolves a real manifest and prints
//! the resulting catalog.

use anyhow::Context;
use atlasview_core::{EngineConfig, ManifestResolver};
use atlasview_env::{AssetFetcher, FileFetcher, HttpFetcher};
use atlasview_sim::scenarios::ScenarioId;
use atlasview_sim::{ScenarioResult, ScenarioRunner};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "atlasview-sim")]
#[command(about = "Run deterministic layer-engine scenarios for AtlasView", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (startup, toggle_storm, time_scrub, video_sync, legend_handoff, flaky_assets, camera_spin, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Upper bound on simulated fetch latency, in scheduler yields
    #[arg(short, long, default_value = "16")]
    latency: u32,

    /// Engine configuration (JSON); missing fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resolve the configured manifest for real and print the catalog
    #[arg(long)]
    resolve: bool,

    /// Serve the configured origin from this directory instead of HTTP
    #[arg(long, requires = "resolve")]
    root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Option<EngineConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(config))
}

/// Resolves a live manifest and prints one line (or one JSON object) per layer.
fn resolve_live(config: EngineConfig, root: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let fetcher: Arc<dyn AssetFetcher> = match root {
        Some(root) => Arc::new(FileFetcher::mapped(config.origin.clone(), root)),
        None if config.origin.scheme() == "file" => Arc::new(FileFetcher::new()),
        None => Arc::new(HttpFetcher::new()),
    };
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let catalog = runtime.block_on(ManifestResolver::new(config, fetcher).resolve())?;

    if json {
        let layers: Vec<_> = catalog
            .iter()
            .map(|desc| {
                serde_json::json!({
                    "key": desc.key.as_str(),
                    "type": desc.kind().tag(),
                    "category": desc.category(),
                    "default": desc.is_default,
                    "url": desc.url,
                })
            })
            .collect();
        let summary = serde_json::json!({
            "layers": layers,
            "startup": catalog.startup_keys().iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "categories": catalog.categories(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for category in catalog.categories() {
            info!("{category}");
            for desc in catalog.in_category(&category) {
                info!("  {} [{}]{}", desc.key, desc.kind(), if desc.is_default { " (default)" } else { "" });
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let level = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    let config = load_config(args.config.as_ref())?;

    if args.resolve {
        return resolve_live(config.unwrap_or_default(), args.root, args.json);
    }

    if !args.json {
        info!("AtlasView Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().map_err(anyhow::Error::msg)?]
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let mut runner = ScenarioRunner::new(seed).with_latency(args.latency);
        if let Some(config) = &config {
            runner = runner.with_config(config.clone());
        }

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "layers": r.metrics.layers_resolved,
                    "fetches": r.metrics.fetches,
                    "toggles": r.metrics.toggles,
                    "frames": r.metrics.frames,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
        }
    }

    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}
