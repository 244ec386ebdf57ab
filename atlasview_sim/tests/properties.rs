//! Property tests over the full engine on the simulated viewer.

use atlasview_core::{LayerKey, ToggleOutcome};
use atlasview_sim::scenarios::ScenarioId;
use atlasview_sim::{fixtures, Harness, ScenarioRunner};
use proptest::prelude::*;
use std::future::Future;

const TOGGLEABLE: [&str; 5] = ["sst", "ports", "clouds", "cities", "satellites"];

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

fn any_key() -> impl Strategy<Value = &'static str> {
    prop::sample::select(fixtures::LAYERS.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_catalog_follows_manifest_order(seed in any::<u64>(), latency in 0u32..64) {
        let keys = block_on(async {
            let h = Harness::boot(seed, latency).await.unwrap();
            h.manager.catalog().keys()
        });
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        prop_assert_eq!(keys, fixtures::RESOLVABLE.to_vec());
    }

    #[test]
    fn prop_double_toggle_restores_visibility(
        seed in any::<u64>(),
        key in prop::sample::select(TOGGLEABLE.to_vec()),
        prefix in prop::collection::vec(any_key(), 0..12),
    ) {
        let (before, after, rasters_before, rasters_after) = block_on(async {
            let h = Harness::boot(seed, 8).await.unwrap();
            for k in &prefix {
                h.toggle(k).await;
            }
            if h.manager.resource(&LayerKey::from(key)).is_none() {
                h.toggle(key).await;
            }
            let before = h.is_active(key);
            let rasters_before = h.viewer.raster_order().len();
            h.toggle(key).await;
            h.toggle(key).await;
            (before, h.is_active(key), rasters_before, h.viewer.raster_order().len())
        });
        prop_assert_eq!(before, after);
        prop_assert_eq!(rasters_before, rasters_after);
    }

    #[test]
    fn prop_default_layer_ignores_toggles(seed in any::<u64>(), n in 1usize..8) {
        let (outcomes, active) = block_on(async {
            let h = Harness::boot(seed, 8).await.unwrap();
            let mut outcomes = Vec::new();
            for _ in 0..n {
                outcomes.push(h.toggle("blue_marble").await);
            }
            (outcomes, h.is_active("blue_marble"))
        });
        prop_assert!(outcomes.iter().all(|o| *o == ToggleOutcome::Locked));
        prop_assert!(active);
    }

    #[test]
    fn prop_video_binding_tracks_visibility(seed in any::<u64>(), n in 1usize..9) {
        let (bound, active, bindings, listeners) = block_on(async {
            let h = Harness::boot(seed, 8).await.unwrap();
            for _ in 0..n {
                h.toggle("clouds").await;
            }
            let key = LayerKey::from("clouds");
            (
                h.manager.video().is_bound(&key),
                h.is_active("clouds"),
                h.manager.video().binding_count(),
                h.viewer.listener_count(),
            )
        });
        prop_assert_eq!(bound, active);
        prop_assert!(bindings <= 1);
        prop_assert_eq!(listeners, bindings);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_toggle_storm_matches_model(seed in any::<u64>()) {
        let result = ScenarioRunner::new(seed).run(ScenarioId::ToggleStorm);
        prop_assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn prop_legend_handoff_for_any_completion_order(seed in any::<u64>(), latency in 0u32..64) {
        let result = ScenarioRunner::new(seed).with_latency(latency).run(ScenarioId::LegendHandoff);
        prop_assert!(result.passed, "{:?}", result.failure_reason);
    }
}
