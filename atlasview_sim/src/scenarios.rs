//! Scenario catalogue for the simulation harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: manifest resolution and startup activation
    Startup,

    /// SIM-002: seeded random toggles against a reference model
    ToggleStorm,

    /// SIM-003: time-dimensioned tiles follow the animated clock
    TimeScrub,

    /// SIM-004: video texture tracks the clock, unbinds on hide
    VideoSync,

    /// SIM-005: legend panel hands over between layers
    LegendHandoff,

    /// SIM-006: broken assets drop or fail layers without side effects
    FlakyAssets,

    /// SIM-007: camera spin in 3D and 2D, stops at a frame boundary
    CameraSpin,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Startup,
            ScenarioId::ToggleStorm,
            ScenarioId::TimeScrub,
            ScenarioId::VideoSync,
            ScenarioId::LegendHandoff,
            ScenarioId::FlakyAssets,
            ScenarioId::CameraSpin,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Startup => "startup",
            ScenarioId::ToggleStorm => "toggle_storm",
            ScenarioId::TimeScrub => "time_scrub",
            ScenarioId::VideoSync => "video_sync",
            ScenarioId::LegendHandoff => "legend_handoff",
            ScenarioId::FlakyAssets => "flaky_assets",
            ScenarioId::CameraSpin => "camera_spin",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Startup => "Resolve the manifest under random latency, activate default and startup layers",
            ScenarioId::ToggleStorm => "200 seeded toggles; active set must match the reference model",
            ScenarioId::TimeScrub => "Animate the clock across daily WMTS intervals and watch the Time dimension",
            ScenarioId::VideoSync => "Bind a looping video to the clock, then hide it and check it unbinds",
            ScenarioId::LegendHandoff => "Show and hide legend-bearing layers, check the fallback owner",
            ScenarioId::FlakyAssets => "Inject fetch failures into descriptors and data files",
            ScenarioId::CameraSpin => "Spin in 3D, pan in 2D, stop mid-stream",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "startup" | "sim-001" => Ok(ScenarioId::Startup),
            "toggle_storm" | "togglestorm" | "sim-002" => Ok(ScenarioId::ToggleStorm),
            "time_scrub" | "timescrub" | "sim-003" => Ok(ScenarioId::TimeScrub),
            "video_sync" | "videosync" | "sim-004" => Ok(ScenarioId::VideoSync),
            "legend_handoff" | "legendhandoff" | "sim-005" => Ok(ScenarioId::LegendHandoff),
            "flaky_assets" | "flakyassets" | "sim-006" => Ok(ScenarioId::FlakyAssets),
            "camera_spin" | "cameraspin" | "sim-007" => Ok(ScenarioId::CameraSpin),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
        }
        assert_eq!("SIM-004".parse::<ScenarioId>(), Ok(ScenarioId::VideoSync));
        assert!("nope".parse::<ScenarioId>().is_err());
    }
}
