//! AtlasView Deterministic Simulation Harness
//!
//! Runs the layer engine end to end without a renderer or a network.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock that moves only when the harness ticks it
//! - **Assets**: in-memory documents with latency and faults derived from one seed
//! - **Viewer**: an in-memory scene that records every insertion, toggle and seek
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Harness                          │
//! │  ┌───────────────┐   ┌──────────────┐   ┌────────────┐   │
//! │  │ ManifestRes.  │──►│ LayerManager │──►│ SimViewer  │   │
//! │  └───────┬───────┘   └──────┬───────┘   └─────▲──────┘   │
//! │          │                  │                 │ tick     │
//! │  ┌───────▼──────────────────▼───┐     ┌───────┴──────┐   │
//! │  │ SimFetcher (seeded latency)  │     │  SimContext  │   │
//! │  └──────────────────────────────┘     └──────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use atlasview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::ToggleStorm);
//! assert!(result.passed);
//! ```

mod context;
mod fetcher;
pub mod fixtures;
mod runner;
pub mod scenarios;
mod viewer;

pub use context::SimContext;
pub use fetcher::SimFetcher;
pub use fixtures::Deployment;
pub use runner::{Harness, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use viewer::{SimMedia, SimViewer};
