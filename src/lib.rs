// THEORY:
// This file is the main entry point for the `plant_tracker` library crate.
// It defines the public API exposed to external consumers, such as a sequence
// orchestrator that loads images and stores identity volumes.
//
// The primary goal is to export the `Driver` (one frame in, one identity map
// out) and the two in-memory sequence helpers, `TrackingPipeline` and
// `ParallelPipeline`, together with the data structures they speak in
// (`Grid`, `IdentityMap`, `FrameCosts`, `TrackerConfig`, `IdentityLedger`).
// The stage internals live in `core_modules` and are public for callers that
// want to run a single stage, but the `Driver` is the intended interface.
//
// Key architectural principles:
// 1.  **No hidden state**: every cross-frame fact (the previous map, the
//     highest identity issued) is an explicit argument.
// 2.  **Trait seams**: the energy solver and the cost provider are traits, so
//     the graph-cut backend and the colour model can be swapped.
// 3.  **One error type**: every fallible operation returns `plant_tracker::Result`.

pub mod config;
pub mod core_modules;
pub mod driver;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::TrackerConfig;
pub use core_modules::costs::{ChromaCostProvider, CostProvider, FrameCosts, PairwiseField};
pub use core_modules::energy::{AlphaExpansion, EnergySolver, LabelCosts};
pub use core_modules::grid::{Grid, IdentityMap, Mask};
pub use core_modules::labeling::Connectivity;
pub use core_modules::topology_repair::RepairReport;
pub use core_modules::tracker::IdentityLedger;
pub use driver::Driver;
pub use error::{Error, Result};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::TrackingPipeline;

mod error {
    use thiserror::Error;

    /// Errors that can occur while segmenting and tracking plants
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Shape mismatch: expected {expected}, got {got}")]
        ShapeMismatch { expected: String, got: String },

        #[error("Cannot split a blob among zero candidate identities")]
        NoCandidates,

        #[error("Energy solver error: {0}")]
        Solver(String),

        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Pipeline worker error: {0}")]
        Worker(String),
    }

    /// Result type for plant_tracker operations
    pub type Result<T> = std::result::Result<T, Error>;
}
