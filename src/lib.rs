//! Photoacoustic imaging simulation pipeline.
//!
//! A simulation run turns a declarative tissue model into a reconstructed
//! image through a fixed sequence of stages: volume creation, optical
//! forward modelling, acoustic forward modelling, optional noise
//! injection and reconstruction. Stages communicate only through an
//! append-only data container on disk, configured through a validated
//! hierarchical settings tree, and may delegate the heavy numerics to
//! external solver processes.

pub mod device;
pub mod grid;
pub mod paths;
pub mod pipeline;
pub mod settings;
pub mod solver;
pub mod stages;
pub mod store;
pub mod volume;

// Re-exports for easier access
pub use grid::GridGeometry;
pub use pipeline::{run_pipeline, PipelineError, RunOptions, RunSummary, SimulationStage};
pub use settings::{GlobalSettings, Settings, SettingsError};
pub use stages::standard_pipeline;
pub use store::{Category, SimulationStore};
pub use volume::TissueModel;
