//! The simulation pipeline: stage contract and orchestration.
//!
//! A pipeline is an ordered list of stages sharing one settings tree, one
//! device and one data container. The orchestrator validates every stage
//! up front, then executes the list once per wavelength. Stages never call
//! each other; all hand-over goes through the container, and each stage
//! declares the categories it requires so a broken ordering fails with a
//! precise error instead of a stack trace from deep inside a stage.

pub mod orchestrator;

// Re-exports for easier access
pub use orchestrator::{run_pipeline, RunOptions, RunSummary, StageReport};

use crate::device::{DeviceError, PhotoacousticDevice};
use crate::grid::GridGeometry;
use crate::paths::{PathConfig, PathConfigError};
use crate::settings::{Scope, Settings, SettingsError};
use crate::solver::SolverError;
use crate::store::{Category, SimulationStore, StoreError};
use crate::volume::VolumeError;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Execution state of a stage, used in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
            StageState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Volume(#[from] VolumeError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Paths(#[from] PathConfigError),
    /// An adapter name outside the closed registry for its stage. Raised
    /// during validation, before any stage runs.
    #[error("unknown {kind} adapter '{name}'; known adapters: {known:?}")]
    UnknownAdapter {
        kind: &'static str,
        name: String,
        known: &'static [&'static str],
    },
    /// A declared input category that no earlier stage produced.
    #[error(
        "stage '{stage}' requires '{category}' at {wavelength_nm} nm, \
         which no earlier stage produced"
    )]
    MissingInput {
        stage: &'static str,
        category: Category,
        wavelength_nm: u32,
    },
    #[error("run cancelled before stage '{stage}'")]
    Cancelled { stage: String },
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a stage sees while validating or running.
pub struct StageContext<'a> {
    pub settings: &'a Settings,
    pub store: &'a mut SimulationStore,
    pub device: &'a PhotoacousticDevice,
    pub grid: GridGeometry,
    pub paths: &'a PathConfig,
    pub output_dir: &'a Path,
    /// Wavelength of the current iteration; [`crate::store::GLOBAL_WAVELENGTH`]
    /// during validation, which runs before the wavelength loop.
    pub wavelength_nm: u32,
    /// Run-level random seed. Stages derive their own streams from it.
    pub seed: u64,
}

/// One stage of the pipeline.
///
/// `validate` runs exactly once, before any stage executes; it resolves
/// adapter names and checks configuration. `run` executes once per
/// wavelength, in pipeline order.
pub trait SimulationStage {
    /// Stable name for logs, reports and errors.
    fn name(&self) -> &'static str;

    /// Settings scope that configures this stage.
    fn scope(&self) -> Scope;

    /// Container categories that must exist before `run`, checked per
    /// wavelength with fallback to the wavelength-independent slot.
    fn required_inputs(&self) -> Vec<Category> {
        Vec::new()
    }

    fn validate(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError>;

    fn run(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError>;
}
