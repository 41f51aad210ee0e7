//! Pipeline execution.

use super::{PipelineError, SimulationStage, StageContext, StageState};
use crate::device::PhotoacousticDevice;
use crate::grid::GridGeometry;
use crate::paths::PathConfig;
use crate::settings::{keys, Settings, Value};
use crate::store::{self, SimulationStore, GLOBAL_WAVELENGTH};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Knobs for one pipeline run.
#[derive(Default)]
pub struct RunOptions {
    /// Cooperative cancellation flag, polled between stages.
    pub cancel: Option<Arc<AtomicBool>>,
    /// External solver locations.
    pub paths: PathConfig,
}

/// One completed stage execution.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: &'static str,
    pub wavelength_nm: u32,
    pub duration: Duration,
}

/// What a finished run produced and where.
#[derive(Debug)]
pub struct RunSummary {
    pub simulation_name: String,
    pub container_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub wavelengths_nm: Vec<u32>,
    pub reports: Vec<StageReport>,
}

fn cancel_requested(options: &RunOptions) -> bool {
    options
        .cancel
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

/// Execute `stages` once per configured wavelength.
///
/// The run directory gains a fresh data container plus a settings snapshot
/// taken after validation, so every run is reproducible from its own
/// artefacts. The only settings mutation during the run is the per-loop
/// update of the current-wavelength key.
pub fn run_pipeline(
    settings: &mut Settings,
    device: &PhotoacousticDevice,
    mut stages: Vec<Box<dyn SimulationStage>>,
    options: RunOptions,
) -> Result<RunSummary, PipelineError> {
    let simulation_name = settings.get_str(&keys::SIMULATION_NAME)?;
    let output_dir = settings.get_path(&keys::OUTPUT_DIR)?;
    let spacing_mm = settings.get_f64(&keys::SPACING_MM)?;
    let extent_mm = settings.get_triple(&keys::VOLUME_EXTENT_MM)?;
    let seed = settings.get_u64(&keys::RANDOM_SEED)?;
    let mut wavelengths = settings.get_wavelengths(&keys::WAVELENGTHS_NM)?;
    wavelengths.sort_unstable();
    wavelengths.dedup();

    let grid = GridGeometry::from_extent(extent_mm, spacing_mm);
    info!(
        "simulation '{simulation_name}': grid {:?} at {spacing_mm} mm, \
         device '{}', wavelengths {wavelengths:?} nm",
        grid.dims, device.name
    );

    std::fs::create_dir_all(&output_dir)?;
    device.check_within(&grid)?;

    let container_path = output_dir.join(store::container_file_name(&simulation_name));
    let mut store = SimulationStore::create(&container_path)?;

    // Validate the whole pipeline before any stage runs: a bad adapter
    // name in the last stage must fail before the first stage starts.
    for stage in &mut stages {
        debug!("validating stage '{}'", stage.name());
        let mut ctx = StageContext {
            settings,
            store: &mut store,
            device,
            grid,
            paths: &options.paths,
            output_dir: &output_dir,
            wavelength_nm: GLOBAL_WAVELENGTH,
            seed,
        };
        stage.validate(&mut ctx)?;
    }

    let snapshot_path = output_dir.join(store::snapshot_file_name(&simulation_name));
    settings.save(&snapshot_path)?;
    debug!("settings snapshot written to {}", snapshot_path.display());

    let mut reports = Vec::with_capacity(stages.len() * wavelengths.len());
    for &wavelength_nm in &wavelengths {
        settings.set(&keys::CURRENT_WAVELENGTH_NM, Value::Int(wavelength_nm as i64))?;
        info!("--- wavelength {wavelength_nm} nm ---");

        for stage in &mut stages {
            if cancel_requested(&options) {
                warn!("cancellation requested, stopping before '{}'", stage.name());
                return Err(PipelineError::Cancelled {
                    stage: stage.name().to_string(),
                });
            }

            for category in stage.required_inputs() {
                let present = store.contains(category, wavelength_nm)
                    || store.contains(category, GLOBAL_WAVELENGTH);
                if !present {
                    return Err(PipelineError::MissingInput {
                        stage: stage.name(),
                        category,
                        wavelength_nm,
                    });
                }
            }

            debug!(
                "stage '{}' {} -> {}",
                stage.name(),
                StageState::Pending,
                StageState::Running
            );
            let started = Instant::now();
            let mut ctx = StageContext {
                settings,
                store: &mut store,
                device,
                grid,
                paths: &options.paths,
                output_dir: &output_dir,
                wavelength_nm,
                seed,
            };
            match stage.run(&mut ctx) {
                Ok(()) => {
                    let duration = started.elapsed();
                    debug!(
                        "stage '{}' {} -> {}",
                        stage.name(),
                        StageState::Running,
                        StageState::Completed
                    );
                    info!(
                        "stage '{}' completed at {wavelength_nm} nm in {:.2} s",
                        stage.name(),
                        duration.as_secs_f64()
                    );
                    reports.push(StageReport {
                        stage: stage.name(),
                        wavelength_nm,
                        duration,
                    });
                }
                Err(err) => {
                    error!(
                        "stage '{}' {} at {wavelength_nm} nm: {err}",
                        stage.name(),
                        StageState::Failed
                    );
                    return Err(err);
                }
            }
        }
    }

    info!(
        "simulation '{simulation_name}' finished: {} stage executions, \
         container at {}",
        reports.len(),
        container_path.display()
    );
    Ok(RunSummary {
        simulation_name,
        container_path,
        snapshot_path,
        wavelengths_nm: wavelengths,
        reports,
    })
}
