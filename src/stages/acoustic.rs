//! Acoustic forward stage: detector time series from initial pressure.
//!
//! The built-in `spherical_projection` adapter treats every voxel as an
//! independent spherical emitter: its pressure contribution arrives at
//! each detector element after the straight-line travel time and is
//! attenuated by spherical spreading. Contributions are binned onto the
//! configured sampling clock, splitting linearly between the two
//! neighbouring samples. Dispersion, reflection and finite element
//! apertures are the business of a real wave solver, reachable through
//! the `kwave_like` adapter.

use crate::pipeline::{PipelineError, SimulationStage, StageContext};
use crate::settings::{keys, Scope, Value};
use crate::solver::exchange::{self, ResultMetadata};
use crate::solver::{self, SolverError, SolverRequest};
use crate::store::Category;
use log::{debug, warn};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

const SOLVER_NAME: &str = "kwave_like";
const SERIES_FILE: &str = "time_series.raw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcousticAdapter {
    SphericalProjection,
    KwaveLike,
}

impl AcousticAdapter {
    const KNOWN: &'static [&'static str] = &["spherical_projection", "kwave_like"];

    fn from_name(name: &str) -> Result<AcousticAdapter, PipelineError> {
        match name {
            "spherical_projection" => Ok(AcousticAdapter::SphericalProjection),
            "kwave_like" => Ok(AcousticAdapter::KwaveLike),
            _ => Err(PipelineError::UnknownAdapter {
                kind: "acoustic",
                name: name.to_string(),
                known: AcousticAdapter::KNOWN,
            }),
        }
    }
}

pub struct AcousticStage {
    adapter: Option<AcousticAdapter>,
}

impl AcousticStage {
    pub fn new() -> AcousticStage {
        AcousticStage { adapter: None }
    }
}

impl Default for AcousticStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationStage for AcousticStage {
    fn name(&self) -> &'static str {
        "acoustic"
    }

    fn scope(&self) -> Scope {
        Scope::Acoustic
    }

    fn required_inputs(&self) -> Vec<Category> {
        let mut inputs = vec![Category::InitialPressure, Category::SoundSpeed];
        if self.adapter == Some(AcousticAdapter::KwaveLike) {
            inputs.push(Category::Density);
            inputs.push(Category::AcousticAttenuation);
        }
        inputs
    }

    fn validate(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let adapter = AcousticAdapter::from_name(&ctx.settings.get_str(&keys::ACOUSTIC_ADAPTER)?)?;
        ctx.settings.get_usize(&keys::SAMPLE_COUNT)?;
        ctx.settings.get_f64(&keys::SAMPLING_RATE_MHZ)?;
        if adapter == AcousticAdapter::KwaveLike && ctx.paths.binary_for(SOLVER_NAME).is_none() {
            return Err(SolverError::NotConfigured {
                solver: SOLVER_NAME.to_string(),
            }
            .into());
        }
        self.adapter = Some(adapter);
        Ok(())
    }

    fn run(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let sample_count = ctx.settings.get_usize(&keys::SAMPLE_COUNT)?;
        let rate_mhz = ctx.settings.get_f64(&keys::SAMPLING_RATE_MHZ)?;
        let time_step_s = 1.0e-6 / rate_mhz;

        let (series, meta) = match self.adapter.unwrap_or(AcousticAdapter::SphericalProjection) {
            AcousticAdapter::SphericalProjection => {
                let series = project_spherical(ctx, sample_count, time_step_s)?;
                let meta = ResultMetadata {
                    time_step_s,
                    sample_count,
                };
                (series, meta)
            }
            AcousticAdapter::KwaveLike => external_series(ctx)?,
        };

        ctx.store
            .write_matrix(Category::TimeSeries, ctx.wavelength_nm, &series)?;
        ctx.store
            .write_meta(Category::TimeSeries, ctx.wavelength_nm, &meta)?;
        Ok(())
    }
}

/// Arrival-time binning of every voxel onto every detector element.
fn project_spherical(
    ctx: &mut StageContext<'_>,
    sample_count: usize,
    time_step_s: f64,
) -> Result<Array2<f64>, PipelineError> {
    let pressure = ctx
        .store
        .read_volume(Category::InitialPressure, ctx.wavelength_nm)?;
    let sound_speed = ctx
        .store
        .read_volume_or_global(Category::SoundSpeed, ctx.wavelength_nm)?;

    // A voxel-resolved propagation medium is beyond a projection model;
    // use the mean speed for the whole path.
    let mean_speed_m_s = sound_speed.sum() / sound_speed.len() as f64;
    let speed_mm_s = mean_speed_m_s * 1000.0;

    let grid = ctx.grid;
    let spacing = grid.spacing_mm;
    let voxel_volume = spacing * spacing * spacing;
    let min_radius = spacing / 2.0;
    let positions = ctx.device.element_positions_mm();

    let mut series = Array2::<f64>::zeros((positions.len(), sample_count));
    series
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(positions.par_iter())
        .for_each(|(mut row, element)| {
            for ((i, j, k), &p0) in pressure.indexed_iter() {
                if p0 == 0.0 {
                    continue;
                }
                let centre = grid.voxel_centre_mm(i, j, k);
                let radius = (centre - *element).norm().max(min_radius);
                let arrival_s = radius / speed_mm_s;
                let position = arrival_s / time_step_s;
                let bin = position.floor() as usize;
                if bin + 1 >= sample_count {
                    continue;
                }
                let amplitude = p0 * voxel_volume / (4.0 * std::f64::consts::PI * radius * radius);
                let fraction = position - position.floor();
                row[bin] += amplitude * (1.0 - fraction);
                row[bin + 1] += amplitude * fraction;
            }
        });
    Ok(series)
}

fn external_series(
    ctx: &mut StageContext<'_>,
) -> Result<(Array2<f64>, ResultMetadata), PipelineError> {
    let dir = solver::exchange_dir(ctx.output_dir, "acoustic", ctx.wavelength_nm);
    fs::create_dir_all(&dir)?;

    match run_external(ctx, &dir) {
        Ok(result) => {
            if let Err(err) = fs::remove_dir_all(&dir) {
                warn!("could not remove exchange directory {}: {err}", dir.display());
            }
            Ok(result)
        }
        Err(err) => {
            warn!("exchange directory kept for inspection: {}", dir.display());
            Err(err)
        }
    }
}

fn run_external(
    ctx: &mut StageContext<'_>,
    dir: &std::path::Path,
) -> Result<(Array2<f64>, ResultMetadata), PipelineError> {
    let pressure = ctx
        .store
        .read_volume(Category::InitialPressure, ctx.wavelength_nm)?;
    let sound_speed = ctx
        .store
        .read_volume_or_global(Category::SoundSpeed, ctx.wavelength_nm)?;
    let density = ctx
        .store
        .read_volume_or_global(Category::Density, ctx.wavelength_nm)?;
    let attenuation = ctx
        .store
        .read_volume_or_global(Category::AcousticAttenuation, ctx.wavelength_nm)?;

    exchange::write_array3(&dir.join("p0.raw"), &pressure)?;
    exchange::write_array3(&dir.join("sos.raw"), &sound_speed)?;
    exchange::write_array3(&dir.join("rho.raw"), &density)?;
    exchange::write_array3(&dir.join("alpha.raw"), &attenuation)?;
    exchange::write_array2(&dir.join("detectors.raw"), &detector_matrix(ctx))?;

    let mut stage_settings = ctx.settings.scope_entries(Scope::Acoustic);
    stage_settings.insert(
        "use_gpu".to_string(),
        Value::Bool(ctx.settings.get_bool(&keys::USE_GPU)?),
    );

    let mut inputs = BTreeMap::new();
    inputs.insert("initial_pressure".to_string(), "p0.raw".to_string());
    inputs.insert("sound_speed".to_string(), "sos.raw".to_string());
    inputs.insert("density".to_string(), "rho.raw".to_string());
    inputs.insert("acoustic_attenuation".to_string(), "alpha.raw".to_string());
    inputs.insert("detector_positions".to_string(), "detectors.raw".to_string());

    exchange::ProblemDescription {
        task: "acoustic_forward".to_string(),
        wavelength_nm: ctx.wavelength_nm,
        grid: ctx.grid,
        settings: stage_settings,
        inputs,
        output: SERIES_FILE.to_string(),
    }
    .save(dir)?;

    let binary = ctx
        .paths
        .binary_for(SOLVER_NAME)
        .ok_or_else(|| SolverError::NotConfigured {
            solver: SOLVER_NAME.to_string(),
        })?
        .to_path_buf();
    let timeout = Duration::from_secs_f64(ctx.settings.get_f64(&keys::ACOUSTIC_TIMEOUT_S)?);

    let output = solver::invoke(&SolverRequest {
        binary,
        args: vec![exchange::PROBLEM_FILE.to_string()],
        workdir: dir.to_path_buf(),
        timeout,
    })?;
    debug!(
        "acoustic solver finished in {:.2} s",
        output.duration.as_secs_f64()
    );

    let series = exchange::read_array2(&dir.join(SERIES_FILE))?;
    let meta = ResultMetadata::load(dir)?;
    let elements = ctx.device.element_count();
    if series.nrows() != elements {
        return Err(SolverError::MalformedOutput {
            reason: format!(
                "time series has {} rows for {} detector elements",
                series.nrows(),
                elements
            ),
        }
        .into());
    }
    if series.ncols() != meta.sample_count {
        return Err(SolverError::MalformedOutput {
            reason: format!(
                "time series has {} samples but metadata declares {}",
                series.ncols(),
                meta.sample_count
            ),
        }
        .into());
    }
    Ok((series, meta))
}

/// Element positions as an elements x 3 matrix, mm, volume frame.
fn detector_matrix(ctx: &StageContext<'_>) -> Array2<f64> {
    let positions = ctx.device.element_positions_mm();
    let mut matrix = Array2::<f64>::zeros((positions.len(), 3));
    for (row, position) in positions.iter().enumerate() {
        for axis in 0..3 {
            matrix[[row, axis]] = position[axis];
        }
    }
    matrix
}
