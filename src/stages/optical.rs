//! Optical forward stage: fluence and initial pressure.
//!
//! Two adapters. `diffusion` is the built-in reference model: it spreads
//! the pulse energy over the illuminated surface, attenuates each column
//! with the local effective attenuation coefficient from diffusion theory
//! and converts the resulting fluence into initial pressure. `mcx_like`
//! hands the optical problem to an external Monte Carlo solver through
//! the exchange-directory protocol and only computes the pressure
//! conversion locally, so both adapters produce the same categories.

use crate::pipeline::{PipelineError, SimulationStage, StageContext};
use crate::settings::{keys, Scope, Value};
use crate::solver::{self, exchange, SolverError, SolverRequest};
use crate::store::Category;
use log::{debug, warn};
use ndarray::{Array2, Array3};
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

const SOLVER_NAME: &str = "mcx_like";
const FLUENCE_FILE: &str = "fluence.raw";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpticalAdapter {
    Diffusion,
    McxLike,
}

impl OpticalAdapter {
    const KNOWN: &'static [&'static str] = &["diffusion", "mcx_like"];

    fn from_name(name: &str) -> Result<OpticalAdapter, PipelineError> {
        match name {
            "diffusion" => Ok(OpticalAdapter::Diffusion),
            "mcx_like" => Ok(OpticalAdapter::McxLike),
            _ => Err(PipelineError::UnknownAdapter {
                kind: "optical",
                name: name.to_string(),
                known: OpticalAdapter::KNOWN,
            }),
        }
    }
}

pub struct OpticalStage {
    adapter: Option<OpticalAdapter>,
}

impl OpticalStage {
    pub fn new() -> OpticalStage {
        OpticalStage { adapter: None }
    }
}

impl Default for OpticalStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationStage for OpticalStage {
    fn name(&self) -> &'static str {
        "optical"
    }

    fn scope(&self) -> Scope {
        Scope::Optical
    }

    fn required_inputs(&self) -> Vec<Category> {
        vec![
            Category::AbsorptionCoefficient,
            Category::ScatteringCoefficient,
            Category::Anisotropy,
            Category::GruneisenParameter,
        ]
    }

    fn validate(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let adapter = OpticalAdapter::from_name(&ctx.settings.get_str(&keys::OPTICAL_ADAPTER)?)?;
        ctx.settings.get_f64(&keys::PULSE_ENERGY_MJ)?;
        if adapter == OpticalAdapter::McxLike {
            ctx.settings.get_u64(&keys::PHOTON_COUNT)?;
            if ctx.paths.binary_for(SOLVER_NAME).is_none() {
                return Err(SolverError::NotConfigured {
                    solver: SOLVER_NAME.to_string(),
                }
                .into());
            }
        }
        self.adapter = Some(adapter);
        Ok(())
    }

    fn run(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let mua = ctx
            .store
            .read_volume(Category::AbsorptionCoefficient, ctx.wavelength_nm)?;

        let fluence = match self.adapter.unwrap_or(OpticalAdapter::Diffusion) {
            OpticalAdapter::Diffusion => diffusion_fluence(ctx, &mua)?,
            OpticalAdapter::McxLike => external_fluence(ctx, &mua)?,
        };

        let gamma = ctx
            .store
            .read_volume_or_global(Category::GruneisenParameter, ctx.wavelength_nm)?;
        let pressure = &gamma * &mua * &fluence;

        ctx.store
            .write_volume(Category::Fluence, ctx.wavelength_nm, &fluence)?;
        ctx.store
            .write_volume(Category::InitialPressure, ctx.wavelength_nm, &pressure)?;
        Ok(())
    }
}

/// Effective attenuation from diffusion theory, per mm.
fn effective_attenuation(mua: f64, mus: f64, g: f64) -> f64 {
    let reduced_scattering = mus * (1.0 - g);
    (3.0 * mua * (mua + reduced_scattering)).sqrt()
}

fn diffusion_fluence(
    ctx: &mut StageContext<'_>,
    mua: &Array3<f64>,
) -> Result<Array3<f64>, PipelineError> {
    let mus = ctx
        .store
        .read_volume(Category::ScatteringCoefficient, ctx.wavelength_nm)?;
    let g = ctx.store.read_volume(Category::Anisotropy, ctx.wavelength_nm)?;
    let energy_mj = ctx.settings.get_f64(&keys::PULSE_ENERGY_MJ)?;

    let grid = ctx.grid;
    let [nx, ny, nz] = grid.dims;
    let spacing = grid.spacing_mm;
    let origin = ctx.device.illumination_origin_mm();

    let mut weights = Array2::<f64>::zeros((nx, ny));
    for i in 0..nx {
        for j in 0..ny {
            let centre = grid.voxel_centre_mm(i, j, 0);
            weights[[i, j]] = ctx.device.illumination.surface_weight(
                centre.x - origin[0],
                centre.y - origin[1],
                spacing,
            );
        }
    }

    let area = spacing * spacing;
    let total = weights.sum() * area;
    if total <= 0.0 {
        warn!("illumination pattern misses the volume surface, fluence is zero");
        return Ok(Array3::zeros(grid.dims));
    }

    // Surface fluence integrates back to the pulse energy, then each column
    // decays with the accumulated optical depth, sampled at voxel centres.
    let mut fluence = Array3::<f64>::zeros(grid.dims);
    for i in 0..nx {
        for j in 0..ny {
            let surface = energy_mj * weights[[i, j]] / total;
            if surface == 0.0 {
                continue;
            }
            let mut optical_depth = 0.0;
            for k in 0..nz {
                let mu_eff = effective_attenuation(mua[[i, j, k]], mus[[i, j, k]], g[[i, j, k]]);
                let step = mu_eff * spacing;
                fluence[[i, j, k]] = surface * (-(optical_depth + 0.5 * step)).exp();
                optical_depth += step;
            }
        }
    }
    Ok(fluence)
}

fn external_fluence(
    ctx: &mut StageContext<'_>,
    mua: &Array3<f64>,
) -> Result<Array3<f64>, PipelineError> {
    let dir = solver::exchange_dir(ctx.output_dir, "optical", ctx.wavelength_nm);
    fs::create_dir_all(&dir)?;

    match run_external(ctx, mua, &dir) {
        Ok(fluence) => {
            if let Err(err) = fs::remove_dir_all(&dir) {
                warn!("could not remove exchange directory {}: {err}", dir.display());
            }
            Ok(fluence)
        }
        Err(err) => {
            warn!("exchange directory kept for inspection: {}", dir.display());
            Err(err)
        }
    }
}

fn run_external(
    ctx: &mut StageContext<'_>,
    mua: &Array3<f64>,
    dir: &std::path::Path,
) -> Result<Array3<f64>, PipelineError> {
    let mus = ctx
        .store
        .read_volume(Category::ScatteringCoefficient, ctx.wavelength_nm)?;
    let g = ctx.store.read_volume(Category::Anisotropy, ctx.wavelength_nm)?;

    exchange::write_array3(&dir.join("mua.raw"), mua)?;
    exchange::write_array3(&dir.join("mus.raw"), &mus)?;
    exchange::write_array3(&dir.join("g.raw"), &g)?;

    let mut stage_settings = ctx.settings.scope_entries(Scope::Optical);
    stage_settings.insert(
        "use_gpu".to_string(),
        Value::Bool(ctx.settings.get_bool(&keys::USE_GPU)?),
    );

    let mut inputs = BTreeMap::new();
    inputs.insert("absorption_coefficient".to_string(), "mua.raw".to_string());
    inputs.insert("scattering_coefficient".to_string(), "mus.raw".to_string());
    inputs.insert("anisotropy".to_string(), "g.raw".to_string());

    exchange::ProblemDescription {
        task: "optical_forward".to_string(),
        wavelength_nm: ctx.wavelength_nm,
        grid: ctx.grid,
        settings: stage_settings,
        inputs,
        output: FLUENCE_FILE.to_string(),
    }
    .save(dir)?;

    let binary = ctx
        .paths
        .binary_for(SOLVER_NAME)
        .ok_or_else(|| SolverError::NotConfigured {
            solver: SOLVER_NAME.to_string(),
        })?
        .to_path_buf();
    let timeout = Duration::from_secs_f64(ctx.settings.get_f64(&keys::OPTICAL_TIMEOUT_S)?);

    let output = solver::invoke(&SolverRequest {
        binary,
        args: vec![exchange::PROBLEM_FILE.to_string()],
        workdir: dir.to_path_buf(),
        timeout,
    })?;
    debug!(
        "optical solver finished in {:.2} s",
        output.duration.as_secs_f64()
    );

    let fluence = exchange::read_array3(&dir.join(FLUENCE_FILE))?;
    let [nx, ny, nz] = ctx.grid.dims;
    if fluence.dim() != (nx, ny, nz) {
        return Err(SolverError::MalformedOutput {
            reason: format!(
                "fluence shape {:?} does not match the grid {:?}",
                fluence.shape(),
                ctx.grid.dims
            ),
        }
        .into());
    }
    Ok(fluence)
}
