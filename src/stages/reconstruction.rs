//! Reconstruction stage: detector time series back to an image volume.
//!
//! Delay-and-sum back-projection with an optional delay-multiply-and-sum
//! variant. For every voxel inside the device field of view the expected
//! one-way travel time to each detector element is converted into a
//! fractional sample position and the (linearly interpolated) samples are
//! combined. An optional FFT bandpass with raised-cosine band edges runs
//! over each detector channel before back-projection.

use crate::pipeline::{PipelineError, SimulationStage, StageContext};
use crate::settings::{keys, Scope, SettingsError};
use crate::solver::exchange::ResultMetadata;
use crate::store::Category;
use log::debug;
use ndarray::{s, Array2, Array3, ArrayView1};
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconAlgorithm {
    DelayAndSum,
    DelayMultiplyAndSum,
}

impl ReconAlgorithm {
    const KNOWN: &'static [&'static str] = &["delay_and_sum", "delay_multiply_and_sum"];

    fn from_name(name: &str) -> Result<ReconAlgorithm, PipelineError> {
        match name {
            "delay_and_sum" => Ok(ReconAlgorithm::DelayAndSum),
            "delay_multiply_and_sum" => Ok(ReconAlgorithm::DelayMultiplyAndSum),
            _ => Err(PipelineError::UnknownAdapter {
                kind: "reconstruction",
                name: name.to_string(),
                known: ReconAlgorithm::KNOWN,
            }),
        }
    }
}

fn input_category(name: &str) -> Category {
    match name {
        "noisy_time_series" => Category::NoisyTimeSeries,
        _ => Category::TimeSeries,
    }
}

pub struct ReconstructionStage {
    algorithm: Option<ReconAlgorithm>,
    input: Category,
}

impl ReconstructionStage {
    pub fn new() -> ReconstructionStage {
        ReconstructionStage {
            algorithm: None,
            input: Category::TimeSeries,
        }
    }
}

impl Default for ReconstructionStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationStage for ReconstructionStage {
    fn name(&self) -> &'static str {
        "reconstruction"
    }

    fn scope(&self) -> Scope {
        Scope::Reconstruction
    }

    fn required_inputs(&self) -> Vec<Category> {
        vec![self.input]
    }

    fn validate(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let algorithm =
            ReconAlgorithm::from_name(&ctx.settings.get_str(&keys::RECON_ALGORITHM)?)?;
        self.input = input_category(&ctx.settings.get_str(&keys::RECON_INPUT)?);
        ctx.settings.get_f64(&keys::RECON_SPEED_OF_SOUND)?;

        if ctx.settings.get_bool(&keys::BANDPASS_ENABLED)? {
            let low = ctx.settings.get_f64(&keys::BANDPASS_LOW_MHZ)?;
            let high = ctx.settings.get_f64(&keys::BANDPASS_HIGH_MHZ)?;
            if low >= high {
                return Err(SettingsError::InvalidValue {
                    scope: Scope::Reconstruction,
                    key: keys::BANDPASS_LOW_MHZ.name.to_string(),
                    reason: format!("pass band is empty ({low} MHz .. {high} MHz)"),
                }
                .into());
            }
        }

        self.algorithm = Some(algorithm);
        Ok(())
    }

    fn run(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let algorithm = self.algorithm.unwrap_or(ReconAlgorithm::DelayAndSum);
        let mut series = ctx.store.read_matrix(self.input, ctx.wavelength_nm)?;
        let meta: ResultMetadata = ctx.store.read_meta(self.input, ctx.wavelength_nm)?;

        if ctx.settings.get_bool(&keys::BANDPASS_ENABLED)? {
            let low_hz = ctx.settings.get_f64(&keys::BANDPASS_LOW_MHZ)? * 1.0e6;
            let high_hz = ctx.settings.get_f64(&keys::BANDPASS_HIGH_MHZ)? * 1.0e6;
            debug!(
                "bandpass {:.2}..{:.2} MHz over {} channels",
                low_hz / 1.0e6,
                high_hz / 1.0e6,
                series.nrows()
            );
            bandpass_rows(&mut series, meta.time_step_s, low_hz, high_hz);
        }

        let speed_mm_s = ctx.settings.get_f64(&keys::RECON_SPEED_OF_SOUND)? * 1000.0;
        let volume = back_project(ctx, &series, meta.time_step_s, speed_mm_s, algorithm);
        ctx.store
            .write_volume(Category::Reconstruction, ctx.wavelength_nm, &volume)?;
        Ok(())
    }
}

/// Voxel index bounds of the device field of view, clamped to the grid.
/// Upper bounds are exclusive.
fn field_of_view_box(ctx: &StageContext<'_>) -> ([usize; 3], [usize; 3]) {
    let grid = ctx.grid;
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    for axis in 0..3 {
        let a = ctx.device.position_mm[axis] + ctx.device.field_of_view.min_mm[axis];
        let b = ctx.device.position_mm[axis] + ctx.device.field_of_view.max_mm[axis];
        let lo_f = (a / grid.spacing_mm).floor().max(0.0);
        let hi_f = (b / grid.spacing_mm).ceil().min(grid.dims[axis] as f64);
        lo[axis] = lo_f as usize;
        hi[axis] = hi_f.max(lo_f) as usize;
    }
    (lo, hi)
}

fn back_project(
    ctx: &StageContext<'_>,
    series: &Array2<f64>,
    time_step_s: f64,
    speed_mm_s: f64,
    algorithm: ReconAlgorithm,
) -> Array3<f64> {
    let grid = ctx.grid;
    let (lo, hi) = field_of_view_box(ctx);
    let positions = ctx.device.element_positions_mm();
    let [_, ny, nz] = grid.dims;

    let planes: Vec<(usize, Array2<f64>)> = (lo[0]..hi[0])
        .into_par_iter()
        .map(|i| {
            let mut plane = Array2::<f64>::zeros((ny, nz));
            for j in lo[1]..hi[1] {
                for k in lo[2]..hi[2] {
                    let centre = grid.voxel_centre_mm(i, j, k);
                    let mut sum = 0.0;
                    let mut signed_root_sum = 0.0;
                    let mut magnitude_sum = 0.0;
                    for (element, position) in positions.iter().enumerate() {
                        let delay_s = (centre - *position).norm() / speed_mm_s;
                        let value = delayed_sample(series.row(element), delay_s / time_step_s);
                        match algorithm {
                            ReconAlgorithm::DelayAndSum => sum += value,
                            ReconAlgorithm::DelayMultiplyAndSum => {
                                signed_root_sum += value.signum() * value.abs().sqrt();
                                magnitude_sum += value.abs();
                            }
                        }
                    }
                    plane[[j, k]] = match algorithm {
                        ReconAlgorithm::DelayAndSum => sum,
                        // Pairwise sign-aware products, folded via the
                        // square of the signed-root sum.
                        ReconAlgorithm::DelayMultiplyAndSum => {
                            (signed_root_sum * signed_root_sum - magnitude_sum) / 2.0
                        }
                    };
                }
            }
            (i, plane)
        })
        .collect();

    let mut volume = Array3::<f64>::zeros(grid.dims);
    for (i, plane) in planes {
        volume.slice_mut(s![i, .., ..]).assign(&plane);
    }
    volume
}

fn delayed_sample(row: ArrayView1<'_, f64>, position: f64) -> f64 {
    if !position.is_finite() || position < 0.0 {
        return 0.0;
    }
    let idx = position.floor() as usize;
    if idx + 1 >= row.len() {
        return 0.0;
    }
    let fraction = position - position.floor();
    row[idx] * (1.0 - fraction) + row[idx + 1] * fraction
}

/// In-place bandpass over every detector channel. Band edges get a
/// raised-cosine taper spanning a tenth of the band width.
fn bandpass_rows(series: &mut Array2<f64>, time_step_s: f64, low_hz: f64, high_hz: f64) {
    let n = series.ncols();
    if n == 0 {
        return;
    }
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let inverse = planner.plan_fft_inverse(n);

    let taper = 0.1 * (high_hz - low_hz);
    let weights: Vec<f64> = (0..n)
        .map(|idx| {
            let f = bin_frequency_hz(idx, n, time_step_s).abs();
            band_weight(f, low_hz, high_hz, taper)
        })
        .collect();

    let mut buffer: Vec<Complex<f64>> = Vec::with_capacity(n);
    for mut row in series.rows_mut() {
        buffer.clear();
        buffer.extend(row.iter().map(|&v| Complex::new(v, 0.0)));
        forward.process(&mut buffer);
        for (value, weight) in buffer.iter_mut().zip(&weights) {
            *value *= *weight;
        }
        inverse.process(&mut buffer);
        for (target, value) in row.iter_mut().zip(&buffer) {
            *target = value.re / n as f64;
        }
    }
}

/// Signed frequency of an FFT bin, Hz.
fn bin_frequency_hz(idx: usize, n: usize, time_step_s: f64) -> f64 {
    let span = n as f64 * time_step_s;
    if idx <= n / 2 {
        idx as f64 / span
    } else {
        (idx as f64 - n as f64) / span
    }
}

fn band_weight(f: f64, low_hz: f64, high_hz: f64, taper: f64) -> f64 {
    if f < low_hz || f > high_hz {
        return 0.0;
    }
    if taper <= 0.0 {
        return 1.0;
    }
    if f < low_hz + taper {
        let x = (f - low_hz) / taper;
        0.5 * (1.0 - (std::f64::consts::PI * x).cos())
    } else if f > high_hz - taper {
        let x = (high_hz - f) / taper;
        0.5 * (1.0 - (std::f64::consts::PI * x).cos())
    } else {
        1.0
    }
}
