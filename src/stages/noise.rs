//! Noise stage: detector-domain noise on the recorded time series.
//!
//! Reads the clean time series and writes a separate noisy category, so
//! both survive in the container and reconstruction can pick either. The
//! noise stream is seeded from the run seed mixed with the wavelength,
//! giving reproducible runs without repeating the same noise at every
//! wavelength.

use crate::pipeline::{PipelineError, SimulationStage, StageContext};
use crate::settings::{keys, Scope, SettingsError};
use crate::solver::exchange::ResultMetadata;
use crate::store::Category;
use log::debug;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoiseModel {
    Gaussian,
    Poisson,
    SaltAndPepper,
}

impl NoiseModel {
    const KNOWN: &'static [&'static str] = &["gaussian", "poisson", "salt_and_pepper"];

    fn from_name(name: &str) -> Result<NoiseModel, PipelineError> {
        match name {
            "gaussian" => Ok(NoiseModel::Gaussian),
            "poisson" => Ok(NoiseModel::Poisson),
            "salt_and_pepper" => Ok(NoiseModel::SaltAndPepper),
            _ => Err(PipelineError::UnknownAdapter {
                kind: "noise",
                name: name.to_string(),
                known: NoiseModel::KNOWN,
            }),
        }
    }
}

/// Decorrelates the per-wavelength noise streams.
fn noise_seed(seed: u64, wavelength_nm: u32) -> u64 {
    seed ^ (wavelength_nm as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

fn distribution_error(key: &'static str, reason: String) -> PipelineError {
    SettingsError::InvalidValue {
        scope: Scope::Noise,
        key: key.to_string(),
        reason,
    }
    .into()
}

pub struct NoiseStage {
    model: Option<NoiseModel>,
}

impl NoiseStage {
    pub fn new() -> NoiseStage {
        NoiseStage { model: None }
    }
}

impl Default for NoiseStage {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationStage for NoiseStage {
    fn name(&self) -> &'static str {
        "noise"
    }

    fn scope(&self) -> Scope {
        Scope::Noise
    }

    fn required_inputs(&self) -> Vec<Category> {
        vec![Category::TimeSeries]
    }

    fn validate(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let model = NoiseModel::from_name(&ctx.settings.get_str(&keys::NOISE_MODEL)?)?;
        match model {
            NoiseModel::Gaussian => {
                ctx.settings.get_f64(&keys::NOISE_STD)?;
                ctx.settings.get_str(&keys::NOISE_MODE)?;
            }
            NoiseModel::Poisson => {
                ctx.settings.get_f64(&keys::NOISE_SCALE)?;
            }
            NoiseModel::SaltAndPepper => {
                ctx.settings.get_f64(&keys::NOISE_FRACTION)?;
            }
        }
        self.model = Some(model);
        Ok(())
    }

    fn run(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let mut series = ctx
            .store
            .read_matrix(Category::TimeSeries, ctx.wavelength_nm)?;
        let mut rng = StdRng::seed_from_u64(noise_seed(ctx.seed, ctx.wavelength_nm));

        match self.model.unwrap_or(NoiseModel::Gaussian) {
            NoiseModel::Gaussian => apply_gaussian(ctx, &mut series, &mut rng)?,
            NoiseModel::Poisson => apply_poisson(ctx, &mut series, &mut rng)?,
            NoiseModel::SaltAndPepper => apply_salt_and_pepper(ctx, &mut series, &mut rng)?,
        }

        ctx.store
            .write_matrix(Category::NoisyTimeSeries, ctx.wavelength_nm, &series)?;
        if ctx.store.has_meta(Category::TimeSeries, ctx.wavelength_nm) {
            let meta: ResultMetadata = ctx
                .store
                .read_meta(Category::TimeSeries, ctx.wavelength_nm)?;
            ctx.store
                .write_meta(Category::NoisyTimeSeries, ctx.wavelength_nm, &meta)?;
        }
        Ok(())
    }
}

fn apply_gaussian(
    ctx: &StageContext<'_>,
    series: &mut Array2<f64>,
    rng: &mut StdRng,
) -> Result<(), PipelineError> {
    let mean = ctx.settings.get_f64(&keys::NOISE_MEAN)?;
    let std = ctx.settings.get_f64(&keys::NOISE_STD)?;
    let mode = ctx.settings.get_str(&keys::NOISE_MODE)?;
    let normal =
        Normal::new(mean, std).map_err(|e| distribution_error("std", e.to_string()))?;

    debug!("gaussian noise: mean {mean}, std {std}, {mode}");
    match mode.as_str() {
        "multiplicative" => series.mapv_inplace(|v| v * normal.sample(rng)),
        _ => series.mapv_inplace(|v| v + normal.sample(rng)),
    }
    Ok(())
}

fn apply_poisson(
    ctx: &StageContext<'_>,
    series: &mut Array2<f64>,
    rng: &mut StdRng,
) -> Result<(), PipelineError> {
    let scale = ctx.settings.get_f64(&keys::NOISE_SCALE)?;
    let poisson =
        Poisson::new(scale).map_err(|e| distribution_error("scale", e.to_string()))?;

    // Zero-mean shot noise: counts around `scale`, recentred.
    series.mapv_inplace(|v| v + poisson.sample(rng) - scale);
    Ok(())
}

fn apply_salt_and_pepper(
    ctx: &StageContext<'_>,
    series: &mut Array2<f64>,
    rng: &mut StdRng,
) -> Result<(), PipelineError> {
    let fraction = ctx.settings.get_f64(&keys::NOISE_FRACTION)?;
    let mut low = f64::INFINITY;
    let mut high = f64::NEG_INFINITY;
    for &value in series.iter() {
        low = low.min(value);
        high = high.max(value);
    }

    series.mapv_inplace(|v| {
        if rng.gen_bool(fraction) {
            if rng.gen_bool(0.5) {
                high
            } else {
                low
            }
        } else {
            v
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Value;
    use crate::stages::harness::TestBench;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn series_bench(model: &str) -> TestBench {
        let mut bench = TestBench::new();
        let series = Array2::from_shape_fn((4, 128), |(e, t)| {
            (t as f64 * 0.1).sin() + e as f64
        });
        bench
            .store
            .write_matrix(Category::TimeSeries, 800, &series)
            .unwrap();
        bench
            .store
            .write_meta(
                Category::TimeSeries,
                800,
                &ResultMetadata {
                    time_step_s: 5.0e-8,
                    sample_count: 128,
                },
            )
            .unwrap();
        bench.set_str(&keys::NOISE_MODEL, model);
        bench
    }

    #[test]
    fn test_unknown_model_rejected() {
        let mut bench = series_bench("speckle");
        let err = NoiseStage::new().validate(&mut bench.ctx()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownAdapter { kind: "noise", .. }
        ));
    }

    #[test]
    fn test_gaussian_noise_is_reproducible_per_seed() {
        let run = |seed: u64| {
            let mut bench = series_bench("gaussian");
            bench.seed = seed;
            bench.set_f64(&keys::NOISE_STD, 0.2);
            let mut stage = NoiseStage::new();
            bench.run_stage(&mut stage);
            bench
                .store
                .read_matrix(Category::NoisyTimeSeries, 800)
                .unwrap()
        };

        let a = run(7);
        let b = run(7);
        let c = run(8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_additive_gaussian_perturbs_around_the_signal() {
        let mut bench = series_bench("gaussian");
        bench.set_f64(&keys::NOISE_STD, 0.1);
        let mut stage = NoiseStage::new();
        bench.run_stage(&mut stage);

        let clean = bench.store.read_matrix(Category::TimeSeries, 800).unwrap();
        let noisy = bench
            .store
            .read_matrix(Category::NoisyTimeSeries, 800)
            .unwrap();
        assert_ne!(clean, noisy);

        let mean_shift: f64 =
            (&noisy - &clean).iter().sum::<f64>() / clean.len() as f64;
        assert!(mean_shift.abs() < 0.05, "mean shift {mean_shift}");
    }

    #[test]
    fn test_degenerate_multiplicative_gaussian_is_identity() {
        let mut bench = series_bench("gaussian");
        bench.set_f64(&keys::NOISE_MEAN, 1.0);
        bench.set_f64(&keys::NOISE_STD, 0.0);
        bench
            .settings
            .set(&keys::NOISE_MODE, Value::Str("multiplicative".to_string()))
            .unwrap();
        let mut stage = NoiseStage::new();
        bench.run_stage(&mut stage);

        let clean = bench.store.read_matrix(Category::TimeSeries, 800).unwrap();
        let noisy = bench
            .store
            .read_matrix(Category::NoisyTimeSeries, 800)
            .unwrap();
        assert_relative_eq!(clean[[2, 64]], noisy[[2, 64]]);
        assert_eq!(clean, noisy);
    }

    #[test]
    fn test_salt_and_pepper_replaces_roughly_the_configured_fraction() {
        let mut bench = series_bench("salt_and_pepper");
        bench.set_f64(&keys::NOISE_FRACTION, 0.2);
        let mut stage = NoiseStage::new();
        bench.run_stage(&mut stage);

        let clean = bench.store.read_matrix(Category::TimeSeries, 800).unwrap();
        let noisy = bench
            .store
            .read_matrix(Category::NoisyTimeSeries, 800)
            .unwrap();
        let changed = clean
            .iter()
            .zip(noisy.iter())
            .filter(|(a, b)| a != b)
            .count();
        let expected = (clean.len() as f64 * 0.2) as usize;
        // Replacements that land on the original value are not observable,
        // so only bound the count loosely.
        assert!(changed > expected / 2, "only {changed} entries changed");
        assert!(changed < expected * 2, "{changed} entries changed");
    }

    #[test]
    fn test_metadata_travels_with_the_noisy_series() {
        let mut bench = series_bench("poisson");
        let mut stage = NoiseStage::new();
        bench.run_stage(&mut stage);

        let meta: ResultMetadata = bench
            .store
            .read_meta(Category::NoisyTimeSeries, 800)
            .unwrap();
        assert_eq!(meta.sample_count, 128);
    }

    #[test]
    fn test_gaussian_requires_a_std() {
        let mut bench = series_bench("gaussian");
        let err = NoiseStage::new().validate(&mut bench.ctx()).unwrap_err();
        assert!(matches!(err, PipelineError::Settings(SettingsError::MissingKey { .. })));
    }
}
