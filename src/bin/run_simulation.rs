//! End-to-end simulation runner.
//!
//! Runs the standard pipeline over a built-in forearm-like tissue model,
//! or over settings loaded from a JSON snapshot. External solver
//! locations are resolved through the usual path-configuration lookup.

use clap::Parser;
use pasim::device::presets;
use pasim::paths::PathConfig;
use pasim::settings::{keys, GlobalSettings, Settings, Value};
use pasim::volume::{library, StructureShape, TissueModel, VesselTree};
use pasim::{run_pipeline, standard_pipeline, RunOptions};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "run_simulation",
    about = "Run the photoacoustic simulation pipeline on a demo tissue model"
)]
struct Args {
    /// Settings snapshot (JSON) to run instead of the built-in demo
    /// configuration. The tissue model itself stays the built-in demo.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Device preset to image with
    #[arg(long, default_value = "linear_probe_128")]
    device: String,

    /// Device position in the volume frame, mm
    #[arg(long, value_delimiter = ',', default_value = "20,10,0.5")]
    position_mm: Vec<f64>,

    /// Explicit solver path configuration file
    #[arg(long)]
    paths: Option<PathBuf>,

    /// Output directory for the demo configuration
    #[arg(long, default_value = "pasim_output")]
    output: PathBuf,
}

/// Layered skin over fat with two blood vessels, one regular and one
/// grown procedurally.
fn demo_model() -> anyhow::Result<TissueModel> {
    let model = TissueModel::new("forearm_demo", library::soft_tissue()?)
        .with_structure(
            StructureShape::HorizontalLayer {
                z_start_mm: 0.0,
                z_end_mm: 1.5,
            },
            library::epidermis(0.02)?,
            1,
        )
        .with_structure(
            StructureShape::HorizontalLayer {
                z_start_mm: 1.5,
                z_end_mm: 5.0,
            },
            library::subcutaneous_fat()?,
            1,
        )
        .with_structure(
            StructureShape::Tube {
                start_mm: [20.0, 0.0, 12.0],
                end_mm: [20.0, 20.0, 12.0],
                radius_mm: 2.0,
            },
            library::blood(0.95)?,
            2,
        )
        .with_structure(
            StructureShape::VesselTree(VesselTree {
                root_mm: [8.0, 10.0, 8.0],
                direction: [1.0, 0.2, 0.4],
                radius_mm: 1.0,
                length_mm: 25.0,
                curvature: 0.15,
                bifurcation_probability: 0.05,
            }),
            library::blood(0.7)?,
            2,
        );
    Ok(model)
}

fn demo_settings(output_dir: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::new();
    GlobalSettings {
        simulation_name: "forearm_demo".to_string(),
        output_dir: output_dir.to_path_buf(),
        spacing_mm: 0.5,
        volume_extent_mm: [40.0, 20.0, 25.0],
        wavelengths_nm: vec![700, 850],
        random_seed: 1234,
        use_gpu: false,
    }
    .apply(&mut settings)?;

    settings.apply_group(vec![(
        &keys::VOLUME_ADAPTER,
        Value::Str("model_based".to_string()),
    )])?;
    settings.apply_group(vec![
        (&keys::OPTICAL_ADAPTER, Value::Str("diffusion".to_string())),
        (&keys::PULSE_ENERGY_MJ, Value::Float(20.0)),
        (&keys::PHOTON_COUNT, Value::Int(1_000_000)),
    ])?;
    settings.apply_group(vec![
        (
            &keys::ACOUSTIC_ADAPTER,
            Value::Str("spherical_projection".to_string()),
        ),
        (&keys::SAMPLE_COUNT, Value::Int(1024)),
        (&keys::SAMPLING_RATE_MHZ, Value::Float(40.0)),
    ])?;
    settings.apply_group(vec![
        (&keys::NOISE_MODEL, Value::Str("gaussian".to_string())),
        (&keys::NOISE_STD, Value::Float(1.0e-5)),
    ])?;
    settings.apply_group(vec![
        (
            &keys::RECON_ALGORITHM,
            Value::Str("delay_and_sum".to_string()),
        ),
        (
            &keys::RECON_INPUT,
            Value::Str("noisy_time_series".to_string()),
        ),
    ])?;
    Ok(settings)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.position_mm.len() != 3 {
        anyhow::bail!("--position-mm takes exactly three comma-separated values");
    }
    let position = [args.position_mm[0], args.position_mm[1], args.position_mm[2]];

    let mut settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => demo_settings(&args.output)?,
    };

    let device = presets::by_name(&args.device)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "unknown device '{}'; available presets: {:?}",
                args.device,
                presets::names()
            )
        })?
        .at(position);

    let paths = PathConfig::discover(args.paths.as_deref())?;
    let stages = standard_pipeline(&settings, demo_model()?);
    let summary = run_pipeline(&mut settings, &device, stages, RunOptions { cancel: None, paths })?;

    println!("simulation '{}' finished", summary.simulation_name);
    println!("  container: {}", summary.container_path.display());
    println!("  snapshot:  {}", summary.snapshot_path.display());
    println!("  wavelengths: {:?} nm", summary.wavelengths_nm);
    for report in &summary.reports {
        println!(
            "  {:>4} nm  {:<16} {:>8.2} s",
            report.wavelength_nm,
            report.stage,
            report.duration.as_secs_f64()
        );
    }
    Ok(())
}
