//! End-to-end pipeline runs against the on-disk container.
//!
//! These tests drive `run_pipeline` exactly the way the CLI does and then
//! reopen the container file to check what a run left behind: which
//! categories exist, at which wavelengths, and that nothing is written
//! when validation rejects the configuration.

mod common;

use approx::assert_relative_eq;
use pasim::settings::{keys, Settings, Value};
use pasim::store::{self, GLOBAL_WAVELENGTH};
use pasim::volume::{library, StructureShape, TissueModel};
use pasim::{run_pipeline, standard_pipeline, Category, PipelineError, RunOptions, SimulationStore};
use std::fs;
use tempfile::TempDir;

const EXTENT_MM: [f64; 3] = [16.0, 16.0, 16.0];

fn enable_projection_acoustic(settings: &mut Settings) {
    settings
        .apply_group(vec![
            (
                &keys::ACOUSTIC_ADAPTER,
                Value::Str("spherical_projection".to_string()),
            ),
            (&keys::SAMPLE_COUNT, Value::Int(256)),
            (&keys::SAMPLING_RATE_MHZ, Value::Float(20.0)),
        ])
        .unwrap();
}

fn enable_gaussian_noise(settings: &mut Settings) {
    settings
        .apply_group(vec![
            (&keys::NOISE_MODEL, Value::Str("gaussian".to_string())),
            (&keys::NOISE_STD, Value::Float(1.0e-4)),
        ])
        .unwrap();
}

fn enable_reconstruction(settings: &mut Settings, algorithm: &str) {
    settings
        .apply_group(vec![
            (&keys::RECON_ALGORITHM, Value::Str(algorithm.to_string())),
            (
                &keys::RECON_INPUT,
                Value::Str("noisy_time_series".to_string()),
            ),
        ])
        .unwrap();
}

/// Settings for all five stages on the small grid.
fn full_settings(output_dir: &std::path::Path, algorithm: &str) -> Settings {
    let mut settings = common::base_settings(output_dir, EXTENT_MM, &[800]);
    common::enable_model_based_volume(&mut settings);
    common::enable_diffusion_optical(&mut settings);
    enable_projection_acoustic(&mut settings);
    enable_gaussian_noise(&mut settings);
    enable_reconstruction(&mut settings, algorithm);
    settings
}

#[test]
fn test_layered_model_maps_compositions_onto_the_grid() {
    let dir = TempDir::new().unwrap();
    let extent = [32.0, 32.0, 32.0];
    let mut settings = common::base_settings(dir.path(), extent, &[800]);
    common::enable_model_based_volume(&mut settings);

    let skin = library::epidermis(0.05).unwrap();
    let fat = library::subcutaneous_fat().unwrap();
    let background = library::soft_tissue().unwrap();
    let model = TissueModel::new("layered", background.clone())
        .with_structure(
            StructureShape::HorizontalLayer {
                z_start_mm: 0.0,
                z_end_mm: 8.0,
            },
            skin.clone(),
            1,
        )
        .with_structure(
            StructureShape::HorizontalLayer {
                z_start_mm: 8.0,
                z_end_mm: 16.0,
            },
            fat,
            2,
        );

    let device = common::probe(extent);
    let stages = standard_pipeline(&settings, model);
    let summary =
        run_pipeline(&mut settings, &device, stages, RunOptions::default()).unwrap();

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].stage, "volume_creation");

    let mut store = SimulationStore::open(&summary.container_path).unwrap();
    let mua = store
        .read_volume(Category::AbsorptionCoefficient, 800)
        .unwrap();
    assert_eq!(mua.dim(), (32, 32, 32));
    assert_relative_eq!(
        mua[[0, 0, 0]],
        skin.absorption_per_mm(800.0),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        mua[[31, 31, 31]],
        background.absorption_per_mm(800.0),
        max_relative = 1e-12
    );

    // Acoustic property grids land in the wavelength-independent slot.
    let sos = store
        .read_volume(Category::SoundSpeed, GLOBAL_WAVELENGTH)
        .unwrap();
    assert_relative_eq!(sos[[0, 0, 0]], skin.sound_speed_m_s(), max_relative = 1e-12);
    assert_relative_eq!(
        sos[[31, 31, 31]],
        background.sound_speed_m_s(),
        max_relative = 1e-12
    );
}

#[test]
fn test_wavelength_loop_reruns_optical_stage_only() {
    let dir = TempDir::new().unwrap();
    let mut settings = common::base_settings(dir.path(), EXTENT_MM, &[700, 900]);
    common::enable_model_based_volume(&mut settings);
    common::enable_diffusion_optical(&mut settings);

    let device = common::probe(EXTENT_MM);
    let stages = standard_pipeline(&settings, common::phantom(EXTENT_MM));
    let summary =
        run_pipeline(&mut settings, &device, stages, RunOptions::default()).unwrap();

    assert_eq!(summary.wavelengths_nm, vec![700, 900]);
    // Two stages at each of the two wavelengths.
    assert_eq!(summary.reports.len(), 4);

    let mut store = SimulationStore::open(&summary.container_path).unwrap();
    for &nm in &[700, 900] {
        assert!(store.contains(Category::AbsorptionCoefficient, nm));
        assert!(store.contains(Category::Fluence, nm));
        assert!(store.contains(Category::InitialPressure, nm));
    }
    // The blood sphere absorbs differently at the two wavelengths.
    let mua_700 = store
        .read_volume(Category::AbsorptionCoefficient, 700)
        .unwrap();
    let mua_900 = store
        .read_volume(Category::AbsorptionCoefficient, 900)
        .unwrap();
    assert!(mua_700[[8, 8, 8]] != mua_900[[8, 8, 8]]);

    // Acoustic properties are written once, not per wavelength.
    assert!(store.contains(Category::SoundSpeed, GLOBAL_WAVELENGTH));
    assert!(!store.contains(Category::SoundSpeed, 700));
    assert!(!store.contains(Category::SoundSpeed, 900));
}

#[test]
fn test_unknown_reconstruction_adapter_fails_before_any_stage_runs() {
    let dir = TempDir::new().unwrap();
    let mut settings = full_settings(dir.path(), "unsupported_algo");
    let device = common::probe(EXTENT_MM);
    let stages = standard_pipeline(&settings, common::phantom(EXTENT_MM));

    let err = run_pipeline(&mut settings, &device, stages, RunOptions::default()).unwrap_err();
    match err {
        PipelineError::UnknownAdapter { kind, name, .. } => {
            assert_eq!(kind, "reconstruction");
            assert_eq!(name, "unsupported_algo");
        }
        other => panic!("unexpected error: {other}"),
    }

    // Validation runs before the wavelength loop: the container exists but
    // holds nothing, and no settings snapshot was written.
    let container = dir.path().join(store::container_file_name("integration"));
    let mut reopened = SimulationStore::open(&container).unwrap();
    assert!(reopened.entries().is_empty());
    assert!(!dir
        .path()
        .join(store::snapshot_file_name("integration"))
        .exists());
}

#[test]
fn test_missing_upstream_input_names_stage_category_and_wavelength() {
    let dir = TempDir::new().unwrap();
    let mut settings = common::base_settings(dir.path(), EXTENT_MM, &[800]);
    enable_projection_acoustic(&mut settings);

    let device = common::probe(EXTENT_MM);
    let stages = standard_pipeline(&settings, common::phantom(EXTENT_MM));
    assert_eq!(stages.len(), 1, "only the acoustic scope is configured");

    let err = run_pipeline(&mut settings, &device, stages, RunOptions::default()).unwrap_err();
    match err {
        PipelineError::MissingInput {
            stage,
            category,
            wavelength_nm,
        } => {
            assert_eq!(stage, "acoustic");
            assert_eq!(category, Category::InitialPressure);
            assert_eq!(wavelength_nm, 800);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_full_pipeline_produces_every_category() {
    let dir = TempDir::new().unwrap();
    let mut settings = full_settings(dir.path(), "delay_and_sum");
    let device = common::probe(EXTENT_MM);
    let stages = standard_pipeline(&settings, common::phantom(EXTENT_MM));

    let summary =
        run_pipeline(&mut settings, &device, stages, RunOptions::default()).unwrap();
    assert_eq!(summary.reports.len(), 5);
    let order: Vec<&str> = summary.reports.iter().map(|r| r.stage).collect();
    assert_eq!(
        order,
        vec![
            "volume_creation",
            "optical",
            "acoustic",
            "noise",
            "reconstruction"
        ]
    );

    let mut store = SimulationStore::open(&summary.container_path).unwrap();
    for category in [
        Category::AbsorptionCoefficient,
        Category::ScatteringCoefficient,
        Category::Anisotropy,
        Category::Fluence,
        Category::InitialPressure,
        Category::TimeSeries,
        Category::NoisyTimeSeries,
        Category::Reconstruction,
    ] {
        assert!(store.contains(category, 800), "missing {category:?} at 800 nm");
    }
    for category in [
        Category::SoundSpeed,
        Category::Density,
        Category::AcousticAttenuation,
        Category::GruneisenParameter,
        Category::SegmentationMask,
    ] {
        assert!(
            store.contains(category, GLOBAL_WAVELENGTH),
            "missing global {category:?}"
        );
    }
    assert!(store.has_meta(Category::TimeSeries, 800));
    assert!(store.has_meta(Category::NoisyTimeSeries, 800));

    let image = store.read_volume(Category::Reconstruction, 800).unwrap();
    assert_eq!(image.dim(), (16, 16, 16));
    assert!(image.iter().any(|&v| v != 0.0));

    // The snapshot reloads into a usable settings tree.
    let snapshot = Settings::load(&summary.snapshot_path).unwrap();
    assert_eq!(snapshot.get_str(&keys::SIMULATION_NAME).unwrap(), "integration");
}

#[test]
fn test_same_seed_runs_produce_identical_containers() {
    let dir = TempDir::new().unwrap();
    let out_a = dir.path().join("a");
    let out_b = dir.path().join("b");
    let device = common::probe(EXTENT_MM);

    let mut settings_a = full_settings(&out_a, "delay_and_sum");
    let stages_a = standard_pipeline(&settings_a, common::phantom(EXTENT_MM));
    let summary_a =
        run_pipeline(&mut settings_a, &device, stages_a, RunOptions::default()).unwrap();

    let mut settings_b = full_settings(&out_b, "delay_and_sum");
    let stages_b = standard_pipeline(&settings_b, common::phantom(EXTENT_MM));
    let summary_b =
        run_pipeline(&mut settings_b, &device, stages_b, RunOptions::default()).unwrap();

    let bytes_a = fs::read(&summary_a.container_path).unwrap();
    let bytes_b = fs::read(&summary_b.container_path).unwrap();
    assert_eq!(bytes_a.len(), bytes_b.len());
    assert!(bytes_a == bytes_b, "containers differ between equal-seed runs");
}
