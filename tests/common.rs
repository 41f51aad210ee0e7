//! Shared fixtures for the integration tests.
//!
//! Everything runs on small grids at 1 mm spacing so a full pipeline
//! pass stays in the sub-second range.

use pasim::device::{presets, PhotoacousticDevice};
use pasim::settings::{keys, GlobalSettings, Settings, Value};
use pasim::volume::{library, StructureShape, TissueModel};
use std::path::Path;

/// Global scope for a single-wavelength run with a fixed seed.
pub fn base_settings(output_dir: &Path, extent_mm: [f64; 3], wavelengths_nm: &[u32]) -> Settings {
    let mut settings = Settings::new();
    GlobalSettings {
        simulation_name: "integration".to_string(),
        output_dir: output_dir.to_path_buf(),
        spacing_mm: 1.0,
        volume_extent_mm: extent_mm,
        wavelengths_nm: wavelengths_nm.to_vec(),
        random_seed: 99,
        use_gpu: false,
    }
    .apply(&mut settings)
    .unwrap();
    settings
}

/// 8x8 planar raster centred on the volume surface.
pub fn probe(extent_mm: [f64; 3]) -> PhotoacousticDevice {
    presets::planar_raster_64().at([extent_mm[0] / 2.0, extent_mm[1] / 2.0, 0.5])
}

/// Soft tissue with one blood sphere at mid depth.
pub fn phantom(extent_mm: [f64; 3]) -> TissueModel {
    TissueModel::new("integration_phantom", library::soft_tissue().unwrap()).with_structure(
        StructureShape::Sphere {
            centre_mm: [extent_mm[0] / 2.0, extent_mm[1] / 2.0, extent_mm[2] / 2.0],
            radius_mm: 3.0,
        },
        library::blood(0.8).unwrap(),
        1,
    )
}

pub fn enable_model_based_volume(settings: &mut Settings) {
    settings
        .set(&keys::VOLUME_ADAPTER, Value::Str("model_based".to_string()))
        .unwrap();
}

pub fn enable_diffusion_optical(settings: &mut Settings) {
    settings
        .apply_group(vec![
            (&keys::OPTICAL_ADAPTER, Value::Str("diffusion".to_string())),
            (&keys::PULSE_ENERGY_MJ, Value::Float(20.0)),
        ])
        .unwrap();
}
