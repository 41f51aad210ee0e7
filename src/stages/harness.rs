//! Shared fixture for stage unit tests: a 16 mm cube with a small linear
//! probe on top, an empty container and a settings tree primed with the
//! global keys.

use crate::device::{DetectionGeometry, FieldOfView, IlluminationGeometry, PhotoacousticDevice};
use crate::grid::GridGeometry;
use crate::paths::PathConfig;
use crate::pipeline::{SimulationStage, StageContext};
use crate::settings::{keys, GlobalSettings, KeyDef, Settings, Value};
use crate::stages::VolumeCreationStage;
use crate::store::SimulationStore;
use crate::volume::TissueModel;
use tempfile::TempDir;

pub struct TestBench {
    pub settings: Settings,
    pub store: SimulationStore,
    pub device: PhotoacousticDevice,
    pub grid: GridGeometry,
    pub paths: PathConfig,
    pub wavelength_nm: u32,
    pub seed: u64,
    dir: TempDir,
}

impl TestBench {
    pub fn new() -> TestBench {
        let dir = TempDir::new().unwrap();
        let grid = GridGeometry {
            dims: [16, 16, 16],
            spacing_mm: 1.0,
        };

        let mut settings = Settings::new();
        GlobalSettings {
            simulation_name: "bench".to_string(),
            output_dir: dir.path().to_path_buf(),
            spacing_mm: grid.spacing_mm,
            volume_extent_mm: [16.0, 16.0, 16.0],
            wavelengths_nm: vec![800],
            random_seed: 7,
            use_gpu: false,
        }
        .apply(&mut settings)
        .unwrap();

        let store = SimulationStore::create(&dir.path().join("bench.pasim")).unwrap();
        let device = PhotoacousticDevice {
            name: "bench_probe".to_string(),
            position_mm: [8.0, 8.0, 0.5],
            detection: DetectionGeometry::LinearArray {
                element_count: 4,
                pitch_mm: 1.0,
            },
            illumination: IlluminationGeometry::Disk { radius_mm: 2.0 },
            field_of_view: FieldOfView {
                min_mm: [-8.0, -8.0, 0.0],
                max_mm: [8.0, 8.0, 16.0],
            },
        };

        TestBench {
            settings,
            store,
            device,
            grid,
            paths: PathConfig::empty(),
            wavelength_nm: 800,
            seed: 7,
            dir,
        }
    }

    pub fn ctx(&mut self) -> StageContext<'_> {
        StageContext {
            settings: &self.settings,
            store: &mut self.store,
            device: &self.device,
            grid: self.grid,
            paths: &self.paths,
            output_dir: self.dir.path(),
            wavelength_nm: self.wavelength_nm,
            seed: self.seed,
        }
    }

    pub fn set_str(&mut self, key: &KeyDef, value: &str) {
        self.settings
            .set(key, Value::Str(value.to_string()))
            .unwrap();
    }

    pub fn set_f64(&mut self, key: &KeyDef, value: f64) {
        self.settings.set(key, Value::Float(value)).unwrap();
    }

    pub fn set_i64(&mut self, key: &KeyDef, value: i64) {
        self.settings.set(key, Value::Int(value)).unwrap();
    }

    pub fn set_bool(&mut self, key: &KeyDef, value: bool) {
        self.settings.set(key, Value::Bool(value)).unwrap();
    }

    /// Validate and run a stage at the bench wavelength.
    pub fn run_stage(&mut self, stage: &mut dyn SimulationStage) {
        stage.validate(&mut self.ctx()).unwrap();
        stage.run(&mut self.ctx()).unwrap();
    }

    /// Populate the container with the property grids of `model`.
    pub fn compile_volumes(&mut self, model: TissueModel) {
        self.set_str(&keys::VOLUME_ADAPTER, "model_based");
        let mut stage = VolumeCreationStage::new(model);
        self.run_stage(&mut stage);
    }
}
