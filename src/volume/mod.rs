//! Tissue modelling: molecules, structures and compiled property volumes.
//!
//! A [`TissueModel`] is a background composition plus a list of prioritized
//! geometric structures. Compiling it rasterizes every structure once into
//! a label volume; the per-wavelength optical property grids and the
//! wavelength-independent acoustic grids are then derived from the labels
//! without re-rasterizing anything.

pub mod library;
pub mod molecule;
pub mod spectrum;
pub mod structures;

// Re-exports for easier access
pub use molecule::{Molecule, MolecularComposition, FRACTION_TOLERANCE};
pub use spectrum::Spectrum;
pub use structures::{StructureShape, VesselTree};

use crate::grid::GridGeometry;
use log::debug;
use ndarray::Array3;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("invalid composition '{name}': volume fractions sum to {sum}, expected 1")]
    FractionSum { name: String, sum: f64 },
    #[error("invalid composition '{name}': {reason}")]
    InvalidComposition { name: String, reason: String },
    #[error("invalid spectrum: {reason}")]
    InvalidSpectrum { reason: String },
    #[error("invalid structure '{name}': {reason}")]
    InvalidStructure { name: String, reason: String },
}

/// A geometric structure bound to the composition that fills it.
#[derive(Debug, Clone)]
pub struct Structure {
    pub shape: StructureShape,
    pub composition: MolecularComposition,
    /// Higher priority wins where structures overlap; equal priorities are
    /// broken in favour of the later-added structure.
    pub priority: u8,
}

/// A declarative tissue model: background plus prioritized structures.
#[derive(Debug, Clone)]
pub struct TissueModel {
    name: String,
    background: MolecularComposition,
    structures: Vec<Structure>,
}

impl TissueModel {
    pub fn new(name: &str, background: MolecularComposition) -> TissueModel {
        TissueModel {
            name: name.to_string(),
            background,
            structures: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_structure(
        &mut self,
        shape: StructureShape,
        composition: MolecularComposition,
        priority: u8,
    ) {
        self.structures.push(Structure {
            shape,
            composition,
            priority,
        });
    }

    pub fn with_structure(
        mut self,
        shape: StructureShape,
        composition: MolecularComposition,
        priority: u8,
    ) -> TissueModel {
        self.add_structure(shape, composition, priority);
        self
    }

    /// Check every structure without rasterizing anything.
    pub fn validate_structures(&self) -> Result<(), VolumeError> {
        for structure in &self.structures {
            structure.shape.validate(structure.composition.name())?;
        }
        Ok(())
    }

    /// Rasterize the model onto `grid`. Randomized structures draw from a
    /// stream derived from `seed` and their insertion index, so compiling
    /// the same model with the same seed is bit-reproducible.
    pub fn compile(&self, grid: GridGeometry, seed: u64) -> Result<CompiledTissue, VolumeError> {
        self.validate_structures()?;

        let mut labels = Array3::<u16>::zeros(grid.dims);

        // Stamp in ascending priority so higher priorities overwrite;
        // stable sort keeps insertion order within a priority level.
        let mut order: Vec<usize> = (0..self.structures.len()).collect();
        order.sort_by_key(|&i| self.structures[i].priority);

        let mut scratch = Array3::from_elem(grid.dims, false);
        for index in order {
            let structure = &self.structures[index];
            scratch.fill(false);
            structure
                .shape
                .rasterize(&grid, structure_seed(seed, index), &mut scratch);

            let label = (index + 1) as u16;
            azip_mask(&mut labels, &scratch, label);
            debug!(
                "stamped '{}' (priority {}) as label {label}",
                structure.composition.name(),
                structure.priority
            );
        }

        let mut compositions = Vec::with_capacity(self.structures.len() + 1);
        compositions.push(self.background.clone());
        compositions.extend(self.structures.iter().map(|s| s.composition.clone()));

        Ok(CompiledTissue {
            grid,
            labels,
            compositions,
        })
    }
}

fn azip_mask(labels: &mut Array3<u16>, mask: &Array3<bool>, label: u16) {
    ndarray::Zip::from(labels).and(mask).for_each(|l, &m| {
        if m {
            *l = label;
        }
    });
}

/// Decorrelated per-structure random stream.
fn structure_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

/// Per-wavelength optical property grids, per millimetre.
pub struct OpticalVolumes {
    pub absorption: Array3<f64>,
    pub scattering: Array3<f64>,
    pub anisotropy: Array3<f64>,
}

/// Wavelength-independent acoustic property grids.
pub struct AcousticVolumes {
    pub sound_speed: Array3<f64>,
    pub density: Array3<f64>,
    pub attenuation: Array3<f64>,
    pub gruneisen: Array3<f64>,
}

/// A rasterized tissue model: a label per voxel plus the composition table.
pub struct CompiledTissue {
    grid: GridGeometry,
    labels: Array3<u16>,
    compositions: Vec<MolecularComposition>,
}

impl CompiledTissue {
    pub fn grid(&self) -> GridGeometry {
        self.grid
    }

    pub fn labels(&self) -> &Array3<u16> {
        &self.labels
    }

    pub fn composition_at(&self, index: [usize; 3]) -> &MolecularComposition {
        &self.compositions[self.labels[index] as usize]
    }

    /// Derive the optical grids at one wavelength. Properties are evaluated
    /// once per composition, then broadcast through the label volume.
    pub fn optical_volumes(&self, wavelength_nm: u32) -> OpticalVolumes {
        let nm = wavelength_nm as f64;
        let mua: Vec<f64> = self
            .compositions
            .iter()
            .map(|c| c.absorption_per_mm(nm))
            .collect();
        let mus: Vec<f64> = self
            .compositions
            .iter()
            .map(|c| c.scattering_per_mm(nm))
            .collect();
        let g: Vec<f64> = self.compositions.iter().map(|c| c.anisotropy(nm)).collect();

        OpticalVolumes {
            absorption: self.labels.mapv(|l| mua[l as usize]),
            scattering: self.labels.mapv(|l| mus[l as usize]),
            anisotropy: self.labels.mapv(|l| g[l as usize]),
        }
    }

    /// Derive the acoustic grids. These do not depend on wavelength and are
    /// stored once per run.
    pub fn acoustic_volumes(&self) -> AcousticVolumes {
        let sos: Vec<f64> = self
            .compositions
            .iter()
            .map(|c| c.sound_speed_m_s())
            .collect();
        let rho: Vec<f64> = self
            .compositions
            .iter()
            .map(|c| c.density_kg_m3())
            .collect();
        let alpha: Vec<f64> = self
            .compositions
            .iter()
            .map(|c| c.attenuation_db_cm_mhz())
            .collect();
        let gamma: Vec<f64> = self.compositions.iter().map(|c| c.gruneisen()).collect();

        AcousticVolumes {
            sound_speed: self.labels.mapv(|l| sos[l as usize]),
            density: self.labels.mapv(|l| rho[l as usize]),
            attenuation: self.labels.mapv(|l| alpha[l as usize]),
            gruneisen: self.labels.mapv(|l| gamma[l as usize]),
        }
    }

    /// Label volume as floats, for storage alongside the property grids.
    pub fn segmentation(&self) -> Array3<f64> {
        self.labels.mapv(|l| l as f64)
    }
}
