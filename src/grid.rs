//! Simulation grid geometry.
//!
//! Every stage of the pipeline works on the same regular voxel grid: a
//! volume extent in millimetres divided into cubic voxels of uniform
//! spacing. Structure membership, device masks and reconstruction output
//! all address voxels through this module so that the axis ordering
//! (x, y, z) stays consistent across the run.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Regular voxel grid covering the simulation volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Voxel counts along (x, y, z).
    pub dims: [usize; 3],
    /// Isotropic voxel spacing in millimetres.
    pub spacing_mm: f64,
}

impl GridGeometry {
    /// Build a grid from a physical extent, rounding each axis to the
    /// nearest whole voxel count (minimum 1).
    pub fn from_extent(extent_mm: [f64; 3], spacing_mm: f64) -> Self {
        let dims = [
            ((extent_mm[0] / spacing_mm).round() as usize).max(1),
            ((extent_mm[1] / spacing_mm).round() as usize).max(1),
            ((extent_mm[2] / spacing_mm).round() as usize).max(1),
        ];
        Self { dims, spacing_mm }
    }

    /// Total number of voxels.
    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Physical extent along each axis in millimetres.
    pub fn extent_mm(&self) -> [f64; 3] {
        [
            self.dims[0] as f64 * self.spacing_mm,
            self.dims[1] as f64 * self.spacing_mm,
            self.dims[2] as f64 * self.spacing_mm,
        ]
    }

    /// Centre of voxel (i, j, k) in millimetres.
    ///
    /// Voxel (0, 0, 0) spans [0, spacing) on every axis, so its centre
    /// sits at spacing/2.
    pub fn voxel_centre_mm(&self, i: usize, j: usize, k: usize) -> Vector3<f64> {
        Vector3::new(
            (i as f64 + 0.5) * self.spacing_mm,
            (j as f64 + 0.5) * self.spacing_mm,
            (k as f64 + 0.5) * self.spacing_mm,
        )
    }

    /// Voxel index containing a physical position, or `None` when the
    /// position lies outside the grid.
    pub fn voxel_at(&self, position_mm: Vector3<f64>) -> Option<[usize; 3]> {
        if !self.contains(position_mm) {
            return None;
        }
        let clamp = |v: f64, n: usize| ((v / self.spacing_mm) as usize).min(n - 1);
        Some([
            clamp(position_mm.x, self.dims[0]),
            clamp(position_mm.y, self.dims[1]),
            clamp(position_mm.z, self.dims[2]),
        ])
    }

    /// Whether a physical position lies inside the volume.
    pub fn contains(&self, position_mm: Vector3<f64>) -> bool {
        let extent = self.extent_mm();
        (0.0..extent[0]).contains(&position_mm.x)
            && (0.0..extent[1]).contains(&position_mm.y)
            && (0.0..extent[2]).contains(&position_mm.z)
    }
}
