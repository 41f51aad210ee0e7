//! Photoacoustic device descriptions.
//!
//! A device bundles a detector array with an illumination geometry and a
//! placement in the volume frame. Placement is validated against the grid
//! before a pipeline run: every detector element must lie inside the
//! simulated volume.

pub mod detection;
pub mod illumination;
pub mod presets;

// Re-exports for easier access
pub use detection::DetectionGeometry;
pub use illumination::IlluminationGeometry;

use crate::grid::GridGeometry;
use nalgebra::Vector3;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceError {
    /// A detector element outside the simulation volume. Carries the first
    /// offending element so the placement error is actionable.
    #[error(
        "detector element {index} of '{device}' at ({x:.2}, {y:.2}, {z:.2}) mm \
         lies outside the simulation volume of {extent:?} mm"
    )]
    GeometryOutOfBounds {
        device: String,
        index: usize,
        x: f64,
        y: f64,
        z: f64,
        extent: [f64; 3],
    },
}

/// Rectangular field of view around the device position, device-local mm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub min_mm: [f64; 3],
    pub max_mm: [f64; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoacousticDevice {
    pub name: String,
    /// Device origin in the volume frame, mm.
    pub position_mm: [f64; 3],
    pub detection: DetectionGeometry,
    pub illumination: IlluminationGeometry,
    pub field_of_view: FieldOfView,
}

impl PhotoacousticDevice {
    /// Move the device origin. Consumes and returns the device so presets
    /// chain naturally.
    pub fn at(mut self, position_mm: [f64; 3]) -> PhotoacousticDevice {
        self.position_mm = position_mm;
        self
    }

    pub fn element_count(&self) -> usize {
        self.detection.element_count()
    }

    /// Detector element centres in the volume frame, in element order.
    pub fn element_positions_mm(&self) -> Vec<Vector3<f64>> {
        let origin = Vector3::from(self.position_mm);
        self.detection
            .local_element_positions_mm()
            .into_iter()
            .map(|local| origin + local)
            .collect()
    }

    /// Beam axis intercept with the illuminated surface (z = 0), volume
    /// frame.
    pub fn illumination_origin_mm(&self) -> [f64; 2] {
        [self.position_mm[0], self.position_mm[1]]
    }

    /// Verify that every detector element lies inside the grid.
    pub fn check_within(&self, grid: &GridGeometry) -> Result<(), DeviceError> {
        for (index, position) in self.element_positions_mm().into_iter().enumerate() {
            if !grid.contains(position) {
                return Err(DeviceError::GeometryOutOfBounds {
                    device: self.name.clone(),
                    index,
                    x: position.x,
                    y: position.y,
                    z: position.z,
                    extent: grid.extent_mm(),
                });
            }
        }
        Ok(())
    }
}
