//! Detector array geometries.
//!
//! Element positions are produced in the device-local frame: the array is
//! centred on the origin, x runs along the aperture, and +z points into
//! the tissue. [`crate::device::PhotoacousticDevice`] translates them into
//! the volume frame.

use nalgebra::Vector3;

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionGeometry {
    /// Elements on a circular arc in the x-z plane, curving up and around
    /// the focal origin. `pitch_mm` is the arc length between elements.
    CurvedArray {
        element_count: usize,
        pitch_mm: f64,
        radius_mm: f64,
    },
    /// Elements on a line along x.
    LinearArray { element_count: usize, pitch_mm: f64 },
    /// Raster grid of elements in the x-y plane.
    PlanarArray {
        rows: usize,
        cols: usize,
        pitch_mm: f64,
    },
}

impl DetectionGeometry {
    pub fn element_count(&self) -> usize {
        match self {
            DetectionGeometry::CurvedArray { element_count, .. } => *element_count,
            DetectionGeometry::LinearArray { element_count, .. } => *element_count,
            DetectionGeometry::PlanarArray { rows, cols, .. } => rows * cols,
        }
    }

    /// Element centres in the device-local frame, in element order.
    pub fn local_element_positions_mm(&self) -> Vec<Vector3<f64>> {
        match self {
            DetectionGeometry::CurvedArray {
                element_count,
                pitch_mm,
                radius_mm,
            } => {
                let n = *element_count;
                let angle_step = pitch_mm / radius_mm;
                (0..n)
                    .map(|k| {
                        let theta = (k as f64 - (n as f64 - 1.0) / 2.0) * angle_step;
                        Vector3::new(
                            radius_mm * theta.sin(),
                            0.0,
                            -radius_mm * theta.cos(),
                        )
                    })
                    .collect()
            }
            DetectionGeometry::LinearArray {
                element_count,
                pitch_mm,
            } => {
                let n = *element_count;
                (0..n)
                    .map(|k| {
                        let x = (k as f64 - (n as f64 - 1.0) / 2.0) * pitch_mm;
                        Vector3::new(x, 0.0, 0.0)
                    })
                    .collect()
            }
            DetectionGeometry::PlanarArray { rows, cols, pitch_mm } => {
                let mut positions = Vec::with_capacity(rows * cols);
                for r in 0..*rows {
                    for c in 0..*cols {
                        positions.push(Vector3::new(
                            (c as f64 - (*cols as f64 - 1.0) / 2.0) * pitch_mm,
                            (r as f64 - (*rows as f64 - 1.0) / 2.0) * pitch_mm,
                            0.0,
                        ));
                    }
                }
                positions
            }
        }
    }
}
