//! Illumination geometries.
//!
//! The optical stage models illumination as a weight pattern on the
//! illuminated surface, centred on the beam axis. Weights are relative;
//! the stage normalizes the pattern against the configured pulse energy.

#[derive(Debug, Clone, PartialEq)]
pub enum IlluminationGeometry {
    /// Idealized thin beam entering at the axis.
    Pencil,
    /// Uniform circular spot.
    Disk { radius_mm: f64 },
    /// Rectangular slit, long axis along x.
    Slit { length_mm: f64, width_mm: f64 },
    /// Gaussian spot with the given 1/e^2 beam waist.
    GaussianBeam { waist_mm: f64 },
}

impl IlluminationGeometry {
    /// Relative weight at a lateral offset from the beam axis. `spacing_mm`
    /// gives the pencil beam a one-voxel footprint so it never vanishes on
    /// a discrete grid.
    pub fn surface_weight(&self, dx_mm: f64, dy_mm: f64, spacing_mm: f64) -> f64 {
        match self {
            IlluminationGeometry::Pencil => {
                let half = spacing_mm / 2.0;
                if dx_mm.abs() <= half && dy_mm.abs() <= half {
                    1.0
                } else {
                    0.0
                }
            }
            IlluminationGeometry::Disk { radius_mm } => {
                if dx_mm * dx_mm + dy_mm * dy_mm <= radius_mm * radius_mm {
                    1.0
                } else {
                    0.0
                }
            }
            IlluminationGeometry::Slit { length_mm, width_mm } => {
                if dx_mm.abs() <= length_mm / 2.0 && dy_mm.abs() <= width_mm / 2.0 {
                    1.0
                } else {
                    0.0
                }
            }
            IlluminationGeometry::GaussianBeam { waist_mm } => {
                let r_sq = dx_mm * dx_mm + dy_mm * dy_mm;
                (-2.0 * r_sq / (waist_mm * waist_mm)).exp()
            }
        }
    }
}
