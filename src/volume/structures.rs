//! Geometric tissue structures and their voxel rasterization.
//!
//! Shapes are tested against voxel centres. Coordinates are millimetres in
//! the volume frame, where x and y span the lateral extent and z grows
//! with depth from the illuminated surface.

use crate::grid::GridGeometry;
use crate::volume::VolumeError;
use nalgebra::Vector3;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub enum StructureShape {
    /// Slab covering the full lateral extent between two depths.
    HorizontalLayer { z_start_mm: f64, z_end_mm: f64 },
    /// Axis-aligned box given by its low corner and edge lengths.
    Cuboid {
        corner_mm: [f64; 3],
        extent_mm: [f64; 3],
    },
    Sphere {
        centre_mm: [f64; 3],
        radius_mm: f64,
    },
    /// Cylinder with hemispherical caps between two points.
    Tube {
        start_mm: [f64; 3],
        end_mm: [f64; 3],
        radius_mm: f64,
    },
    /// Random-walk vessel grown from a root. The walk is driven entirely
    /// by the seed handed to [`StructureShape::rasterize`], so equal seeds
    /// grow identical trees.
    VesselTree(VesselTree),
}

#[derive(Debug, Clone)]
pub struct VesselTree {
    pub root_mm: [f64; 3],
    /// Initial growth direction; normalized before use.
    pub direction: [f64; 3],
    pub radius_mm: f64,
    /// Path length of the trunk walk.
    pub length_mm: f64,
    /// Direction jitter per step; 0 grows a straight vessel.
    pub curvature: f64,
    /// Per-step chance of spawning a branch at 0.7x radius.
    pub bifurcation_probability: f64,
}

impl StructureShape {
    pub(crate) fn validate(&self, label: &str) -> Result<(), VolumeError> {
        let fail = |reason: String| {
            Err(VolumeError::InvalidStructure {
                name: label.to_string(),
                reason,
            })
        };
        match self {
            StructureShape::HorizontalLayer { z_start_mm, z_end_mm } => {
                if z_end_mm <= z_start_mm {
                    return fail(format!(
                        "layer end {z_end_mm} mm must lie below start {z_start_mm} mm"
                    ));
                }
                Ok(())
            }
            StructureShape::Cuboid { extent_mm, .. } => {
                if extent_mm.iter().any(|e| *e <= 0.0) {
                    return fail(format!("cuboid extent {extent_mm:?} must be positive"));
                }
                Ok(())
            }
            StructureShape::Sphere { radius_mm, .. } => {
                if *radius_mm <= 0.0 {
                    return fail(format!("sphere radius {radius_mm} mm must be positive"));
                }
                Ok(())
            }
            StructureShape::Tube {
                start_mm,
                end_mm,
                radius_mm,
            } => {
                if *radius_mm <= 0.0 {
                    return fail(format!("tube radius {radius_mm} mm must be positive"));
                }
                if start_mm == end_mm {
                    return fail("tube endpoints coincide".to_string());
                }
                Ok(())
            }
            StructureShape::VesselTree(tree) => {
                if tree.radius_mm <= 0.0 {
                    return fail(format!("vessel radius {} mm must be positive", tree.radius_mm));
                }
                if tree.length_mm <= 0.0 {
                    return fail(format!("vessel length {} mm must be positive", tree.length_mm));
                }
                if !(0.0..=1.0).contains(&tree.bifurcation_probability) {
                    return fail(format!(
                        "bifurcation probability {} outside [0, 1]",
                        tree.bifurcation_probability
                    ));
                }
                if Vector3::from(tree.direction).norm() == 0.0 {
                    return fail("vessel direction is the zero vector".to_string());
                }
                Ok(())
            }
        }
    }

    /// Mark every voxel whose centre the shape covers. Voxels outside the
    /// grid are silently clipped; a shape may lie partly or wholly outside.
    pub(crate) fn rasterize(&self, grid: &GridGeometry, seed: u64, mask: &mut Array3<bool>) {
        match self {
            StructureShape::HorizontalLayer { z_start_mm, z_end_mm } => {
                let [nx, ny, nz] = grid.dims;
                for k in 0..nz {
                    let z = (k as f64 + 0.5) * grid.spacing_mm;
                    if z < *z_start_mm || z >= *z_end_mm {
                        continue;
                    }
                    for i in 0..nx {
                        for j in 0..ny {
                            mask[[i, j, k]] = true;
                        }
                    }
                }
            }
            StructureShape::Cuboid { corner_mm, extent_mm } => {
                let lo = *corner_mm;
                let hi = [
                    corner_mm[0] + extent_mm[0],
                    corner_mm[1] + extent_mm[1],
                    corner_mm[2] + extent_mm[2],
                ];
                for_each_voxel_in_box(grid, lo, hi, |centre, index| {
                    let inside = (0..3).all(|a| centre[a] >= lo[a] && centre[a] < hi[a]);
                    if inside {
                        mask[index] = true;
                    }
                });
            }
            StructureShape::Sphere { centre_mm, radius_mm } => {
                stamp_ball(grid, Vector3::from(*centre_mm), *radius_mm, mask);
            }
            StructureShape::Tube {
                start_mm,
                end_mm,
                radius_mm,
            } => {
                let start = Vector3::from(*start_mm);
                let end = Vector3::from(*end_mm);
                let r = *radius_mm;
                let lo = [
                    start.x.min(end.x) - r,
                    start.y.min(end.y) - r,
                    start.z.min(end.z) - r,
                ];
                let hi = [
                    start.x.max(end.x) + r,
                    start.y.max(end.y) + r,
                    start.z.max(end.z) + r,
                ];
                let axis = end - start;
                let axis_len_sq = axis.norm_squared();
                for_each_voxel_in_box(grid, lo, hi, |centre, index| {
                    let t = ((centre - start).dot(&axis) / axis_len_sq).clamp(0.0, 1.0);
                    let nearest = start + axis * t;
                    if (centre - nearest).norm_squared() <= r * r {
                        mask[index] = true;
                    }
                });
            }
            StructureShape::VesselTree(tree) => rasterize_vessel(tree, grid, seed, mask),
        }
    }
}

/// Visit every voxel whose centre may fall inside the axis-aligned box,
/// clipped to the grid.
fn for_each_voxel_in_box(
    grid: &GridGeometry,
    lo_mm: [f64; 3],
    hi_mm: [f64; 3],
    mut visit: impl FnMut(Vector3<f64>, [usize; 3]),
) {
    let spacing = grid.spacing_mm;
    let clamp_lo = |v: f64| ((v / spacing).floor().max(0.0)) as usize;
    let clamp_hi = |v: f64, n: usize| (((v / spacing).ceil()).max(0.0) as usize).min(n);
    let i0 = clamp_lo(lo_mm[0]);
    let i1 = clamp_hi(hi_mm[0], grid.dims[0]);
    let j0 = clamp_lo(lo_mm[1]);
    let j1 = clamp_hi(hi_mm[1], grid.dims[1]);
    let k0 = clamp_lo(lo_mm[2]);
    let k1 = clamp_hi(hi_mm[2], grid.dims[2]);
    for i in i0..i1 {
        for j in j0..j1 {
            for k in k0..k1 {
                visit(grid.voxel_centre_mm(i, j, k), [i, j, k]);
            }
        }
    }
}

fn stamp_ball(grid: &GridGeometry, centre: Vector3<f64>, radius: f64, mask: &mut Array3<bool>) {
    let lo = [centre.x - radius, centre.y - radius, centre.z - radius];
    let hi = [centre.x + radius, centre.y + radius, centre.z + radius];
    let r_sq = radius * radius;
    for_each_voxel_in_box(grid, lo, hi, |voxel_centre, index| {
        if (voxel_centre - centre).norm_squared() <= r_sq {
            mask[index] = true;
        }
    });
}

fn random_direction(rng: &mut StdRng) -> Vector3<f64> {
    // Rejection-sample the unit ball, then normalize.
    loop {
        let v = Vector3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let norm = v.norm();
        if norm > 1e-3 && norm <= 1.0 {
            return v / norm;
        }
    }
}

fn rasterize_vessel(tree: &VesselTree, grid: &GridGeometry, seed: u64, mask: &mut Array3<bool>) {
    let mut rng = StdRng::seed_from_u64(seed);
    // Half-voxel steps keep consecutive balls overlapping.
    let step = grid.spacing_mm * 0.5;
    let min_radius = grid.spacing_mm * 0.5;

    let mut branches = vec![(
        Vector3::from(tree.root_mm),
        Vector3::from(tree.direction).normalize(),
        tree.radius_mm,
        tree.length_mm,
    )];
    while let Some((mut position, mut direction, radius, length)) = branches.pop() {
        let mut walked = 0.0;
        while walked < length {
            stamp_ball(grid, position, radius, mask);

            let jitter = random_direction(&mut rng) * tree.curvature;
            let bent = direction + jitter;
            if bent.norm() > 1e-9 {
                direction = bent.normalize();
            }
            position += direction * step;
            walked += step;

            let child_radius = radius * 0.7;
            if child_radius >= min_radius
                && rng.gen_bool(tree.bifurcation_probability)
            {
                let tilt = random_direction(&mut rng);
                let side = (direction + tilt * 0.8).normalize();
                branches.push((position, side, child_radius, (length - walked) * 0.7));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridGeometry {
        GridGeometry {
            dims: [16, 16, 16],
            spacing_mm: 1.0,
        }
    }

    fn count(mask: &Array3<bool>) -> usize {
        mask.iter().filter(|v| **v).count()
    }

    #[test]
    fn test_layer_covers_full_lateral_extent() {
        let grid = grid();
        let mut mask = Array3::from_elem(grid.dims, false);
        StructureShape::HorizontalLayer {
            z_start_mm: 2.0,
            z_end_mm: 5.0,
        }
        .rasterize(&grid, 0, &mut mask);

        // Depth slices k = 2, 3, 4 have centres 2.5, 3.5, 4.5.
        assert_eq!(count(&mask), 16 * 16 * 3);
        assert!(mask[[0, 0, 2]]);
        assert!(mask[[15, 15, 4]]);
        assert!(!mask[[0, 0, 5]]);
    }

    #[test]
    fn test_sphere_voxelization() {
        let grid = grid();
        let mut mask = Array3::from_elem(grid.dims, false);
        StructureShape::Sphere {
            centre_mm: [8.0, 8.0, 8.0],
            radius_mm: 3.0,
        }
        .rasterize(&grid, 0, &mut mask);

        assert!(mask[[8, 8, 8]] || mask[[7, 7, 7]]);
        assert!(!mask[[0, 0, 0]]);
        // Voxel count approximates the sphere volume 4/3 pi r^3 ~ 113.
        let n = count(&mask);
        assert!((60..180).contains(&n), "got {n} voxels");
    }

    #[test]
    fn test_shape_outside_grid_is_clipped() {
        let grid = grid();
        let mut mask = Array3::from_elem(grid.dims, false);
        StructureShape::Sphere {
            centre_mm: [100.0, 100.0, 100.0],
            radius_mm: 3.0,
        }
        .rasterize(&grid, 0, &mut mask);
        assert_eq!(count(&mask), 0);

        // Partially outside: only the inside part is stamped.
        StructureShape::Sphere {
            centre_mm: [0.0, 8.0, 8.0],
            radius_mm: 3.0,
        }
        .rasterize(&grid, 0, &mut mask);
        let n = count(&mask);
        assert!(n > 0 && n < 113, "got {n} voxels");
    }

    #[test]
    fn test_tube_connects_endpoints() {
        let grid = grid();
        let mut mask = Array3::from_elem(grid.dims, false);
        StructureShape::Tube {
            start_mm: [2.5, 8.5, 8.5],
            end_mm: [13.5, 8.5, 8.5],
            radius_mm: 1.0,
        }
        .rasterize(&grid, 0, &mut mask);

        assert!(mask[[2, 8, 8]]);
        assert!(mask[[8, 8, 8]]);
        assert!(mask[[13, 8, 8]]);
        assert!(!mask[[8, 2, 8]]);
    }

    #[test]
    fn test_vessel_walk_is_seed_deterministic() {
        let grid = grid();
        let shape = StructureShape::VesselTree(VesselTree {
            root_mm: [8.0, 8.0, 1.0],
            direction: [0.0, 0.0, 1.0],
            radius_mm: 1.0,
            length_mm: 10.0,
            curvature: 0.2,
            bifurcation_probability: 0.1,
        });

        let mut a = Array3::from_elem(grid.dims, false);
        let mut b = Array3::from_elem(grid.dims, false);
        let mut c = Array3::from_elem(grid.dims, false);
        shape.rasterize(&grid, 7, &mut a);
        shape.rasterize(&grid, 7, &mut b);
        shape.rasterize(&grid, 8, &mut c);

        assert_eq!(a, b);
        assert!(count(&a) > 0);
        assert_ne!(a, c, "different seeds should bend the vessel differently");
    }

    #[test]
    fn test_validation_catches_degenerate_shapes() {
        assert!(StructureShape::HorizontalLayer {
            z_start_mm: 5.0,
            z_end_mm: 2.0
        }
        .validate("layer")
        .is_err());
        assert!(StructureShape::Sphere {
            centre_mm: [0.0; 3],
            radius_mm: 0.0
        }
        .validate("sphere")
        .is_err());
        assert!(StructureShape::VesselTree(VesselTree {
            root_mm: [0.0; 3],
            direction: [0.0; 3],
            radius_mm: 1.0,
            length_mm: 5.0,
            curvature: 0.1,
            bifurcation_probability: 0.5,
        })
        .validate("vessel")
        .is_err());
    }
}
