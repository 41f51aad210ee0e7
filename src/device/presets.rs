//! Ready-made device descriptions.
//!
//! Presets come positioned at the origin; call
//! [`PhotoacousticDevice::at`] to place them over the volume.

use super::detection::DetectionGeometry;
use super::illumination::IlluminationGeometry;
use super::{FieldOfView, PhotoacousticDevice};

/// 256-element curved tomography array, 40 mm radius, slit illumination.
pub fn curved_array_256() -> PhotoacousticDevice {
    PhotoacousticDevice {
        name: "curved_array_256".to_string(),
        position_mm: [0.0; 3],
        detection: DetectionGeometry::CurvedArray {
            element_count: 256,
            pitch_mm: 0.5,
            radius_mm: 40.0,
        },
        illumination: IlluminationGeometry::Slit {
            length_mm: 30.0,
            width_mm: 1.0,
        },
        field_of_view: FieldOfView {
            min_mm: [-20.0, -20.0, 0.0],
            max_mm: [20.0, 20.0, 20.0],
        },
    }
}

/// 128-element handheld linear probe with Gaussian side illumination.
pub fn linear_probe_128() -> PhotoacousticDevice {
    PhotoacousticDevice {
        name: "linear_probe_128".to_string(),
        position_mm: [0.0; 3],
        detection: DetectionGeometry::LinearArray {
            element_count: 128,
            pitch_mm: 0.3,
        },
        illumination: IlluminationGeometry::GaussianBeam { waist_mm: 4.0 },
        field_of_view: FieldOfView {
            min_mm: [-19.2, -2.0, 0.0],
            max_mm: [19.2, 2.0, 25.0],
        },
    }
}

/// 8x8 raster-scanning planar array with disk illumination.
pub fn planar_raster_64() -> PhotoacousticDevice {
    PhotoacousticDevice {
        name: "planar_raster_64".to_string(),
        position_mm: [0.0; 3],
        detection: DetectionGeometry::PlanarArray {
            rows: 8,
            cols: 8,
            pitch_mm: 2.0,
        },
        illumination: IlluminationGeometry::Disk { radius_mm: 8.0 },
        field_of_view: FieldOfView {
            min_mm: [-8.0, -8.0, 0.0],
            max_mm: [8.0, 8.0, 30.0],
        },
    }
}

pub fn names() -> &'static [&'static str] {
    &["curved_array_256", "linear_probe_128", "planar_raster_64"]
}

pub fn by_name(name: &str) -> Option<PhotoacousticDevice> {
    match name {
        "curved_array_256" => Some(curved_array_256()),
        "linear_probe_128" => Some(linear_probe_128()),
        "planar_raster_64" => Some(planar_raster_64()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_named_preset_resolves() {
        for name in names() {
            let device = by_name(name).unwrap();
            assert_eq!(&device.name, name);
            assert!(device.element_count() > 0);
        }
        assert!(by_name("imaginary_probe").is_none());
    }

    #[test]
    fn test_preset_element_counts() {
        assert_eq!(curved_array_256().element_count(), 256);
        assert_eq!(linear_probe_128().element_count(), 128);
        assert_eq!(planar_raster_64().element_count(), 64);
    }
}
