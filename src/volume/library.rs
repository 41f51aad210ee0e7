//! Built-in molecules and tissue compositions.
//!
//! Spectra are reduced literature tables over the 650-950 nm window the
//! pipeline is normally run in; outside it the curves clamp. Absorption and
//! scattering are per millimetre.

use super::molecule::{Molecule, MolecularComposition};
use super::spectrum::Spectrum;
use super::VolumeError;
use once_cell::sync::Lazy;

fn table(points: &[(f64, f64)]) -> Spectrum {
    // Library tables are ascending by construction.
    match Spectrum::from_table(points) {
        Ok(s) => s,
        Err(_) => Spectrum::constant(0.0),
    }
}

pub static OXYHEMOGLOBIN: Lazy<Molecule> = Lazy::new(|| Molecule {
    name: "oxyhemoglobin".to_string(),
    absorption_per_mm: table(&[
        (650.0, 0.150),
        (700.0, 0.090),
        (750.0, 0.075),
        (800.0, 0.082),
        (850.0, 0.110),
        (900.0, 0.125),
        (950.0, 0.138),
    ]),
    scattering_per_mm: table(&[(650.0, 0.85), (800.0, 0.75), (950.0, 0.68)]),
    anisotropy: 0.98,
    sound_speed_m_s: 1578.0,
    density_kg_m3: 1060.0,
    attenuation_db_cm_mhz: 0.2,
    gruneisen: 0.14,
});

pub static DEOXYHEMOGLOBIN: Lazy<Molecule> = Lazy::new(|| Molecule {
    name: "deoxyhemoglobin".to_string(),
    absorption_per_mm: table(&[
        (650.0, 0.490),
        (700.0, 0.190),
        (750.0, 0.150),
        (760.0, 0.160),
        (800.0, 0.082),
        (850.0, 0.072),
        (900.0, 0.067),
        (950.0, 0.062),
    ]),
    scattering_per_mm: table(&[(650.0, 0.85), (800.0, 0.75), (950.0, 0.68)]),
    anisotropy: 0.98,
    sound_speed_m_s: 1578.0,
    density_kg_m3: 1060.0,
    attenuation_db_cm_mhz: 0.2,
    gruneisen: 0.14,
});

pub static WATER: Lazy<Molecule> = Lazy::new(|| Molecule {
    name: "water".to_string(),
    absorption_per_mm: table(&[
        (650.0, 0.00032),
        (750.0, 0.0028),
        (850.0, 0.0043),
        (950.0, 0.0450),
    ]),
    scattering_per_mm: Spectrum::constant(0.001),
    anisotropy: 0.9,
    sound_speed_m_s: 1480.0,
    density_kg_m3: 1000.0,
    attenuation_db_cm_mhz: 0.0022,
    gruneisen: 0.11,
});

pub static FAT: Lazy<Molecule> = Lazy::new(|| Molecule {
    name: "fat".to_string(),
    absorption_per_mm: table(&[
        (650.0, 0.0010),
        (750.0, 0.0011),
        (850.0, 0.0014),
        (930.0, 0.0120),
        (950.0, 0.0085),
    ]),
    scattering_per_mm: table(&[(650.0, 1.35), (800.0, 1.20), (950.0, 1.10)]),
    anisotropy: 0.92,
    sound_speed_m_s: 1440.0,
    density_kg_m3: 920.0,
    attenuation_db_cm_mhz: 0.6,
    gruneisen: 0.67,
});

pub static MELANIN: Lazy<Molecule> = Lazy::new(|| Molecule {
    name: "melanin".to_string(),
    absorption_per_mm: table(&[
        (650.0, 0.800),
        (750.0, 0.510),
        (850.0, 0.360),
        (950.0, 0.260),
    ]),
    scattering_per_mm: table(&[(650.0, 1.80), (800.0, 1.50), (950.0, 1.30)]),
    anisotropy: 0.93,
    sound_speed_m_s: 1624.0,
    density_kg_m3: 1100.0,
    attenuation_db_cm_mhz: 0.35,
    gruneisen: 0.2,
});

/// Generic soft-tissue scatterer used to pad compositions.
pub static TISSUE_SCAFFOLD: Lazy<Molecule> = Lazy::new(|| Molecule {
    name: "tissue_scaffold".to_string(),
    absorption_per_mm: Spectrum::constant(0.005),
    scattering_per_mm: table(&[(650.0, 1.40), (800.0, 1.00), (950.0, 0.80)]),
    anisotropy: 0.90,
    sound_speed_m_s: 1540.0,
    density_kg_m3: 1040.0,
    attenuation_db_cm_mhz: 0.75,
    gruneisen: 0.2,
});

/// Whole blood at the given oxygen saturation in [0, 1].
pub fn blood(oxygen_saturation: f64) -> Result<MolecularComposition, VolumeError> {
    if !(0.0..=1.0).contains(&oxygen_saturation) {
        return Err(VolumeError::InvalidComposition {
            name: "blood".to_string(),
            reason: format!("oxygen saturation {oxygen_saturation} outside [0, 1]"),
        });
    }
    MolecularComposition::new(
        "blood",
        vec![
            (OXYHEMOGLOBIN.clone(), oxygen_saturation),
            (DEOXYHEMOGLOBIN.clone(), 1.0 - oxygen_saturation),
        ],
    )
}

/// Generic background soft tissue: mostly scaffold with interstitial water
/// and a small perfused blood fraction.
pub fn soft_tissue() -> Result<MolecularComposition, VolumeError> {
    MolecularComposition::new(
        "soft_tissue",
        vec![
            (TISSUE_SCAFFOLD.clone(), 0.68),
            (WATER.clone(), 0.30),
            (OXYHEMOGLOBIN.clone(), 0.014),
            (DEOXYHEMOGLOBIN.clone(), 0.006),
        ],
    )
}

/// Melanin-bearing epidermis layer.
pub fn epidermis(melanin_fraction: f64) -> Result<MolecularComposition, VolumeError> {
    if !(0.0..=1.0).contains(&melanin_fraction) {
        return Err(VolumeError::InvalidComposition {
            name: "epidermis".to_string(),
            reason: format!("melanin fraction {melanin_fraction} outside [0, 1]"),
        });
    }
    MolecularComposition::new(
        "epidermis",
        vec![
            (MELANIN.clone(), melanin_fraction),
            (TISSUE_SCAFFOLD.clone(), 1.0 - melanin_fraction),
        ],
    )
}

/// Subcutaneous fat layer.
pub fn subcutaneous_fat() -> Result<MolecularComposition, VolumeError> {
    MolecularComposition::new(
        "subcutaneous_fat",
        vec![(FAT.clone(), 0.9), (WATER.clone(), 0.1)],
    )
}

/// Pure water, for coupling media.
pub fn coupling_water() -> Result<MolecularComposition, VolumeError> {
    MolecularComposition::new("water", vec![(WATER.clone(), 1.0)])
}
