//! Molecules and volume-fraction mixtures.

use super::spectrum::Spectrum;
use super::VolumeError;

/// Tolerance on the volume fraction sum of a composition.
pub const FRACTION_TOLERANCE: f64 = 1e-6;

/// A single absorber/scatterer with its optical spectra and bulk acoustic
/// properties. Optical coefficients are per millimetre; acoustic
/// attenuation is the dB/cm/MHz^y coefficient used by the acoustic stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    pub name: String,
    pub absorption_per_mm: Spectrum,
    pub scattering_per_mm: Spectrum,
    pub anisotropy: f64,
    pub sound_speed_m_s: f64,
    pub density_kg_m3: f64,
    pub attenuation_db_cm_mhz: f64,
    pub gruneisen: f64,
}

/// A named mixture of molecules with volume fractions summing to one.
///
/// Optical and acoustic bulk properties are volume-fraction weighted, with
/// one exception: anisotropy is weighted by each component's contribution
/// to scattering, because a strongly scattering component dominates the
/// angular distribution of the mixture.
#[derive(Debug, Clone, PartialEq)]
pub struct MolecularComposition {
    name: String,
    components: Vec<(Molecule, f64)>,
}

impl MolecularComposition {
    pub fn new(
        name: &str,
        components: Vec<(Molecule, f64)>,
    ) -> Result<MolecularComposition, VolumeError> {
        if components.is_empty() {
            return Err(VolumeError::InvalidComposition {
                name: name.to_string(),
                reason: "composition has no components".to_string(),
            });
        }
        for (molecule, fraction) in &components {
            if !fraction.is_finite() || !(0.0..=1.0).contains(fraction) {
                return Err(VolumeError::InvalidComposition {
                    name: name.to_string(),
                    reason: format!(
                        "volume fraction {fraction} of '{}' is outside [0, 1]",
                        molecule.name
                    ),
                });
            }
        }
        let sum: f64 = components.iter().map(|(_, f)| f).sum();
        if (sum - 1.0).abs() > FRACTION_TOLERANCE {
            return Err(VolumeError::FractionSum {
                name: name.to_string(),
                sum,
            });
        }
        Ok(MolecularComposition {
            name: name.to_string(),
            components,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absorption coefficient of the mixture at `wavelength_nm`, per mm.
    pub fn absorption_per_mm(&self, wavelength_nm: f64) -> f64 {
        self.components
            .iter()
            .map(|(m, f)| f * m.absorption_per_mm.at(wavelength_nm))
            .sum()
    }

    /// Scattering coefficient of the mixture at `wavelength_nm`, per mm.
    pub fn scattering_per_mm(&self, wavelength_nm: f64) -> f64 {
        self.components
            .iter()
            .map(|(m, f)| f * m.scattering_per_mm.at(wavelength_nm))
            .sum()
    }

    /// Scattering-weighted anisotropy:
    /// `sum(f_i g_i mus_i) / sum(f_i mus_i)`. When the mixture does not
    /// scatter at all the weighting degenerates and the plain
    /// fraction-weighted mean is used instead.
    pub fn anisotropy(&self, wavelength_nm: f64) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (molecule, fraction) in &self.components {
            let mus = fraction * molecule.scattering_per_mm.at(wavelength_nm);
            weighted += mus * molecule.anisotropy;
            total += mus;
        }
        if total > 0.0 {
            weighted / total
        } else {
            self.components
                .iter()
                .map(|(m, f)| f * m.anisotropy)
                .sum()
        }
    }

    pub fn sound_speed_m_s(&self) -> f64 {
        self.components
            .iter()
            .map(|(m, f)| f * m.sound_speed_m_s)
            .sum()
    }

    pub fn density_kg_m3(&self) -> f64 {
        self.components
            .iter()
            .map(|(m, f)| f * m.density_kg_m3)
            .sum()
    }

    pub fn attenuation_db_cm_mhz(&self) -> f64 {
        self.components
            .iter()
            .map(|(m, f)| f * m.attenuation_db_cm_mhz)
            .sum()
    }

    pub fn gruneisen(&self) -> f64 {
        self.components.iter().map(|(m, f)| f * m.gruneisen).sum()
    }
}
