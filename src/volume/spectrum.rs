//! Wavelength-dependent property curves.

use super::VolumeError;

/// A sampled optical property curve over wavelength, linearly interpolated
/// between samples and clamped to the end values outside the sampled range.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    wavelengths_nm: Vec<f64>,
    values: Vec<f64>,
}

impl Spectrum {
    /// Build a spectrum from `(wavelength_nm, value)` samples. Wavelengths
    /// must be finite, strictly ascending and the table non-empty.
    pub fn from_table(points: &[(f64, f64)]) -> Result<Spectrum, VolumeError> {
        if points.is_empty() {
            return Err(VolumeError::InvalidSpectrum {
                reason: "spectrum table is empty".to_string(),
            });
        }
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(VolumeError::InvalidSpectrum {
                    reason: format!(
                        "wavelengths must be strictly ascending ({} after {})",
                        pair[1].0, pair[0].0
                    ),
                });
            }
        }
        for &(nm, value) in points {
            if !nm.is_finite() || !value.is_finite() {
                return Err(VolumeError::InvalidSpectrum {
                    reason: format!("non-finite sample ({nm}, {value})"),
                });
            }
        }
        Ok(Spectrum {
            wavelengths_nm: points.iter().map(|p| p.0).collect(),
            values: points.iter().map(|p| p.1).collect(),
        })
    }

    /// A wavelength-independent value.
    pub fn constant(value: f64) -> Spectrum {
        Spectrum {
            wavelengths_nm: vec![0.0],
            values: vec![value],
        }
    }

    /// Value at `wavelength_nm`, linearly interpolated.
    pub fn at(&self, wavelength_nm: f64) -> f64 {
        let n = self.wavelengths_nm.len();
        if wavelength_nm <= self.wavelengths_nm[0] {
            return self.values[0];
        }
        if wavelength_nm >= self.wavelengths_nm[n - 1] {
            return self.values[n - 1];
        }
        // partition_point: first sample strictly above the query.
        let hi = self
            .wavelengths_nm
            .partition_point(|&nm| nm <= wavelength_nm);
        let lo = hi - 1;
        let span = self.wavelengths_nm[hi] - self.wavelengths_nm[lo];
        let t = (wavelength_nm - self.wavelengths_nm[lo]) / span;
        self.values[lo] * (1.0 - t) + self.values[hi] * t
    }
}
