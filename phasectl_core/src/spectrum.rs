//! Immutable spectrum: strictly increasing wavelength axis with one
//! intensity per point.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("{wavelengths} wavelengths but {intensities} intensities")]
    LengthMismatch {
        wavelengths: usize,
        intensities: usize,
    },
    #[error("wavelength axis not strictly increasing at index {0}")]
    NotIncreasing(usize),
    #[error("non-finite wavelength at index {0}")]
    NonFiniteWavelength(usize),
}

/// Inclusive wavelength window in nm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthRange {
    pub min_nm: f64,
    pub max_nm: f64,
}

impl WavelengthRange {
    pub const fn new(min_nm: f64, max_nm: f64) -> Self {
        Self { min_nm, max_nm }
    }

    #[inline]
    pub fn contains(&self, nm: f64) -> bool {
        nm >= self.min_nm && nm <= self.max_nm
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spectrum {
    wavelengths: Vec<f64>,
    intensities: Vec<f64>,
}

impl Spectrum {
    pub fn new(wavelengths: Vec<f64>, intensities: Vec<f64>) -> Result<Self, SpectrumError> {
        if wavelengths.len() != intensities.len() {
            return Err(SpectrumError::LengthMismatch {
                wavelengths: wavelengths.len(),
                intensities: intensities.len(),
            });
        }
        for (i, w) in wavelengths.iter().enumerate() {
            if !w.is_finite() {
                return Err(SpectrumError::NonFiniteWavelength(i));
            }
            if i > 0 && *w <= wavelengths[i - 1] {
                return Err(SpectrumError::NotIncreasing(i));
            }
        }
        Ok(Self {
            wavelengths,
            intensities,
        })
    }

    /// Build from raw detector counts, optionally min-max normalized to [0, 1].
    pub fn from_raw(
        wavelengths: &[f64],
        counts: &[f64],
        normalize: bool,
    ) -> Result<Self, SpectrumError> {
        let intensities = if normalize {
            min_max(counts)
        } else {
            counts.to_vec()
        };
        Self::new(wavelengths.to_vec(), intensities)
    }

    /// Points whose wavelength lies inside `range`.
    pub fn cut(&self, range: WavelengthRange) -> Spectrum {
        let (wavelengths, intensities) = self
            .points()
            .filter(|(w, _)| range.contains(*w))
            .unzip();
        Spectrum {
            wavelengths,
            intensities,
        }
    }

    pub fn normalized(&self) -> Spectrum {
        Spectrum {
            wavelengths: self.wavelengths.clone(),
            intensities: min_max(&self.intensities),
        }
    }

    /// Non-empty, all intensities finite, and not identically zero.
    pub fn is_usable(&self) -> bool {
        !self.intensities.is_empty()
            && self.intensities.iter().all(|v| v.is_finite())
            && self.intensities.iter().any(|v| *v != 0.0)
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .copied()
            .zip(self.intensities.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }
}

/// Shift to zero minimum, then scale to unit maximum when the span is positive.
fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return values.to_vec();
    }
    let shifted: Vec<f64> = values.iter().map(|v| v - min).collect();
    let max = shifted.iter().copied().fold(0.0, f64::max);
    if max > 0.0 && max.is_finite() {
        shifted.into_iter().map(|v| v / max).collect()
    } else {
        shifted
    }
}
