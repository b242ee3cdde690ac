//! Windowed phase estimation on top of a [`FitModel`].
//!
//! The tracker first learns the slow model coefficients by averaging
//! `avg_spectra` full fits, then estimates only the phase, again averaged over
//! `avg_spectra` spectra. A phase window is accepted when its mean residual is
//! below the threshold.

use crate::angle::Angle;
use crate::fit::{FitError, FitModel, FitParameters, FitScope};
use crate::spectrum::Spectrum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Collecting full fits.
    Gathering,
    /// Collecting phase-only fits against the consolidated coefficients.
    PhaseOnly,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerUpdate {
    /// Unusable spectrum; nothing changed.
    Skipped,
    Gathering { collected: usize, needed: usize },
    /// Full-fit window folded into the canonical coefficients.
    Consolidated,
    Collecting { collected: usize, needed: usize },
    Accepted(Angle),
    Rejected { residual: f64 },
}

pub struct PhaseTracker<M> {
    model: M,
    residuals_threshold: f64,
    avg_spectra: usize,
    seed: FitParameters,
    params: FitParameters,
    window: Vec<FitParameters>,
    state: TrackerState,
    current_phase: Option<Angle>,
    last_fit: Option<FitParameters>,
}

impl<M: FitModel> PhaseTracker<M> {
    pub fn new(model: M, seed: FitParameters, avg_spectra: usize, residuals_threshold: f64) -> Self {
        let avg_spectra = avg_spectra.max(1);
        Self {
            model,
            residuals_threshold,
            avg_spectra,
            seed,
            params: seed,
            window: Vec::with_capacity(avg_spectra),
            state: TrackerState::Gathering,
            current_phase: None,
            last_fit: None,
        }
    }

    pub fn update(&mut self, spectrum: &Spectrum) -> Result<TrackerUpdate, FitError> {
        if !spectrum.is_usable() {
            return Ok(TrackerUpdate::Skipped);
        }
        let scope = match self.state {
            TrackerState::Gathering => FitScope::Full,
            TrackerState::PhaseOnly => FitScope::PhaseOnly,
        };
        let fitted = self.model.fit(
            spectrum.wavelengths(),
            spectrum.intensities(),
            &self.params,
            scope,
        )?;

        self.last_fit = Some(fitted);
        self.window.push(fitted);
        let collected = self.window.len();
        if collected < self.avg_spectra {
            let needed = self.avg_spectra;
            return Ok(match self.state {
                TrackerState::Gathering => TrackerUpdate::Gathering { collected, needed },
                TrackerState::PhaseOnly => TrackerUpdate::Collecting { collected, needed },
            });
        }

        let mean = FitParameters::mean(&self.window)?;
        self.window.clear();
        match self.state {
            TrackerState::Gathering => {
                self.params.copy_model_from(&mean);
                self.state = TrackerState::PhaseOnly;
                tracing::debug!(
                    center_nm = mean.central_wavelength_nm,
                    tau_ps = mean.tau_ps,
                    residual = mean.residual,
                    "model coefficients consolidated"
                );
                Ok(TrackerUpdate::Consolidated)
            }
            TrackerState::PhaseOnly if mean.residual < self.residuals_threshold => {
                self.params.phase = mean.phase;
                self.params.residual = mean.residual;
                self.current_phase = Some(mean.phase);
                tracing::debug!(phase_rad = mean.phase.radians(), residual = mean.residual, "phase window accepted");
                Ok(TrackerUpdate::Accepted(mean.phase))
            }
            TrackerState::PhaseOnly => {
                tracing::debug!(
                    residual = mean.residual,
                    threshold = self.residuals_threshold,
                    "phase window rejected"
                );
                Ok(TrackerUpdate::Rejected {
                    residual: mean.residual,
                })
            }
        }
    }

    /// Back to gathering with the original seed.
    pub fn reset(&mut self) {
        self.params = self.seed;
        self.window.clear();
        self.state = TrackerState::Gathering;
        self.current_phase = None;
        self.last_fit = None;
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn current_phase(&self) -> Option<Angle> {
        self.current_phase
    }

    /// Canonical coefficients.
    pub fn params(&self) -> &FitParameters {
        &self.params
    }

    /// Most recent single-spectrum fit.
    pub fn last_fit(&self) -> Option<&FitParameters> {
        self.last_fit.as_ref()
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn set_residuals_threshold(&mut self, threshold: f64) {
        self.residuals_threshold = threshold;
    }

    /// Takes effect at the next window boundary.
    pub fn set_avg_spectra(&mut self, n: usize) {
        self.avg_spectra = n.max(1);
    }

    /// New starting point for the next gathering phase.
    pub fn set_seed(&mut self, seed: FitParameters) {
        self.seed = seed;
    }
}
