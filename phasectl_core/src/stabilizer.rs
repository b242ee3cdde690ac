//! Phase stabilization: track the spectral phase and rotate the plate back
//! toward the target whenever a new phase is accepted.

use crate::angle::Angle;
use crate::config::StabilizationCfg;
use crate::corrector::PhaseCorrector;
use crate::error::CoreError;
use crate::estimator::{Curve, Estimator, StepOutcome, StepReport};
use crate::fit::{FitModel, FitParameters};
use crate::spectrum::{Spectrum, WavelengthRange};
use crate::tracker::{PhaseTracker, TrackerUpdate};

pub struct PhaseStabilizer<M> {
    range: WavelengthRange,
    tracker: PhaseTracker<M>,
    corrector: PhaseCorrector,
}

impl<M: FitModel> PhaseStabilizer<M> {
    pub fn new(model: M, cfg: &StabilizationCfg) -> Self {
        Self {
            range: cfg.range,
            tracker: PhaseTracker::new(model, cfg.seed, cfg.avg_spectra, cfg.residuals_threshold),
            corrector: PhaseCorrector::new(
                cfg.target_phase,
                cfg.tolerance,
                cfg.correction_scale,
                cfg.correction_sign,
            ),
        }
    }

    pub fn tracker(&self) -> &PhaseTracker<M> {
        &self.tracker
    }

    pub fn corrector(&self) -> &PhaseCorrector {
        &self.corrector
    }

    pub fn set_target_phase(&mut self, target: Angle) {
        self.corrector.set_target_phase(target);
    }

    pub fn set_range(&mut self, range: WavelengthRange) {
        self.range = range;
    }

    pub fn set_residuals_threshold(&mut self, threshold: f64) {
        self.tracker.set_residuals_threshold(threshold);
    }

    pub fn set_avg_spectra(&mut self, n: usize) {
        self.tracker.set_avg_spectra(n);
    }

    pub fn set_seed(&mut self, seed: FitParameters) {
        self.tracker.set_seed(seed);
    }

    fn report(&self, cut: &Spectrum, correction: Option<Angle>) -> StepReport {
        let x = cut.wavelengths().to_vec();
        let mut curves = Vec::with_capacity(2);
        if let Some(fit) = self.tracker.last_fit() {
            let model = self.tracker.model();
            curves.push(Curve {
                label: "fit",
                y: model.evaluate(fit, &x),
            });
            let flat = FitParameters {
                phase: Angle::ZERO,
                ..*fit
            };
            curves.push(Curve {
                label: "zero_phase",
                y: model.evaluate(&flat, &x),
            });
        }
        StepReport {
            y: cut.intensities().to_vec(),
            x,
            curves,
            current_phase: self.tracker.current_phase(),
            metric: self.tracker.last_fit().map(|p| p.residual),
            correction,
        }
    }
}

impl<M: FitModel + 'static> Estimator for PhaseStabilizer<M> {
    fn name(&self) -> &'static str {
        "stabilize"
    }

    fn step(&mut self, spectrum: Option<&Spectrum>) -> Result<Option<StepOutcome>, CoreError> {
        let Some(spectrum) = spectrum else {
            return Ok(None);
        };
        let cut = spectrum.cut(self.range);
        if !cut.is_usable() {
            tracing::trace!(points = cut.len(), "unusable spectrum skipped");
            return Ok(None);
        }

        let correction = match self.tracker.update(&cut)? {
            TrackerUpdate::Skipped => return Ok(None),
            TrackerUpdate::Accepted(phase) => {
                let c = self.corrector.update(phase);
                tracing::info!(
                    phase_rad = phase.radians(),
                    error_deg = self.corrector.error(phase).degrees(),
                    correction_deg = c.degrees(),
                    "phase accepted"
                );
                (!c.is_zero()).then_some(c)
            }
            update => {
                tracing::trace!(?update, "tracker step");
                None
            }
        };

        Ok(Some(StepOutcome {
            correction,
            report: self.report(&cut, correction),
        }))
    }

    fn reset(&mut self) {
        self.tracker.reset();
    }
}
