//! Free-running sweep: `+step`, `-step`, ... one move per idle actuator.

use crate::actuator::ActuatorController;
use crate::angle::Angle;
use crate::config::AlternatorCfg;
use crate::error::CoreError;
use crate::estimator::{Estimator, InputMode, ResetPolicy, StepOutcome, StepReport};
use crate::spectrum::Spectrum;

pub struct Alternator {
    step: Angle,
    speed_percent: u8,
    sign: f64,
    reset_pending: bool,
}

impl Alternator {
    pub fn new(cfg: &AlternatorCfg) -> Self {
        Self {
            step: cfg.step.abs(),
            speed_percent: cfg.speed_percent.clamp(1, 100),
            sign: 1.0,
            reset_pending: false,
        }
    }

    pub fn speed_percent(&self) -> u8 {
        self.speed_percent
    }

    /// Store a new speed. Applied through a drained reset.
    pub fn set_speed(&mut self, percent: u8) {
        self.speed_percent = percent.clamp(1, 100);
        self.reset_pending = true;
    }

    /// Zero or non-finite steps are ignored; the current step is kept.
    pub fn set_step(&mut self, step: Angle) {
        if step.is_zero() || !step.is_finite() {
            tracing::warn!(step_deg = step.degrees(), "ignoring unusable sweep step");
            return;
        }
        self.step = step.abs();
    }

    pub fn step_size(&self) -> Angle {
        self.step
    }
}

impl Estimator for Alternator {
    fn name(&self) -> &'static str {
        "randomize"
    }

    fn input_mode(&self) -> InputMode {
        InputMode::FreeRunning
    }

    fn reset_policy(&self) -> ResetPolicy {
        ResetPolicy::DrainThenRearm
    }

    fn on_start(&mut self, actuator: &ActuatorController) {
        actuator.request_set_speed(self.speed_percent);
    }

    fn step(&mut self, _spectrum: Option<&Spectrum>) -> Result<Option<StepOutcome>, CoreError> {
        let correction = self.step * self.sign;
        self.sign = -self.sign;
        Ok(Some(StepOutcome {
            correction: Some(correction),
            report: StepReport {
                correction: Some(correction),
                ..StepReport::default()
            },
        }))
    }

    fn reset(&mut self) {
        self.sign = 1.0;
    }

    fn rearm(&mut self, actuator: &ActuatorController) {
        self.reset();
        self.reset_pending = false;
        actuator.request_homing();
        actuator.request_set_speed(self.speed_percent);
    }

    fn take_reset_request(&mut self) -> bool {
        std::mem::take(&mut self.reset_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unusable_step_keeps_previous_value() {
        let mut alt = Alternator::new(&AlternatorCfg::default());
        alt.set_step(Angle::ZERO);
        alt.set_step(Angle::from_degrees(f64::NAN));
        assert_eq!(alt.step_size(), Angle::from_degrees(90.0));
        alt.set_step(Angle::from_degrees(-45.0));
        assert_eq!(alt.step_size(), Angle::from_degrees(45.0));
    }
}
