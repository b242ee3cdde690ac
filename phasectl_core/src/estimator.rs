//! Strategy seam between the control engine and a concrete algorithm.

use crate::actuator::ActuatorController;
use crate::angle::Angle;
use crate::error::CoreError;
use crate::spectrum::Spectrum;

/// What drives a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// One step per fresh spectrum, gated on actuator idle.
    Spectrum,
    /// One step per actuator-idle cycle; sensor data is ignored.
    FreeRunning,
}

/// How `ControlEngine::reset` treats a running loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Clear estimator state; the loop keeps running.
    InPlace,
    /// Stop gracefully, let the in-flight command finish, then re-arm.
    DrainThenRearm,
}

/// Named curve for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub label: &'static str,
    pub y: Vec<f64>,
}

/// Per-step result delivered to the result callback.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepReport {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub curves: Vec<Curve>,
    pub current_phase: Option<Angle>,
    pub metric: Option<f64>,
    pub correction: Option<Angle>,
}

impl StepReport {
    pub fn curve(&self, label: &str) -> Option<&[f64]> {
        self.curves
            .iter()
            .find(|c| c.label == label)
            .map(|c| c.y.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepOutcome {
    /// Stage move to issue; `None` or zero means hold position.
    pub correction: Option<Angle>,
    pub report: StepReport,
}

pub trait Estimator: Send + 'static {
    fn name(&self) -> &'static str;

    fn input_mode(&self) -> InputMode {
        InputMode::Spectrum
    }

    fn reset_policy(&self) -> ResetPolicy {
        ResetPolicy::InPlace
    }

    /// Called once per `start`, before the loop spawns.
    fn on_start(&mut self, _actuator: &ActuatorController) {}

    /// Process one input. `Ok(None)` means the input was skipped without
    /// any state change and nothing is reported.
    fn step(&mut self, spectrum: Option<&Spectrum>) -> Result<Option<StepOutcome>, CoreError>;

    /// Clear accumulated state.
    fn reset(&mut self);

    /// Restore the start-of-run configuration after a drained reset.
    fn rearm(&mut self, actuator: &ActuatorController) {
        let _ = actuator;
        self.reset();
    }

    /// True once after a setter asked for a reset; the engine applies it on
    /// its own thread with the estimator's reset policy.
    fn take_reset_request(&mut self) -> bool {
        false
    }
}
