//! Phase error to stage angle, with a dead-band.

use crate::angle::Angle;

#[derive(Debug, Clone, Copy)]
pub struct PhaseCorrector {
    target: Angle,
    tolerance: Angle,
    scale: f64,
    sign: f64,
}

impl PhaseCorrector {
    pub fn new(target: Angle, tolerance: Angle, scale: f64, sign: f64) -> Self {
        Self {
            target,
            tolerance: tolerance.abs(),
            scale,
            sign: if sign < 0.0 { -1.0 } else { 1.0 },
        }
    }

    /// Stage rotation that moves `measured` toward the target; zero inside
    /// the dead-band.
    pub fn update(&self, measured: Angle) -> Angle {
        let error = self.error(measured);
        if error.abs() > self.tolerance {
            Angle::from_degrees(self.sign * self.scale * error.degrees())
        } else {
            Angle::ZERO
        }
    }

    /// `measured − target`, unwrapped.
    pub fn error(&self, measured: Angle) -> Angle {
        measured - self.target
    }

    pub fn set_target_phase(&mut self, target: Angle) {
        self.target = target;
    }

    pub fn target(&self) -> Angle {
        self.target
    }

    pub fn tolerance(&self) -> Angle {
        self.tolerance
    }
}

impl Default for PhaseCorrector {
    fn default() -> Self {
        Self::new(Angle::ZERO, Angle::from_degrees(10.0), 1.0 / 8.0, 1.0)
    }
}
