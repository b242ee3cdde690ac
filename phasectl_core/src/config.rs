//! Runtime configuration for the control stack.
//!
//! These are the structs the engine, estimators and actuator controller read.
//! They are separate from the TOML-deserialized config in `phasectl_config`;
//! see `conversions` for the bridge.

use std::time::Duration;

use crate::angle::Angle;
use crate::fit::FitParameters;
use crate::spectrum::WavelengthRange;

/// Production loop timing.
#[derive(Debug, Clone, Copy)]
pub struct EngineCfg {
    /// Busy-poll interval; also bounds stop latency.
    pub poll_interval: Duration,
    /// Upper bound on a single wait for the pending-spectrum signal.
    pub pending_wait: Duration,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            pending_wait: Duration::from_millis(100),
        }
    }
}

/// Actuator worker timing.
#[derive(Debug, Clone, Copy)]
pub struct ActuatorCfg {
    /// Maximum time a motion may take to report idle.
    pub settle_timeout: Duration,
    /// Interval between status polls while settling.
    pub status_poll: Duration,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            settle_timeout: Duration::from_secs(5),
            status_poll: Duration::from_millis(10),
        }
    }
}

/// Phase tracking and correction.
#[derive(Debug, Clone)]
pub struct StabilizationCfg {
    /// Window the fit runs on.
    pub range: WavelengthRange,
    /// Maximum mean residual of an accepted phase window.
    pub residuals_threshold: f64,
    /// Spectra per averaging window (gathering and phase-only alike).
    pub avg_spectra: usize,
    /// Starting coefficients for the first full fits.
    pub seed: FitParameters,
    /// Dead-band around the target phase.
    pub tolerance: Angle,
    /// Stage degrees per degree of phase error.
    pub correction_scale: f64,
    /// +1 or -1 depending on the mounting of the plate.
    pub correction_sign: f64,
    pub target_phase: Angle,
}

impl Default for StabilizationCfg {
    fn default() -> Self {
        Self {
            range: WavelengthRange::new(796.0, 810.0),
            residuals_threshold: 15.0,
            avg_spectra: 10,
            seed: FitParameters::default(),
            tolerance: Angle::from_degrees(10.0),
            // Half-wave plate: 1° of plate rotation shifts the phase by 8°.
            correction_scale: 1.0 / 8.0,
            correction_sign: 1.0,
            target_phase: Angle::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeMode {
    #[default]
    Maximize,
    Minimize,
}

/// Hill-climb on the envelope peak.
#[derive(Debug, Clone)]
pub struct EnvelopeCfg {
    pub range: WavelengthRange,
    pub step: Angle,
    pub mode: EnvelopeMode,
    /// Moving-average window in points (1 = disabled).
    pub smooth_window: usize,
    pub improve_eps: f64,
}

impl Default for EnvelopeCfg {
    fn default() -> Self {
        Self {
            range: WavelengthRange::new(796.0, 810.0),
            step: Angle::from_degrees(1.0),
            mode: EnvelopeMode::Maximize,
            smooth_window: 1,
            improve_eps: 0.0,
        }
    }
}

/// Alternating sweep.
#[derive(Debug, Clone, Copy)]
pub struct AlternatorCfg {
    pub step: Angle,
    pub speed_percent: u8,
}

impl Default for AlternatorCfg {
    fn default() -> Self {
        Self {
            step: Angle::from_degrees(90.0),
            speed_percent: 70,
        }
    }
}
