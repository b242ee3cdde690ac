//! `From` implementations bridging `phasectl_config` types to `phasectl_core` types.

use std::time::Duration;

use crate::angle::Angle;
use crate::config::{
    ActuatorCfg, AlternatorCfg, EngineCfg, EnvelopeCfg, EnvelopeMode, StabilizationCfg,
};
use crate::fit::FitParameters;
use crate::spectrum::WavelengthRange;

// ── EngineCfg ────────────────────────────────────────────────────────────────

impl From<&phasectl_config::EngineCfg> for EngineCfg {
    fn from(c: &phasectl_config::EngineCfg) -> Self {
        Self {
            poll_interval: Duration::from_millis(c.poll_ms.max(1)),
            pending_wait: Duration::from_millis(c.pending_wait_ms.max(1)),
        }
    }
}

// ── ActuatorCfg ──────────────────────────────────────────────────────────────

impl From<&phasectl_config::ActuatorCfg> for ActuatorCfg {
    fn from(c: &phasectl_config::ActuatorCfg) -> Self {
        Self {
            settle_timeout: Duration::from_millis(c.settle_timeout_ms),
            ..Self::default()
        }
    }
}

// ── FitParameters ────────────────────────────────────────────────────────────

impl From<&phasectl_config::FitSeed> for FitParameters {
    fn from(s: &phasectl_config::FitSeed) -> Self {
        Self {
            central_wavelength_nm: s.central_wavelength_nm,
            bandwidth_nm: s.bandwidth_nm,
            baseline: s.baseline,
            phase: Angle::from_radians(s.phase_rad),
            tau_ps: s.tau_ps,
            chirp_r: s.chirp_r,
            chirp_l: s.chirp_l,
            residual: 0.0,
        }
    }
}

// ── StabilizationCfg ─────────────────────────────────────────────────────────

impl From<&phasectl_config::StabilizationCfg> for StabilizationCfg {
    fn from(c: &phasectl_config::StabilizationCfg) -> Self {
        Self {
            range: WavelengthRange::new(c.min_nm, c.max_nm),
            residuals_threshold: c.residuals_threshold,
            avg_spectra: c.avg_spectra,
            seed: FitParameters::from(&c.seed),
            tolerance: Angle::from_degrees(c.tolerance_deg),
            correction_scale: c.correction_scale,
            correction_sign: f64::from(c.correction_sign.signum()),
            target_phase: Angle::from_radians(c.target_phase_rad),
        }
    }
}

// ── EnvelopeCfg ──────────────────────────────────────────────────────────────

impl From<phasectl_config::EnvelopeMode> for EnvelopeMode {
    fn from(m: phasectl_config::EnvelopeMode) -> Self {
        match m {
            phasectl_config::EnvelopeMode::Maximize => EnvelopeMode::Maximize,
            phasectl_config::EnvelopeMode::Minimize => EnvelopeMode::Minimize,
        }
    }
}

impl From<&phasectl_config::EnvelopeCfg> for EnvelopeCfg {
    fn from(c: &phasectl_config::EnvelopeCfg) -> Self {
        Self {
            range: WavelengthRange::new(c.min_nm, c.max_nm),
            step: Angle::from_degrees(c.step_deg),
            mode: c.mode.into(),
            smooth_window: c.smooth_window,
            improve_eps: c.improve_eps,
        }
    }
}

// ── AlternatorCfg ────────────────────────────────────────────────────────────

impl From<&phasectl_config::RandomizerCfg> for AlternatorCfg {
    fn from(c: &phasectl_config::RandomizerCfg) -> Self {
        Self {
            step: Angle::from_degrees(c.step_deg),
            speed_percent: c.speed_percent,
        }
    }
}
