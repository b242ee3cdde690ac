//! Fit model seam and the interference model used for phase tracking.
//!
//! Model: projection of two chirped, delayed copies of one pulse
//!
//! ```text
//! ν  = c / λ,  Δν = ν − c / λc
//! g  = exp(−(λ − λc)² / 2σ²)
//! k  = 2π·Δν·τ + π·Δν²·(1/a_r − 1/a_l)
//! y  = b + (1 − b)·g·(1 + cos(k + φ)) / 2
//! ```
//!
//! The phase enters linearly through (cos φ, sin φ), so a phase-only fit is
//! a closed-form 2×2 least squares. The full fit runs a bounded coordinate
//! descent over the remaining coefficients, re-solving the phase at every
//! evaluation.

use thiserror::Error;

use crate::angle::Angle;

/// Speed of light in nm·THz.
pub const SPEED_OF_LIGHT_NM_THZ: f64 = 299_792.458;

const MIN_POINTS: usize = 8;
const FULL_FIT_SWEEPS: usize = 4;
const GOLDEN_ITERS: usize = 28;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("x and y differ in length ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },
    #[error("need at least {needed} points, got {got}")]
    TooFewPoints { needed: usize, got: usize },
    #[error("non-finite input data")]
    NonFinite,
    #[error("degenerate system: {0}")]
    Degenerate(&'static str),
    #[error("cannot average an empty window")]
    EmptyWindow,
}

/// Which coefficients a fit may move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitScope {
    Full,
    PhaseOnly,
}

/// Model coefficients plus the residual of the fit that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParameters {
    pub central_wavelength_nm: f64,
    pub bandwidth_nm: f64,
    pub baseline: f64,
    pub phase: Angle,
    /// Delay between the two pulses (ps).
    pub tau_ps: f64,
    /// Chirp rates dν/dt (THz/ps).
    pub chirp_r: f64,
    pub chirp_l: f64,
    /// Sum of squared residuals.
    pub residual: f64,
}

impl Default for FitParameters {
    fn default() -> Self {
        Self {
            central_wavelength_nm: 802.38,
            bandwidth_nm: 7.4728,
            baseline: 0.3338,
            phase: Angle::from_radians(-3.34),
            tau_ps: 0.30,
            chirp_r: 0.60,
            chirp_l: 0.60,
            residual: 0.0,
        }
    }
}

impl FitParameters {
    /// Element-wise mean, residual included. The phase is averaged on the
    /// circle so a window straddling ±π stays near ±π.
    pub fn mean(items: &[FitParameters]) -> Result<FitParameters, FitError> {
        if items.is_empty() {
            return Err(FitError::EmptyWindow);
        }
        let n = items.len() as f64;
        let avg = |f: fn(&FitParameters) -> f64| items.iter().map(f).sum::<f64>() / n;
        // Offsets from the first phase, each taken the short way round.
        let reference = items[0].phase;
        let offset = items
            .iter()
            .map(|p| (p.phase - reference).wrap_pi().radians())
            .sum::<f64>()
            / n;
        let mut phase = reference + Angle::from_radians(offset);
        if phase.radians().abs() > std::f64::consts::PI {
            phase = phase.wrap_pi();
        }
        Ok(FitParameters {
            central_wavelength_nm: avg(|p| p.central_wavelength_nm),
            bandwidth_nm: avg(|p| p.bandwidth_nm),
            baseline: avg(|p| p.baseline),
            phase,
            tau_ps: avg(|p| p.tau_ps),
            chirp_r: avg(|p| p.chirp_r),
            chirp_l: avg(|p| p.chirp_l),
            residual: avg(|p| p.residual),
        })
    }

    /// Copy model coefficients and residual from `other`.
    pub fn copy_model_from(&mut self, other: &FitParameters) {
        *self = *other;
    }

    fn get(&self, c: Coeff) -> f64 {
        match c {
            Coeff::Center => self.central_wavelength_nm,
            Coeff::Bandwidth => self.bandwidth_nm,
            Coeff::Baseline => self.baseline,
            Coeff::Tau => self.tau_ps,
            Coeff::ChirpR => self.chirp_r,
            Coeff::ChirpL => self.chirp_l,
        }
    }

    fn set(&mut self, c: Coeff, v: f64) {
        match c {
            Coeff::Center => self.central_wavelength_nm = v,
            Coeff::Bandwidth => self.bandwidth_nm = v,
            Coeff::Baseline => self.baseline = v,
            Coeff::Tau => self.tau_ps = v,
            Coeff::ChirpR => self.chirp_r = v,
            Coeff::ChirpL => self.chirp_l = v,
        }
    }
}

/// Curve model: evaluate parameters on an axis, or fit parameters to data.
pub trait FitModel: Send {
    fn evaluate(&self, params: &FitParameters, x: &[f64]) -> Vec<f64>;

    /// Best-fit parameters starting from `seed`. Coefficients outside `scope`
    /// are returned unchanged; `residual` is always recomputed.
    fn fit(
        &self,
        x: &[f64],
        y: &[f64],
        seed: &FitParameters,
        scope: FitScope,
    ) -> Result<FitParameters, FitError>;
}

impl<M: FitModel + ?Sized> FitModel for Box<M> {
    fn evaluate(&self, params: &FitParameters, x: &[f64]) -> Vec<f64> {
        (**self).evaluate(params, x)
    }

    fn fit(
        &self,
        x: &[f64],
        y: &[f64],
        seed: &FitParameters,
        scope: FitScope,
    ) -> Result<FitParameters, FitError> {
        (**self).fit(x, y, seed, scope)
    }
}

#[derive(Debug, Clone, Copy)]
enum Coeff {
    Center,
    Bandwidth,
    Baseline,
    Tau,
    ChirpR,
    ChirpL,
}

/// Two-pulse spectral interference model.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterferenceModel;

/// Per-point quantities that do not depend on the phase.
struct Basis {
    /// Amplitude of the oscillating term: (1 − b)·g / 2.
    amp: Vec<f64>,
    k: Vec<f64>,
}

fn inv_or_zero(a: f64) -> f64 {
    if a.abs() < 1e-9 { 0.0 } else { 1.0 / a }
}

impl InterferenceModel {
    fn basis(p: &FitParameters, x: &[f64]) -> Basis {
        let nu0 = SPEED_OF_LIGHT_NM_THZ / p.central_wavelength_nm;
        let chirp = inv_or_zero(p.chirp_r) - inv_or_zero(p.chirp_l);
        let two_sigma_sq = 2.0 * p.bandwidth_nm * p.bandwidth_nm;
        let mut amp = Vec::with_capacity(x.len());
        let mut k = Vec::with_capacity(x.len());
        for &lambda in x {
            let dl = lambda - p.central_wavelength_nm;
            let g = (-(dl * dl) / two_sigma_sq).exp();
            let dnu = SPEED_OF_LIGHT_NM_THZ / lambda - nu0;
            amp.push((1.0 - p.baseline) * g * 0.5);
            k.push(std::f64::consts::TAU * dnu * p.tau_ps + std::f64::consts::PI * dnu * dnu * chirp);
        }
        Basis { amp, k }
    }

    /// Least-squares phase for fixed non-phase coefficients.
    fn solve_phase(p: &FitParameters, x: &[f64], y: &[f64]) -> Result<Angle, FitError> {
        let b = Self::basis(p, x);
        // r = amp·cos(k)·u − amp·sin(k)·v, with (u, v) = (cos φ, sin φ)
        let (mut saa, mut sab, mut sbb, mut sar, mut sbr) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for i in 0..x.len() {
            let r = y[i] - p.baseline - b.amp[i];
            let a = b.amp[i] * b.k[i].cos();
            let c = -b.amp[i] * b.k[i].sin();
            saa += a * a;
            sab += a * c;
            sbb += c * c;
            sar += a * r;
            sbr += c * r;
        }
        let det = saa * sbb - sab * sab;
        if !det.is_finite() || det.abs() < 1e-12 {
            return Err(FitError::Degenerate("phase normal equations are singular"));
        }
        let u = (sar * sbb - sbr * sab) / det;
        let v = (sbr * saa - sar * sab) / det;
        if u == 0.0 && v == 0.0 {
            return Err(FitError::Degenerate("no oscillating component"));
        }
        Ok(Angle::from_radians(v.atan2(u)))
    }

    fn sse(&self, p: &FitParameters, x: &[f64], y: &[f64]) -> f64 {
        self.evaluate(p, x)
            .iter()
            .zip(y)
            .map(|(m, d)| (m - d) * (m - d))
            .sum()
    }

    /// Cost of `p` after re-solving its phase; infinite when unsolvable.
    fn profile_cost(&self, p: &mut FitParameters, x: &[f64], y: &[f64]) -> f64 {
        match Self::solve_phase(p, x, y) {
            Ok(phase) => {
                p.phase = phase;
                let c = self.sse(p, x, y);
                if c.is_finite() { c } else { f64::INFINITY }
            }
            Err(_) => f64::INFINITY,
        }
    }

    fn bounds(seed: &FitParameters, c: Coeff) -> Option<(f64, f64)> {
        let v = seed.get(c);
        match c {
            Coeff::Center => Some((v - 1.0, v + 1.0)),
            Coeff::Bandwidth => Some((0.5 * v, 1.5 * v)),
            Coeff::Baseline => Some(((v - 0.2).max(0.0), (v + 0.2).min(0.95))),
            Coeff::Tau => Some((v - 0.1, v + 0.1)),
            Coeff::ChirpR | Coeff::ChirpL => {
                if v.abs() < 1e-9 {
                    None
                } else {
                    let (lo, hi) = (0.5 * v, 1.5 * v);
                    Some((lo.min(hi), lo.max(hi)))
                }
            }
        }
    }

    fn golden_section(
        &self,
        current: &FitParameters,
        c: Coeff,
        (mut lo, mut hi): (f64, f64),
        x: &[f64],
        y: &[f64],
    ) -> (FitParameters, f64) {
        const INV_PHI: f64 = 0.618_033_988_749_895;
        let eval = |v: f64| {
            let mut p = *current;
            p.set(c, v);
            let cost = self.profile_cost(&mut p, x, y);
            (p, cost)
        };
        let mut x1 = hi - INV_PHI * (hi - lo);
        let mut x2 = lo + INV_PHI * (hi - lo);
        let mut f1 = eval(x1);
        let mut f2 = eval(x2);
        for _ in 0..GOLDEN_ITERS {
            if f1.1 <= f2.1 {
                hi = x2;
                x2 = x1;
                f2 = f1;
                x1 = hi - INV_PHI * (hi - lo);
                f1 = eval(x1);
            } else {
                lo = x1;
                x1 = x2;
                f1 = f2;
                x2 = lo + INV_PHI * (hi - lo);
                f2 = eval(x2);
            }
        }
        if f1.1 <= f2.1 { f1 } else { f2 }
    }
}

fn check_input(x: &[f64], y: &[f64]) -> Result<(), FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    if x.len() < MIN_POINTS {
        return Err(FitError::TooFewPoints {
            needed: MIN_POINTS,
            got: x.len(),
        });
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(())
}

impl FitModel for InterferenceModel {
    fn evaluate(&self, params: &FitParameters, x: &[f64]) -> Vec<f64> {
        let b = Self::basis(params, x);
        let phi = params.phase.radians();
        b.amp
            .iter()
            .zip(&b.k)
            .map(|(a, k)| params.baseline + a + a * (k + phi).cos())
            .collect()
    }

    fn fit(
        &self,
        x: &[f64],
        y: &[f64],
        seed: &FitParameters,
        scope: FitScope,
    ) -> Result<FitParameters, FitError> {
        check_input(x, y)?;
        let mut best = *seed;
        best.phase = Self::solve_phase(seed, x, y)?;
        let mut best_cost = self.sse(&best, x, y);

        if scope == FitScope::Full {
            let coeffs = [
                Coeff::Center,
                Coeff::Tau,
                Coeff::Baseline,
                Coeff::Bandwidth,
                Coeff::ChirpR,
                Coeff::ChirpL,
            ];
            for _ in 0..FULL_FIT_SWEEPS {
                for c in coeffs {
                    let Some(range) = Self::bounds(seed, c) else {
                        continue;
                    };
                    let (cand, cost) = self.golden_section(&best, c, range, x, y);
                    if cost < best_cost {
                        best = cand;
                        best_cost = cost;
                    }
                }
            }
        }

        if !best_cost.is_finite() {
            return Err(FitError::NonFinite);
        }
        best.residual = best_cost;
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis() -> Vec<f64> {
        (0..200).map(|i| 796.0 + 14.0 * f64::from(i) / 199.0).collect()
    }

    #[test]
    fn mean_is_element_wise() {
        let a = FitParameters {
            tau_ps: 0.2,
            phase: Angle::from_radians(0.4),
            residual: 1.0,
            ..FitParameters::default()
        };
        let b = FitParameters {
            tau_ps: 0.4,
            phase: Angle::from_radians(0.6),
            residual: 3.0,
            ..FitParameters::default()
        };
        let m = FitParameters::mean(&[a, b]).unwrap();
        assert!((m.tau_ps - 0.3).abs() < 1e-12);
        assert!((m.phase.radians() - 0.5).abs() < 1e-12);
        assert!((m.residual - 2.0).abs() < 1e-12);
        assert_eq!(FitParameters::mean(&[]), Err(FitError::EmptyWindow));
    }

    #[test]
    fn mean_phase_wraps_across_pi() {
        let at = |rad: f64| FitParameters {
            phase: Angle::from_radians(rad),
            ..FitParameters::default()
        };
        let m = FitParameters::mean(&[at(3.10), at(-3.10)]).unwrap();
        assert!((m.phase.radians().abs() - std::f64::consts::PI).abs() < 1e-9);

        let m = FitParameters::mean(&[at(3.10), at(3.10), at(-3.08)]).unwrap();
        assert!(m.phase.radians() > 3.0 || m.phase.radians() < -3.0);
        assert!(m.phase.radians().abs() <= std::f64::consts::PI);
    }

    #[test]
    fn evaluate_stays_within_baseline_and_one() {
        let p = FitParameters::default();
        let y = InterferenceModel.evaluate(&p, &axis());
        assert!(y.iter().all(|v| *v >= p.baseline - 1e-12 && *v <= 1.0 + 1e-12));
    }

    #[test]
    fn phase_only_fit_recovers_injected_phase() {
        let x = axis();
        let truth = FitParameters {
            phase: Angle::from_radians(0.7),
            ..FitParameters::default()
        };
        let y = InterferenceModel.evaluate(&truth, &x);
        let fitted = InterferenceModel
            .fit(&x, &y, &FitParameters::default(), FitScope::PhaseOnly)
            .unwrap();
        assert!((fitted.phase.radians() - 0.7).abs() < 1e-6);
        assert!(fitted.residual < 1e-12);
        assert_eq!(fitted.tau_ps, truth.tau_ps);
    }

    #[test]
    fn full_fit_reduces_residual_from_perturbed_seed() {
        let x = axis();
        let truth = FitParameters {
            phase: Angle::from_radians(-1.1),
            ..FitParameters::default()
        };
        let y = InterferenceModel.evaluate(&truth, &x);
        let seed = FitParameters {
            central_wavelength_nm: truth.central_wavelength_nm + 0.3,
            baseline: truth.baseline + 0.05,
            ..truth
        };
        let seed_fit = InterferenceModel
            .fit(&x, &y, &seed, FitScope::PhaseOnly)
            .unwrap();
        let full = InterferenceModel.fit(&x, &y, &seed, FitScope::Full).unwrap();
        assert!(full.residual < 0.5 * seed_fit.residual);
    }

    #[test]
    fn rejects_bad_input() {
        let x = axis();
        let mut y = InterferenceModel.evaluate(&FitParameters::default(), &x);
        y[3] = f64::NAN;
        let seed = FitParameters::default();
        assert_eq!(
            InterferenceModel.fit(&x, &y, &seed, FitScope::PhaseOnly),
            Err(FitError::NonFinite)
        );
        assert!(matches!(
            InterferenceModel.fit(&x[..3], &y[..3], &seed, FitScope::PhaseOnly),
            Err(FitError::TooFewPoints { .. })
        ));
        assert!(matches!(
            InterferenceModel.fit(&x, &y[..10], &seed, FitScope::PhaseOnly),
            Err(FitError::LengthMismatch { .. })
        ));
    }
}
