//! Hill-climb on the envelope peak: keep stepping while the metric improves,
//! reverse direction as soon as it does not.

use crate::angle::Angle;
use crate::config::{EnvelopeCfg, EnvelopeMode};
use crate::error::CoreError;
use crate::estimator::{Curve, Estimator, StepOutcome, StepReport};
use crate::spectrum::{Spectrum, WavelengthRange};

pub struct EnvelopeSignalGenerator {
    range: WavelengthRange,
    step: Angle,
    mode: EnvelopeMode,
    smooth_window: usize,
    improve_eps: f64,
    direction: f64,
    last_metric: Option<f64>,
}

impl EnvelopeSignalGenerator {
    pub fn new(cfg: &EnvelopeCfg) -> Self {
        Self {
            range: cfg.range,
            step: cfg.step.abs(),
            mode: cfg.mode,
            smooth_window: cfg.smooth_window.max(1),
            improve_eps: cfg.improve_eps.max(0.0),
            direction: 1.0,
            last_metric: None,
        }
    }

    /// +1 or -1.
    pub fn direction(&self) -> f64 {
        self.direction
    }

    pub fn last_metric(&self) -> Option<f64> {
        self.last_metric
    }

    pub fn set_step(&mut self, step: Angle) {
        self.step = step.abs();
    }

    pub fn set_mode(&mut self, mode: EnvelopeMode) {
        self.mode = mode;
        self.last_metric = None;
    }

    pub fn set_range(&mut self, range: WavelengthRange) {
        self.range = range;
    }

    fn metric(&self, smoothed: &[f64]) -> f64 {
        let values = smoothed.iter().copied();
        match self.mode {
            EnvelopeMode::Maximize => values.fold(f64::NEG_INFINITY, f64::max),
            EnvelopeMode::Minimize => values.fold(f64::INFINITY, f64::min),
        }
    }

    fn improved(&self, metric: f64, last: f64) -> bool {
        match self.mode {
            EnvelopeMode::Maximize => metric > last + self.improve_eps,
            EnvelopeMode::Minimize => metric < last - self.improve_eps,
        }
    }
}

/// Centered moving average with a shrinking window at the edges.
/// Returns the input unchanged when `window` is 1 or exceeds the data.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || window > values.len() {
        return values.to_vec();
    }
    let half = window / 2;
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    for v in values {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + window - half).min(values.len());
            (prefix[hi] - prefix[lo]) / (hi - lo) as f64
        })
        .collect()
}

impl Estimator for EnvelopeSignalGenerator {
    fn name(&self) -> &'static str {
        "envelope"
    }

    fn step(&mut self, spectrum: Option<&Spectrum>) -> Result<Option<StepOutcome>, CoreError> {
        let Some(spectrum) = spectrum else {
            return Ok(None);
        };
        let cut = spectrum.cut(self.range);
        if !cut.is_usable() {
            return Ok(None);
        }

        let smoothed = moving_average(cut.intensities(), self.smooth_window);
        let metric = self.metric(&smoothed);
        let correction = match self.last_metric {
            None => None,
            Some(last) => {
                if !self.improved(metric, last) {
                    self.direction = -self.direction;
                    tracing::debug!(metric, last, direction = self.direction, "envelope direction flipped");
                }
                Some(self.step * self.direction)
            }
        };
        self.last_metric = Some(metric);

        Ok(Some(StepOutcome {
            correction,
            report: StepReport {
                x: cut.wavelengths().to_vec(),
                y: cut.intensities().to_vec(),
                curves: vec![Curve {
                    label: "envelope",
                    y: smoothed,
                }],
                current_phase: None,
                metric: Some(metric),
                correction,
            },
        }))
    }

    fn reset(&mut self) {
        self.direction = 1.0;
        self.last_metric = None;
    }
}
