//! Type-state builder for `ControlEngine`.
//!
//! The builder enforces at compile time that an actuator controller is
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::actuator::ActuatorController;
use crate::buffer::SpectrumBuffer;
use crate::bus::{AcquisitionEvent, EventBus};
use crate::config::EngineCfg;
use crate::engine::ControlEngine;
use crate::error::{BuildError, Result};
use crate::estimator::{Estimator, InputMode};

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ControlEngineBuilder<E, A> {
    estimator: E,
    actuator: Option<Arc<ActuatorController>>,
    buffer: Option<Arc<SpectrumBuffer>>,
    bus: Option<Arc<EventBus<AcquisitionEvent>>>,
    cfg: Option<EngineCfg>,
    _a: PhantomData<A>,
}

impl<E: Estimator> ControlEngine<E> {
    /// Start building an engine around `estimator`.
    pub fn builder(estimator: E) -> ControlEngineBuilder<E, Missing> {
        ControlEngineBuilder {
            estimator,
            actuator: None,
            buffer: None,
            bus: None,
            cfg: None,
            _a: PhantomData,
        }
    }
}

fn validate(cfg: &EngineCfg) -> Result<()> {
    if cfg.poll_interval.is_zero() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "poll_interval must be >= 1 ms",
        )));
    }
    if cfg.pending_wait < cfg.poll_interval {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "pending_wait must be >= poll_interval",
        )));
    }
    Ok(())
}

impl<E: Estimator, A> ControlEngineBuilder<E, A> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<ControlEngine<E>> {
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        if self.estimator.input_mode() == InputMode::Spectrum {
            if self.buffer.is_none() {
                return Err(eyre::Report::new(BuildError::MissingBuffer));
            }
            if self.bus.is_none() {
                return Err(eyre::Report::new(BuildError::MissingBus));
            }
        }
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg)?;
        Ok(ControlEngine::from_parts(
            self.estimator,
            actuator,
            self.buffer,
            self.bus,
            cfg,
        ))
    }

    /// Where spectra come from; required for spectrum-driven estimators.
    pub fn with_buffer(mut self, buffer: Arc<SpectrumBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn with_bus(mut self, bus: Arc<EventBus<AcquisitionEvent>>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn with_cfg(mut self, cfg: EngineCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }
}

impl<E: Estimator> ControlEngineBuilder<E, Missing> {
    pub fn with_actuator(self, actuator: Arc<ActuatorController>) -> ControlEngineBuilder<E, Set> {
        ControlEngineBuilder {
            estimator: self.estimator,
            actuator: Some(actuator),
            buffer: self.buffer,
            bus: self.bus,
            cfg: self.cfg,
            _a: PhantomData,
        }
    }
}

impl<E: Estimator> ControlEngineBuilder<E, Set> {
    /// Validate and build. Only available once the actuator is set.
    pub fn build(self) -> Result<ControlEngine<E>> {
        self.try_build()
    }
}
