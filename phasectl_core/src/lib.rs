#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Actuator-gated spectral control (hardware-agnostic).
//!
//! All hardware goes through `phasectl_traits::Actuator` and
//! `phasectl_traits::SpectrumSource`.
//!
//! ## Architecture
//!
//! - **Acquisition**: one thread owns the source and fills a single-slot
//!   [`SpectrumBuffer`], announcing each frame on an [`EventBus`].
//! - **Actuator**: one thread owns the stage; [`ActuatorController`] keeps one
//!   pending request per command kind and tracks busy by generation.
//! - **Engine**: [`ControlEngine`] waits for a fresh spectrum, gates on actuator
//!   idle, steps an [`Estimator`] and dispatches its correction.
//! - **Estimators**: [`PhaseStabilizer`] (fit-based phase lock),
//!   [`EnvelopeSignalGenerator`] (hill-climb), [`Alternator`] (sweep).

pub mod acquisition;
pub mod actuator;
pub mod alternator;
pub mod angle;
pub mod buffer;
pub mod builder;
pub mod bus;
pub mod config;
pub mod conversions;
pub mod corrector;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod estimator;
pub mod fit;
pub mod hw_error;
pub mod lifecycle;
pub mod mocks;
pub mod spectrum;
pub mod stabilizer;
pub mod tracker;

pub use acquisition::Acquisition;
pub use actuator::{ActuatorCommand, ActuatorController, CommandKey, ControllerStatus};
pub use alternator::Alternator;
pub use angle::{Angle, AngleUnit};
pub use buffer::SpectrumBuffer;
pub use builder::ControlEngineBuilder;
pub use bus::{AcquisitionEvent, EventBus, Subscription};
pub use config::{ActuatorCfg, AlternatorCfg, EngineCfg, EnvelopeCfg, EnvelopeMode, StabilizationCfg};
pub use corrector::PhaseCorrector;
pub use engine::ControlEngine;
pub use envelope::EnvelopeSignalGenerator;
pub use error::{BuildError, CoreError, Report, Result};
pub use estimator::{Curve, Estimator, InputMode, ResetPolicy, StepOutcome, StepReport};
pub use fit::{FitError, FitModel, FitParameters, FitScope, InterferenceModel};
pub use lifecycle::{CancelToken, EngineState, StateChange};
pub use spectrum::{Spectrum, SpectrumError, WavelengthRange};
pub use stabilizer::PhaseStabilizer;
pub use tracker::{PhaseTracker, TrackerState, TrackerUpdate};
