use thiserror::Error;

use crate::fit::FitError;
use crate::spectrum::SpectrumError;

#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for actuator")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("stream failure: {0}")]
    Stream(String),
    #[error("fit failed: {0}")]
    Fit(#[from] FitError),
    #[error("invalid spectrum: {0}")]
    Spectrum(#[from] SpectrumError),
}

impl CoreError {
    /// True for failures that end an engine run rather than a single step.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Stream(_))
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing actuator controller")]
    MissingActuator,
    #[error("missing spectrum buffer")]
    MissingBuffer,
    #[error("missing acquisition bus")]
    MissingBus,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
