//! Device drivers and simulators behind the `phasectl_traits` seams.
//!
//! - [`sim`]: in-memory rotation stage and spectrometer.
//! - [`stream`]: JSON-lines client for the external acquisition process.
//! - [`ell14`]: Elliptec ELL14 rotation mount protocol. The serial transport
//!   is only compiled with the `hardware` feature.
pub mod ell14;
pub mod error;
pub mod sim;
pub mod stream;
pub mod util;

pub use ell14::Ell14;
pub use error::HwError;
pub use sim::{SimulatedSpectrometer, SimulatedStage, StageCall, StageHandle};
pub use stream::JsonLineSource;
