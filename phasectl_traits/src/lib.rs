pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Motion state reported by a rotation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Idle,
    Moving,
    /// Vendor error code; 0 is never reported here.
    Error(u8),
}

/// Motorized rotation stage.
///
/// Calls may block for the duration of one device round-trip; the caller is
/// responsible for serializing access.
pub trait Actuator {
    fn open(&mut self) -> Result<(), BoxError>;
    fn close(&mut self) -> Result<(), BoxError>;
    fn home(&mut self) -> Result<(), BoxError>;
    /// Relative move in degrees; positive is the device's forward direction.
    fn rotate(&mut self, degrees: f64) -> Result<(), BoxError>;
    fn set_speed(&mut self, percent: u8) -> Result<(), BoxError>;
    fn status(&mut self) -> Result<DeviceStatus, BoxError>;
}

/// Stream header announcing the pixel layout of subsequent frames.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMeta {
    pub device_index: u32,
    pub num_pixels: usize,
    /// Wavelength per pixel in nm, when the device reports one.
    pub wavelengths: Option<Vec<f64>>,
}

/// One raw acquisition.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    /// Seconds since the epoch as stamped by the acquisition process.
    pub timestamp: f64,
    pub device_index: u32,
    pub counts: Vec<f64>,
}

/// Continuous spectrum producer.
pub trait SpectrumSource {
    /// Start acquisition and return the stream header.
    fn start(&mut self) -> Result<StreamMeta, BoxError>;
    /// Block until the next frame; `Ok(None)` marks the end of the stream.
    fn next_frame(&mut self) -> Result<Option<StreamFrame>, BoxError>;
    fn stop(&mut self) -> Result<(), BoxError>;

    /// Handle that unblocks a pending `next_frame` from another thread.
    ///
    /// After it fires, `next_frame` returns `Ok(None)` promptly.
    fn interrupter(&self) -> Option<Interrupt> {
        None
    }
}

pub type Interrupt = Box<dyn Fn() + Send + Sync>;
