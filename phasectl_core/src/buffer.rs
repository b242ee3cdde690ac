//! Single-slot latch between the acquisition worker and the engines.
//!
//! `update` overwrites, `get_latest` takes. The lock covers only the swap;
//! conversion to a [`Spectrum`] happens after it is released.

use std::sync::{Arc, Mutex};

use phasectl_traits::{StreamFrame, StreamMeta};

use crate::error::CoreError;
use crate::spectrum::Spectrum;

#[derive(Debug)]
pub struct SpectrumBuffer {
    slot: Mutex<Option<StreamFrame>>,
    axis: Mutex<Option<Arc<[f64]>>>,
    axis_override: Option<Arc<[f64]>>,
    normalize: bool,
}

impl Default for SpectrumBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumBuffer {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            axis: Mutex::new(None),
            axis_override: None,
            normalize: true,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Wavelength axis that takes precedence over the one in the stream meta.
    pub fn with_axis(mut self, axis: Vec<f64>) -> Self {
        self.axis_override = Some(axis.into());
        self
    }

    /// Install the wavelength axis announced by the stream.
    pub fn set_meta(&self, meta: &StreamMeta) -> Result<(), CoreError> {
        let axis: Arc<[f64]> = match (&self.axis_override, &meta.wavelengths) {
            (Some(a), _) => a.clone(),
            (None, Some(w)) => w.as_slice().into(),
            (None, None) => {
                return Err(CoreError::Stream(
                    "stream meta has no wavelength axis and none is configured".into(),
                ));
            }
        };
        if axis.len() != meta.num_pixels {
            return Err(CoreError::Stream(format!(
                "wavelength axis has {} points, device reports {} pixels",
                axis.len(),
                meta.num_pixels
            )));
        }
        *self.axis.lock().map_err(|_| poisoned())? = Some(axis);
        Ok(())
    }

    pub fn update(&self, frame: StreamFrame) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.is_some() {
                tracing::trace!("overwriting unread frame");
            }
            *slot = Some(frame);
        }
    }

    /// Take the newest frame as a spectrum; `Ok(None)` if nothing arrived
    /// since the last call.
    pub fn get_latest(&self) -> Result<Option<Spectrum>, CoreError> {
        let Some(frame) = self.slot.lock().map_err(|_| poisoned())?.take() else {
            return Ok(None);
        };
        let axis = self
            .axis
            .lock()
            .map_err(|_| poisoned())?
            .clone()
            .ok_or_else(|| CoreError::Stream("frame arrived before stream meta".into()))?;
        if axis.len() != frame.counts.len() {
            return Err(CoreError::Stream(format!(
                "frame has {} counts, axis has {} points",
                frame.counts.len(),
                axis.len()
            )));
        }
        let spectrum = Spectrum::from_raw(&axis, &frame.counts, self.normalize)?;
        Ok(Some(spectrum))
    }

    /// True when an unread frame is waiting.
    pub fn has_pending(&self) -> bool {
        self.slot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

fn poisoned() -> CoreError {
    CoreError::State("spectrum buffer lock poisoned".into())
}
