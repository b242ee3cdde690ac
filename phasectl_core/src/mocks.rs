//! Test and helper mocks for phasectl_core

use crossbeam_channel as xch;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use phasectl_traits::{
    Actuator, BoxError, DeviceStatus, Interrupt, SpectrumSource, StreamFrame, StreamMeta,
};

use crate::fit::{FitError, FitModel, FitParameters, FitScope};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCall {
    Open,
    Close,
    Home,
    Rotate(f64),
    SetSpeed(u8),
}

#[derive(Debug, Default)]
struct Recorded {
    calls: Vec<ActuatorCall>,
    fail_next: usize,
    device_error: Option<u8>,
    /// Motions allowed to finish while held.
    permits: usize,
}

/// Actuator that records every call. Motions report `Moving` while the
/// probe holds them.
pub struct RecordingActuator {
    shared: Arc<Mutex<Recorded>>,
    hold: Arc<AtomicBool>,
}

/// Test-side handle onto a [`RecordingActuator`].
#[derive(Clone)]
pub struct ActuatorProbe {
    shared: Arc<Mutex<Recorded>>,
    hold: Arc<AtomicBool>,
}

impl RecordingActuator {
    pub fn with_probe() -> (Self, ActuatorProbe) {
        let shared = Arc::new(Mutex::new(Recorded::default()));
        let hold = Arc::new(AtomicBool::new(false));
        (
            Self {
                shared: shared.clone(),
                hold: hold.clone(),
            },
            ActuatorProbe { shared, hold },
        )
    }

    fn record(&self, call: ActuatorCall) -> Result<(), BoxError> {
        let mut r = self
            .shared
            .lock()
            .map_err(|_| BoxError::from("recording actuator poisoned"))?;
        r.calls.push(call);
        if r.fail_next > 0 {
            r.fail_next -= 1;
            return Err(Box::new(std::io::Error::other("injected link failure")));
        }
        Ok(())
    }
}

impl Actuator for RecordingActuator {
    fn open(&mut self) -> Result<(), BoxError> {
        self.record(ActuatorCall::Open)
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.record(ActuatorCall::Close)
    }

    fn home(&mut self) -> Result<(), BoxError> {
        self.record(ActuatorCall::Home)
    }

    fn rotate(&mut self, degrees: f64) -> Result<(), BoxError> {
        self.record(ActuatorCall::Rotate(degrees))
    }

    fn set_speed(&mut self, percent: u8) -> Result<(), BoxError> {
        self.record(ActuatorCall::SetSpeed(percent))
    }

    fn status(&mut self) -> Result<DeviceStatus, BoxError> {
        let mut r = self
            .shared
            .lock()
            .map_err(|_| BoxError::from("recording actuator poisoned"))?;
        if let Some(code) = r.device_error.take() {
            return Ok(DeviceStatus::Error(code));
        }
        if !self.hold.load(Ordering::SeqCst) {
            return Ok(DeviceStatus::Idle);
        }
        if r.permits > 0 {
            r.permits -= 1;
            return Ok(DeviceStatus::Idle);
        }
        Ok(DeviceStatus::Moving)
    }
}

impl ActuatorProbe {
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.shared.lock().map(|r| r.calls.clone()).unwrap_or_default()
    }

    /// Degrees of every `rotate` call, in order.
    pub fn rotations(&self) -> Vec<f64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ActuatorCall::Rotate(d) => Some(d),
                _ => None,
            })
            .collect()
    }

    /// Keep motions in `Moving` until [`release`](Self::release).
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.hold.store(false, Ordering::SeqCst);
    }

    /// Let exactly one held motion settle; later ones stay `Moving`.
    pub fn release_one(&self) {
        if let Ok(mut r) = self.shared.lock() {
            r.permits += 1;
        }
    }

    pub fn fail_next(&self, n: usize) {
        if let Ok(mut r) = self.shared.lock() {
            r.fail_next = n;
        }
    }

    /// Report `code` on the next status poll.
    pub fn device_error(&self, code: u8) {
        if let Ok(mut r) = self.shared.lock() {
            r.device_error = Some(code);
        }
    }
}

/// Fit model that ignores the data and answers with fixed coefficients.
#[derive(Debug, Clone, Copy)]
pub struct FixedPhaseModel {
    pub phase: crate::angle::Angle,
    pub residual: f64,
}

impl FitModel for FixedPhaseModel {
    fn evaluate(&self, params: &FitParameters, x: &[f64]) -> Vec<f64> {
        vec![params.baseline; x.len()]
    }

    fn fit(
        &self,
        x: &[f64],
        y: &[f64],
        seed: &FitParameters,
        _scope: FitScope,
    ) -> Result<FitParameters, FitError> {
        if x.len() != y.len() {
            return Err(FitError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        Ok(FitParameters {
            phase: self.phase,
            residual: self.residual,
            ..*seed
        })
    }
}

enum Feed {
    Frame(StreamFrame),
    Fail(String),
    End,
}

/// Spectrum source fed frame by frame from a test through [`SourceFeed`].
pub struct ChannelSource {
    meta: StreamMeta,
    rx: xch::Receiver<Feed>,
    stopped: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct SourceFeed {
    tx: xch::Sender<Feed>,
    stopped: Arc<AtomicBool>,
}

impl ChannelSource {
    pub fn with_feed(wavelengths: Vec<f64>) -> (Self, SourceFeed) {
        let (tx, rx) = xch::unbounded();
        let stopped = Arc::new(AtomicBool::new(false));
        let meta = StreamMeta {
            device_index: 0,
            num_pixels: wavelengths.len(),
            wavelengths: Some(wavelengths),
        };
        (
            Self {
                meta,
                rx,
                stopped: stopped.clone(),
            },
            SourceFeed { tx, stopped },
        )
    }
}

impl SpectrumSource for ChannelSource {
    fn start(&mut self) -> Result<StreamMeta, BoxError> {
        Ok(self.meta.clone())
    }

    fn next_frame(&mut self) -> Result<Option<StreamFrame>, BoxError> {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(None);
            }
            match self.rx.recv_timeout(Duration::from_millis(5)) {
                Ok(Feed::Frame(f)) => return Ok(Some(f)),
                Ok(Feed::Fail(msg)) => return Err(msg.into()),
                Ok(Feed::End) | Err(xch::RecvTimeoutError::Disconnected) => return Ok(None),
                Err(xch::RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupt> {
        let stopped = self.stopped.clone();
        Some(Box::new(move || stopped.store(true, Ordering::SeqCst)))
    }
}

impl SourceFeed {
    pub fn frame(&self, counts: Vec<f64>) {
        let _ = self.tx.send(Feed::Frame(StreamFrame {
            timestamp: 0.0,
            device_index: 0,
            counts,
        }));
    }

    pub fn fail(&self, msg: &str) {
        let _ = self.tx.send(Feed::Fail(msg.to_string()));
    }

    pub fn end(&self) {
        let _ = self.tx.send(Feed::End);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}
