//! Simulated rotation stage and spectrometer for bench-free runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use phasectl_traits::{
    Actuator, BoxError, DeviceStatus, Interrupt, SpectrumSource, StreamFrame, StreamMeta,
};

use crate::error::HwError;

/// One call observed by the simulated stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageCall {
    Open,
    Close,
    Home,
    Rotate(f64),
    SetSpeed(u8),
}

#[derive(Debug, Default)]
struct StageState {
    open: bool,
    position_deg: f64,
    speed_percent: u8,
    moving_until: Option<Instant>,
    fail_next: u32,
    calls: Vec<StageCall>,
}

/// Shared view onto a [`SimulatedStage`], usable after the stage moved into a
/// worker thread.
#[derive(Debug, Clone, Default)]
pub struct StageHandle(Arc<Mutex<StageState>>);

impl StageHandle {
    fn lock(&self) -> MutexGuard<'_, StageState> {
        // Poisoning only happens when a test thread panicked mid-call.
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn position_deg(&self) -> f64 {
        self.lock().position_deg
    }

    pub fn speed_percent(&self) -> u8 {
        self.lock().speed_percent
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Every successful call, in order.
    pub fn calls(&self) -> Vec<StageCall> {
        self.lock().calls.clone()
    }

    pub fn rotations(&self) -> Vec<f64> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                StageCall::Rotate(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    /// Make the next `n` calls (status polls included) fail.
    pub fn fail_next(&self, n: u32) {
        self.lock().fail_next = n;
    }
}

/// In-memory rotation stage. Each motion keeps the stage `Moving` for
/// `motion_time`.
#[derive(Debug, Default)]
pub struct SimulatedStage {
    handle: StageHandle,
    motion_time: Duration,
}

impl SimulatedStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_motion_time(mut self, d: Duration) -> Self {
        self.motion_time = d;
        self
    }

    pub fn handle(&self) -> StageHandle {
        self.handle.clone()
    }

    fn call(&mut self, call: Option<StageCall>) -> Result<MutexGuard<'_, StageState>, BoxError> {
        let mut st = self.handle.lock();
        if st.fail_next > 0 {
            st.fail_next -= 1;
            return Err(Box::new(HwError::Injected("stage link dropped".into())));
        }
        let needs_open = !matches!(call, Some(StageCall::Open) | Some(StageCall::Close));
        if needs_open && !st.open {
            return Err(Box::new(HwError::NotOpen));
        }
        if let Some(c) = call {
            st.calls.push(c);
        }
        Ok(st)
    }
}

impl Actuator for SimulatedStage {
    fn open(&mut self) -> Result<(), BoxError> {
        self.call(Some(StageCall::Open))?.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        let mut st = self.call(Some(StageCall::Close))?;
        st.open = false;
        st.moving_until = None;
        Ok(())
    }

    fn home(&mut self) -> Result<(), BoxError> {
        let motion = self.motion_time;
        let mut st = self.call(Some(StageCall::Home))?;
        st.position_deg = 0.0;
        st.moving_until = Some(Instant::now() + motion);
        Ok(())
    }

    fn rotate(&mut self, degrees: f64) -> Result<(), BoxError> {
        let motion = self.motion_time;
        let mut st = self.call(Some(StageCall::Rotate(degrees)))?;
        st.position_deg += degrees;
        st.moving_until = Some(Instant::now() + motion);
        Ok(())
    }

    fn set_speed(&mut self, percent: u8) -> Result<(), BoxError> {
        self.call(Some(StageCall::SetSpeed(percent)))?.speed_percent = percent;
        Ok(())
    }

    fn status(&mut self) -> Result<DeviceStatus, BoxError> {
        let st = self.call(None)?;
        Ok(match st.moving_until {
            Some(t) if Instant::now() < t => DeviceStatus::Moving,
            _ => DeviceStatus::Idle,
        })
    }
}

type Generator = Box<dyn FnMut(&[f64]) -> Vec<f64> + Send>;

/// Frame source producing `generator(wavelengths)` at a fixed rate.
pub struct SimulatedSpectrometer {
    wavelengths: Vec<f64>,
    period: Duration,
    generator: Generator,
    stopped: Arc<AtomicBool>,
    remaining: Option<usize>,
}

impl SimulatedSpectrometer {
    pub fn new(
        wavelengths: Vec<f64>,
        rate_hz: u32,
        generator: impl FnMut(&[f64]) -> Vec<f64> + Send + 'static,
    ) -> Self {
        Self {
            wavelengths,
            period: Duration::from_micros(1_000_000 / u64::from(rate_hz.max(1))),
            generator: Box::new(generator),
            stopped: Arc::new(AtomicBool::new(false)),
            remaining: None,
        }
    }

    /// End the stream after `n` frames.
    pub fn with_frame_limit(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    /// Evenly spaced axis of `n` points over `[min_nm, max_nm]`.
    pub fn linear_axis(min_nm: f64, max_nm: f64, n: usize) -> Vec<f64> {
        if n < 2 {
            return vec![min_nm; n];
        }
        let step = (max_nm - min_nm) / (n - 1) as f64;
        (0..n).map(|i| min_nm + step * i as f64).collect()
    }
}

impl SpectrumSource for SimulatedSpectrometer {
    fn start(&mut self) -> Result<StreamMeta, BoxError> {
        self.stopped.store(false, Ordering::Release);
        Ok(StreamMeta {
            device_index: 0,
            num_pixels: self.wavelengths.len(),
            wavelengths: Some(self.wavelengths.clone()),
        })
    }

    fn next_frame(&mut self) -> Result<Option<StreamFrame>, BoxError> {
        if self.remaining == Some(0) {
            return Ok(None);
        }
        // Sleep in short slices so an interrupt is observed quickly.
        let deadline = Instant::now() + self.period;
        while Instant::now() < deadline {
            if self.stopped.load(Ordering::Acquire) {
                return Ok(None);
            }
            std::thread::sleep(Duration::from_millis(2).min(self.period));
        }
        if self.stopped.load(Ordering::Acquire) {
            return Ok(None);
        }
        if let Some(n) = self.remaining.as_mut() {
            *n -= 1;
        }
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Ok(Some(StreamFrame {
            timestamp,
            device_index: 0,
            counts: (self.generator)(&self.wavelengths),
        }))
    }

    fn stop(&mut self) -> Result<(), BoxError> {
        self.stopped.store(true, Ordering::Release);
        Ok(())
    }

    fn interrupter(&self) -> Option<Interrupt> {
        let flag = self.stopped.clone();
        Some(Box::new(move || flag.store(true, Ordering::Release)))
    }
}
