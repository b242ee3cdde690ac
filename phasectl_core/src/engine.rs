//! Actuator-gated production loop shared by every estimator.
//!
//! Per cycle the worker waits for a fresh spectrum, holds it while the
//! actuator is busy (replacing it with anything newer), steps the estimator
//! and dispatches the correction. Free-running estimators skip the spectrum
//! wait and only gate on actuator idle.
//!
//! Every wait is bounded by `EngineCfg::poll_interval` or
//! `EngineCfg::pending_wait`; `stop()` also wakes the worker directly.

use crossbeam_channel as xch;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::actuator::ActuatorController;
use crate::buffer::SpectrumBuffer;
use crate::bus::{AcquisitionEvent, EventBus, Subscription};
use crate::config::EngineCfg;
use crate::error::{CoreError, Result};
use crate::estimator::{Estimator, InputMode, ResetPolicy, StepReport};
use crate::lifecycle::{CancelToken, EngineState, Lifecycle, StateObserver};
use crate::spectrum::Spectrum;

pub type ResultCallback = Arc<dyn Fn(&StepReport) + Send + Sync>;

/// Single-slot mailbox: newer spectra overwrite unread ones.
struct Mailbox {
    slot: Mutex<Option<Spectrum>>,
    signal_tx: xch::Sender<()>,
    signal_rx: xch::Receiver<()>,
}

impl Mailbox {
    fn new() -> Self {
        let (signal_tx, signal_rx) = xch::bounded(1);
        Self {
            slot: Mutex::new(None),
            signal_tx,
            signal_rx,
        }
    }

    fn put(&self, spectrum: Spectrum) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(spectrum);
        }
        self.kick();
    }

    fn kick(&self) {
        let _ = self.signal_tx.try_send(());
    }

    fn take(&self) -> Option<Spectrum> {
        self.slot.lock().ok().and_then(|mut s| s.take())
    }

    /// True if signalled before `timeout`.
    fn wait(&self, timeout: Duration) -> bool {
        self.signal_rx.recv_timeout(timeout).is_ok()
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        while self.signal_rx.try_recv().is_ok() {}
    }
}

struct Shared<E> {
    name: &'static str,
    estimator: Mutex<E>,
    actuator: Arc<ActuatorController>,
    buffer: Option<Arc<SpectrumBuffer>>,
    bus: Option<Arc<EventBus<AcquisitionEvent>>>,
    cfg: EngineCfg,
    input_mode: InputMode,
    reset_policy: ResetPolicy,
    mailbox: Mailbox,
    lifecycle: Lifecycle,
    on_result: Mutex<Option<ResultCallback>>,
    subscription: Mutex<Option<Subscription<AcquisitionEvent>>>,
    steps: AtomicU64,
}

impl<E: Estimator> Shared<E> {
    fn estimator(&self) -> MutexGuard<'_, E> {
        self.estimator.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn unsubscribe(&self) {
        let sub = self.subscription.lock().ok().and_then(|mut s| s.take());
        drop(sub);
    }

    /// Stream infrastructure failure: the run ends here.
    fn fail(&self, reason: String) {
        let token = self.lifecycle.token();
        if token.is_cancelled() {
            return;
        }
        tracing::error!(estimator = self.name(), %reason, "engine stopped on stream failure");
        self.unsubscribe();
        token.cancel();
        self.mailbox.clear();
        self.mailbox.kick();
        if let Err(e) = self.lifecycle.transition(EngineState::Stopped, Some(reason)) {
            tracing::warn!(error = %e, "failed to record stop");
        }
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn on_event(&self, event: &AcquisitionEvent) {
        if self.lifecycle.token().is_cancelled() {
            return;
        }
        match event {
            AcquisitionEvent::SpectrumArrived { .. } => {
                let Some(buffer) = &self.buffer else {
                    return;
                };
                match buffer.get_latest() {
                    Ok(Some(spectrum)) => self.mailbox.put(spectrum),
                    Ok(None) => {}
                    Err(e) => self.fail(e.to_string()),
                }
            }
            AcquisitionEvent::Error(msg) => self.fail(format!("acquisition error: {msg}")),
            AcquisitionEvent::Closed => self.fail("acquisition stream closed".to_string()),
        }
    }

    /// Returns whether a stage move was requested.
    fn run_step(&self, input: Option<&Spectrum>) -> bool {
        let mut est = self.estimator();
        match est.step(input) {
            Ok(Some(outcome)) => {
                let mut moved = false;
                if let Some(c) = outcome.correction
                    && !c.is_zero()
                {
                    self.actuator.request_rotation(c);
                    moved = true;
                }
                drop(est);
                self.steps.fetch_add(1, Ordering::Relaxed);
                let cb = self.on_result.lock().ok().and_then(|c| c.clone());
                if let Some(cb) = cb {
                    cb(&outcome.report);
                }
                moved
            }
            Ok(None) => false,
            Err(e) if e.is_fatal() => {
                drop(est);
                self.fail(e.to_string());
                false
            }
            Err(e) => {
                tracing::warn!(estimator = est.name(), error = %e, "step failed");
                false
            }
        }
    }

    /// Wait until the actuator is idle. Returns `false` on cancellation.
    fn wait_actuator_idle(&self, token: &CancelToken, held: &mut Option<Spectrum>) -> bool {
        while self.actuator.is_busy() {
            if token.is_cancelled() {
                return false;
            }
            match self.input_mode {
                InputMode::Spectrum => {
                    if self.mailbox.wait(self.cfg.poll_interval)
                        && let Some(newer) = self.mailbox.take()
                    {
                        *held = Some(newer);
                    }
                }
                InputMode::FreeRunning => std::thread::sleep(self.cfg.poll_interval),
            }
        }
        !token.is_cancelled()
    }

    fn drain_and_rearm(&self, token: &CancelToken) {
        let mut none = None;
        if !self.wait_actuator_idle(token, &mut none) {
            return;
        }
        self.estimator().rearm(&self.actuator);
        self.unsubscribe();
        token.cancel();
        self.mailbox.clear();
        if let Err(e) = self.lifecycle.transition(EngineState::Stopped, None) {
            tracing::warn!(error = %e, "failed to record stop");
        }
        tracing::debug!(estimator = self.name(), "drained and re-armed");
    }

    fn run(&self, token: CancelToken) {
        tracing::debug!(estimator = self.name(), "engine worker started");
        loop {
            if token.is_cancelled() {
                break;
            }

            let requested = self.estimator().take_reset_request();
            if requested {
                match self.reset_policy {
                    ResetPolicy::InPlace => self.estimator().reset(),
                    ResetPolicy::DrainThenRearm => {
                        let _ = self
                            .lifecycle
                            .transition(EngineState::StoppingGraceful, None);
                    }
                }
            }
            if self.lifecycle.state() == EngineState::StoppingGraceful {
                self.drain_and_rearm(&token);
                break;
            }

            let mut held = match self.input_mode {
                InputMode::Spectrum => {
                    if !self.mailbox.wait(self.cfg.pending_wait) {
                        continue;
                    }
                    match self.mailbox.take() {
                        Some(s) => Some(s),
                        None => continue,
                    }
                }
                InputMode::FreeRunning => None,
            };

            if !self.wait_actuator_idle(&token, &mut held) {
                break;
            }
            if self.lifecycle.state() != EngineState::Running {
                continue;
            }
            let moved = self.run_step(held.as_ref());
            // Without a move there is no busy actuator to pace a free-running loop.
            if !moved && self.input_mode == InputMode::FreeRunning {
                std::thread::sleep(self.cfg.poll_interval);
            }
        }
        tracing::debug!(estimator = self.name(), "engine worker exiting");
    }
}

/// Generic control engine. Construct through [`ControlEngine::builder`].
pub struct ControlEngine<E> {
    shared: Arc<Shared<E>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Estimator> ControlEngine<E> {
    pub(crate) fn from_parts(
        estimator: E,
        actuator: Arc<ActuatorController>,
        buffer: Option<Arc<SpectrumBuffer>>,
        bus: Option<Arc<EventBus<AcquisitionEvent>>>,
        cfg: EngineCfg,
    ) -> Self {
        let input_mode = estimator.input_mode();
        let reset_policy = estimator.reset_policy();
        Self {
            shared: Arc::new(Shared {
                name: estimator.name(),
                estimator: Mutex::new(estimator),
                actuator,
                buffer,
                bus,
                cfg,
                input_mode,
                reset_policy,
                mailbox: Mailbox::new(),
                lifecycle: Lifecycle::new(),
                on_result: Mutex::new(None),
                subscription: Mutex::new(None),
                steps: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// No-op when not stopped.
    pub fn start(&self) -> Result<()> {
        if self.shared.lifecycle.state() != EngineState::Stopped {
            return Ok(());
        }
        let bus = match self.shared.input_mode {
            InputMode::Spectrum => Some(self.shared.bus.as_ref().ok_or_else(|| {
                eyre::Report::new(CoreError::State("no acquisition bus".into()))
            })?),
            InputMode::FreeRunning => None,
        };
        self.join_worker();
        let token = self.shared.lifecycle.begin_run()?;
        self.shared.mailbox.clear();

        if let Some(bus) = bus {
            let weak: Weak<Shared<E>> = Arc::downgrade(&self.shared);
            let sub = bus.subscribe(move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_event(event);
                }
            });
            if let Ok(mut slot) = self.shared.subscription.lock() {
                *slot = Some(sub);
            }
        }

        {
            let mut est = self.shared.estimator();
            let _ = est.take_reset_request();
            est.on_start(&self.shared.actuator);
        }

        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name(format!("engine-{}", self.shared.name()))
            .spawn(move || shared.run(token))?;
        if let Ok(mut w) = self.worker.lock() {
            *w = Some(handle);
        }
        tracing::info!(estimator = self.shared.name(), "engine started");
        Ok(())
    }

    /// Stop the loop. In-flight actuator commands are not awaited.
    pub fn stop(&self) {
        self.shared.unsubscribe();
        self.shared.lifecycle.token().cancel();
        self.shared.mailbox.kick();
        self.join_worker();
        self.shared.mailbox.clear();
        match self.shared.lifecycle.transition(EngineState::Stopped, None) {
            Ok(true) => tracing::info!(estimator = self.shared.name(), "engine stopped"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "failed to record stop"),
        }
    }

    /// Apply the estimator's reset policy.
    pub fn reset(&self) {
        match self.shared.reset_policy {
            ResetPolicy::InPlace => self.shared.estimator().reset(),
            ResetPolicy::DrainThenRearm => {
                let running = self
                    .shared
                    .lifecycle
                    .transition(EngineState::StoppingGraceful, None)
                    .unwrap_or(false);
                if running {
                    self.shared.mailbox.kick();
                } else if self.shared.lifecycle.state() == EngineState::Stopped {
                    self.shared.estimator().rearm(&self.shared.actuator);
                }
            }
        }
    }

    /// Run `f` under the lock the worker holds while stepping.
    pub fn configure<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.shared.estimator())
    }

    pub fn set_on_result(&self, callback: impl Fn(&StepReport) + Send + Sync + 'static) {
        if let Ok(mut cb) = self.shared.on_result.lock() {
            *cb = Some(Arc::new(callback));
        }
    }

    pub fn set_on_state(&self, observer: impl Fn(&crate::lifecycle::StateChange) + Send + Sync + 'static) {
        let observer: StateObserver = Arc::new(observer);
        self.shared.lifecycle.set_observer(Some(observer));
    }

    pub fn state(&self) -> EngineState {
        self.shared.lifecycle.state()
    }

    /// Reason the last run was forced to stop.
    pub fn stop_reason(&self) -> Option<String> {
        self.shared.lifecycle.last_reason()
    }

    /// Steps that produced a report.
    pub fn steps_completed(&self) -> u64 {
        self.shared.steps.load(Ordering::Relaxed)
    }

    pub fn actuator(&self) -> &ActuatorController {
        &self.shared.actuator
    }

    pub fn cfg(&self) -> &EngineCfg {
        &self.shared.cfg
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            // Stop requested from the worker itself; it exits on the token.
            return;
        }
        if let Err(e) = handle.join() {
            tracing::warn!(?e, "engine worker panicked");
        }
    }
}

impl<E> Drop for ControlEngine<E> {
    fn drop(&mut self) {
        if let Ok(mut sub) = self.shared.subscription.lock() {
            sub.take();
        }
        self.shared.lifecycle.token().cancel();
        self.shared.mailbox.kick();
        let handle = self.worker.get_mut().ok().and_then(|w| w.take());
        if let Some(handle) = handle
            && handle.thread().id() != std::thread::current().id()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "engine worker panicked during shutdown");
        }
    }
}
