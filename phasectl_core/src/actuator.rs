//! Serialized, single-flight command channel to the rotation stage.
//!
//! One worker thread owns the [`Actuator`]. Requests land in per-key slots:
//! a new request replaces any not-yet-started request with the same key, and
//! the worker always executes the oldest surviving slot next.
//!
//! Busy tracking uses a generation counter. Each accepted request bumps it
//! and remembers its own value; on completion the worker clears `busy` only
//! if no newer request has been accepted in the meantime.
use crossbeam_channel as xch;
use phasectl_traits::{Actuator, Clock, DeviceStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::angle::Angle;
use crate::config::ActuatorCfg;
use crate::error::CoreError;
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    Open,
    Close,
    Home,
    Rotate(Angle),
    SetSpeed(u8),
    Restart,
}

impl ActuatorCommand {
    pub fn key(&self) -> CommandKey {
        match self {
            ActuatorCommand::Open => CommandKey::Open,
            ActuatorCommand::Close => CommandKey::Close,
            ActuatorCommand::Home => CommandKey::Home,
            ActuatorCommand::Rotate(_) => CommandKey::Rotate,
            ActuatorCommand::SetSpeed(_) => CommandKey::SetSpeed,
            ActuatorCommand::Restart => CommandKey::Restart,
        }
    }
}

/// Logical single-flight channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKey {
    Open,
    Close,
    Home,
    Rotate,
    SetSpeed,
    Restart,
}

/// Health of the hardware link as last observed by the worker.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ControllerStatus {
    #[default]
    Ok,
    /// Talking to the device failed; the link was closed.
    CommFailure(String),
    /// The device answered with an error code.
    DeviceError(u8),
}

#[derive(Debug, Default)]
struct State {
    pending: HashMap<CommandKey, (u64, ActuatorCommand)>,
    generation: u64,
    busy: bool,
    status: ControllerStatus,
    executed: u64,
    superseded: u64,
    shutdown: bool,
}

#[derive(Debug)]
pub struct ActuatorController {
    state: Arc<Mutex<State>>,
    wake: xch::Sender<()>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // A panic while holding the lock leaves only plain counters behind.
    state.lock().unwrap_or_else(|p| p.into_inner())
}

enum Failure {
    Comm(CoreError),
    Device(u8),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Failure {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Failure::Comm(map_hw_error(e.as_ref()))
    }
}

/// Worker-side view of the device.
struct Link<A, C> {
    device: A,
    open: bool,
    cfg: ActuatorCfg,
    clock: C,
}

impl<A: Actuator, C: Clock> Link<A, C> {
    fn ensure_open(&mut self) -> Result<(), Failure> {
        if !self.open {
            self.device.open()?;
            self.open = true;
            tracing::debug!("actuator link opened");
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            if let Err(e) = self.device.close() {
                tracing::debug!(error = %e, "actuator close failed");
            }
            self.open = false;
        }
    }

    fn settle(&mut self) -> Result<(), Failure> {
        let deadline = self.clock.now() + self.cfg.settle_timeout;
        loop {
            match self.device.status()? {
                DeviceStatus::Idle => return Ok(()),
                DeviceStatus::Error(code) => return Err(Failure::Device(code)),
                DeviceStatus::Moving => {
                    if self.clock.is_past(deadline) {
                        return Err(Failure::Comm(CoreError::Timeout));
                    }
                    self.clock.sleep(self.cfg.status_poll);
                }
            }
        }
    }

    fn execute(&mut self, cmd: ActuatorCommand) -> Result<(), Failure> {
        match cmd {
            ActuatorCommand::Open => {
                self.ensure_open()?;
                self.device.home()?;
                self.settle()
            }
            ActuatorCommand::Close => {
                self.close();
                Ok(())
            }
            ActuatorCommand::Restart => {
                self.close();
                self.ensure_open()
            }
            ActuatorCommand::Home => {
                self.ensure_open()?;
                self.device.home()?;
                self.settle()
            }
            ActuatorCommand::Rotate(angle) => {
                self.ensure_open()?;
                self.device.rotate(angle.degrees())?;
                self.settle()
            }
            ActuatorCommand::SetSpeed(percent) => {
                self.ensure_open()?;
                self.device.set_speed(percent)?;
                Ok(())
            }
        }
    }
}

impl ActuatorController {
    pub fn spawn<A, C>(actuator: A, cfg: ActuatorCfg, clock: C) -> Self
    where
        A: Actuator + Send + 'static,
        C: Clock + Send + 'static,
    {
        let (wake, wake_rx) = xch::bounded::<()>(1);
        let state = Arc::new(Mutex::new(State::default()));
        let worker_state = state.clone();
        let poll = cfg.status_poll.max(Duration::from_millis(1)) * 10;

        let join_handle = std::thread::spawn(move || {
            let mut link = Link {
                device: actuator,
                open: false,
                cfg,
                clock,
            };
            loop {
                let next = {
                    let mut st = lock(&worker_state);
                    if st.shutdown {
                        break;
                    }
                    let oldest = st
                        .pending
                        .iter()
                        .min_by_key(|(_, (generation, _))| *generation)
                        .map(|(key, _)| *key);
                    oldest.and_then(|k| st.pending.remove(&k))
                };
                let Some((generation, cmd)) = next else {
                    // Idle: wait for a request or re-check shutdown after a tick.
                    let _ = wake_rx.recv_timeout(poll);
                    continue;
                };

                tracing::trace!(?cmd, generation, "actuator command start");
                let outcome = link.execute(cmd);

                let mut st = lock(&worker_state);
                st.executed += 1;
                match outcome {
                    Ok(()) => {
                        st.status = ControllerStatus::Ok;
                    }
                    Err(Failure::Device(code)) => {
                        tracing::warn!(?cmd, code, "actuator reported device error");
                        st.status = ControllerStatus::DeviceError(code);
                    }
                    Err(Failure::Comm(e)) => {
                        tracing::warn!(?cmd, error = %e, "actuator communication failed");
                        st.status = ControllerStatus::CommFailure(e.to_string());
                        drop(st);
                        link.close();
                        st = lock(&worker_state);
                    }
                }
                if st.generation == generation {
                    st.busy = false;
                }
            }
            link.close();
            tracing::trace!("actuator worker exiting cleanly");
        });

        Self {
            state,
            wake,
            join_handle: Some(join_handle),
        }
    }

    fn submit(&self, cmd: ActuatorCommand) {
        {
            let mut st = lock(&self.state);
            if st.shutdown {
                return;
            }
            st.generation += 1;
            let generation = st.generation;
            st.busy = true;
            if let Some((old, _)) = st.pending.insert(cmd.key(), (generation, cmd)) {
                st.superseded += 1;
                tracing::trace!(?cmd, superseded = old, "replaced pending command");
            }
        }
        // Full means the worker already has a wake-up queued.
        let _ = self.wake.try_send(());
    }

    /// Relative move; the zero angle is ignored.
    pub fn request_rotation(&self, angle: Angle) {
        if angle.is_zero() || !angle.is_finite() {
            return;
        }
        self.submit(ActuatorCommand::Rotate(angle));
    }

    pub fn request_homing(&self) {
        self.submit(ActuatorCommand::Home);
    }

    pub fn request_set_speed(&self, percent: u8) {
        self.submit(ActuatorCommand::SetSpeed(percent.min(100)));
    }

    /// Drop the link and reconnect.
    pub fn request_restart(&self) {
        self.submit(ActuatorCommand::Restart);
    }

    /// Connect and home.
    pub fn request_open(&self) {
        self.submit(ActuatorCommand::Open);
    }

    pub fn request_close(&self) {
        self.submit(ActuatorCommand::Close);
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.state).busy
    }

    pub fn status(&self) -> ControllerStatus {
        lock(&self.state).status.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.state).generation
    }

    /// Commands that reached the worker, successful or not.
    pub fn commands_executed(&self) -> u64 {
        lock(&self.state).executed
    }

    /// Requests replaced before they started.
    pub fn commands_superseded(&self) -> u64 {
        lock(&self.state).superseded
    }

    /// Poll until idle; false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration, poll: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while self.is_busy() {
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(poll);
        }
        true
    }
}

impl Drop for ActuatorController {
    fn drop(&mut self) {
        {
            let mut st = lock(&self.state);
            st.shutdown = true;
            st.pending.clear();
        }
        let _ = self.wake.try_send(());
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("actuator worker joined"),
                Err(e) => tracing::warn!(?e, "actuator worker panicked during shutdown"),
            }
        }
    }
}
