//! Engine state machine and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CoreError;

/// Cooperative stop flag shared between a controller and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    /// Finishing the in-flight actuator command before stopping.
    StoppingGraceful,
}

impl EngineState {
    pub fn can_transition_to(self, to: EngineState) -> bool {
        matches!(
            (self, to),
            (EngineState::Stopped, EngineState::Running)
                | (EngineState::Running, EngineState::StoppingGraceful)
                | (_, EngineState::Stopped)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub state: EngineState,
    /// Set when the transition was forced by a failure.
    pub reason: Option<String>,
}

pub type StateObserver = Arc<dyn Fn(&StateChange) + Send + Sync>;

#[derive(Debug, Default)]
struct Inner {
    state: EngineState,
    token: CancelToken,
    last_reason: Option<String>,
}

#[derive(Default)]
pub struct Lifecycle {
    inner: Mutex<Inner>,
    observer: Mutex<Option<StateObserver>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_observer(&self, observer: Option<StateObserver>) {
        if let Ok(mut o) = self.observer.lock() {
            *o = observer;
        }
    }

    pub fn state(&self) -> EngineState {
        self.lock().state
    }

    /// Reason of the last forced stop, if any.
    pub fn last_reason(&self) -> Option<String> {
        self.lock().last_reason.clone()
    }

    /// Token of the current (or last) run.
    pub fn token(&self) -> CancelToken {
        self.lock().token.clone()
    }

    /// Enter `Running` with a fresh token.
    pub fn begin_run(&self) -> Result<CancelToken, CoreError> {
        let token = {
            let mut inner = self.lock();
            if !inner.state.can_transition_to(EngineState::Running) {
                return Err(CoreError::State(format!(
                    "cannot start from {:?}",
                    inner.state
                )));
            }
            inner.state = EngineState::Running;
            inner.token = CancelToken::new();
            inner.last_reason = None;
            inner.token.clone()
        };
        self.notify(StateChange {
            state: EngineState::Running,
            reason: None,
        });
        Ok(token)
    }

    /// Returns `Ok(false)` when already in `to`.
    pub fn transition(&self, to: EngineState, reason: Option<String>) -> Result<bool, CoreError> {
        {
            let mut inner = self.lock();
            let from = inner.state;
            if from == to {
                return Ok(false);
            }
            if !from.can_transition_to(to) {
                return Err(CoreError::State(format!("{from:?} -> {to:?}")));
            }
            inner.state = to;
            if reason.is_some() {
                inner.last_reason.clone_from(&reason);
            }
            tracing::debug!(?from, ?to, reason = reason.as_deref(), "engine state change");
        }
        self.notify(StateChange { state: to, reason });
        Ok(true)
    }

    fn notify(&self, change: StateChange) {
        let observer = self.observer.lock().ok().and_then(|o| o.clone());
        if let Some(cb) = observer {
            cb(&change);
        }
    }
}
