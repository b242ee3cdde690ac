//! Background acquisition worker.
//!
//! Spawns a thread that owns the `SpectrumSource`, stores every frame in the
//! shared `SpectrumBuffer`, announces it on the event bus, and tracks the
//! last-ok timestamp for stall detection.
//!
//! Each `Acquisition` spawns exactly one thread, which is shut down and
//! joined when the `Acquisition` is dropped.
use phasectl_traits::{Clock, Interrupt, SpectrumSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::buffer::SpectrumBuffer;
use crate::bus::{AcquisitionEvent, EventBus};

pub struct Acquisition {
    last_ok: Arc<AtomicU64>,
    frames: Arc<AtomicU64>,
    epoch: Instant,
    clock: Box<dyn Clock + Send + Sync>,
    shutdown: Arc<AtomicBool>,
    interrupt: Option<Interrupt>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl Acquisition {
    pub fn spawn<S, C>(
        mut source: S,
        buffer: Arc<SpectrumBuffer>,
        bus: Arc<EventBus<AcquisitionEvent>>,
        clock: C,
    ) -> Self
    where
        S: SpectrumSource + Send + 'static,
        C: Clock + Clone + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let last_ok = Arc::new(AtomicU64::new(0));
        let last_ok_clone = last_ok.clone();
        let frames = Arc::new(AtomicU64::new(0));
        let frames_clone = frames.clone();
        let epoch = clock.now();
        let interrupt = source.interrupter();
        let worker_clock = clock.clone();

        let join_handle = std::thread::spawn(move || {
            let clock = worker_clock;
            match source.start() {
                Ok(meta) => {
                    tracing::debug!(
                        device = meta.device_index,
                        pixels = meta.num_pixels,
                        "acquisition started"
                    );
                    if let Err(e) = buffer.set_meta(&meta) {
                        bus.publish(&AcquisitionEvent::Error(e.to_string()));
                        shutdown_clone.store(true, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    if !shutdown_clone.load(Ordering::Relaxed) {
                        bus.publish(&AcquisitionEvent::Error(format!("start failed: {e}")));
                    }
                    shutdown_clone.store(true, Ordering::Relaxed);
                }
            }

            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("acquisition thread received shutdown signal");
                    break;
                }

                match source.next_frame() {
                    Ok(Some(frame)) => {
                        let timestamp = frame.timestamp;
                        buffer.update(frame);
                        last_ok_clone.store(clock.ms_since(epoch), Ordering::Relaxed);
                        frames_clone.fetch_add(1, Ordering::Relaxed);
                        bus.publish(&AcquisitionEvent::SpectrumArrived { timestamp });
                    }
                    Ok(None) => {
                        if !shutdown_clone.load(Ordering::Relaxed) {
                            tracing::debug!("acquisition stream ended");
                            bus.publish(&AcquisitionEvent::Closed);
                        }
                        break;
                    }
                    Err(e) => {
                        if !shutdown_clone.load(Ordering::Relaxed) {
                            tracing::warn!(error = %e, "acquisition source failed");
                            bus.publish(&AcquisitionEvent::Error(e.to_string()));
                        }
                        break;
                    }
                }
            }

            if let Err(e) = source.stop() {
                tracing::debug!(error = %e, "acquisition source stop failed");
            }
            tracing::trace!("acquisition thread exiting cleanly");
        });

        Self {
            last_ok,
            frames,
            epoch,
            clock: Box::new(clock),
            shutdown,
            interrupt,
            join_handle: Some(join_handle),
        }
    }

    /// Frames delivered so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn stalled_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_ok.load(Ordering::Relaxed))
    }

    /// Milliseconds since the last frame, measured on this worker's clock.
    pub fn stalled_for_ms(&self) -> u64 {
        self.stalled_for(self.clock.ms_since(self.epoch))
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(std::thread::JoinHandle::is_finished)
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // Unblock a pending next_frame; sources without an interrupter
        // exit after their current read.
        if let Some(interrupt) = &self.interrupt {
            interrupt();
        }
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("acquisition thread joined"),
                Err(e) => tracing::warn!(?e, "acquisition thread panicked during shutdown"),
            }
        }
    }
}
