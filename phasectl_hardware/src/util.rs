use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Poll `done` until it reports true or `timeout` expires.
///
/// Errors from `done` abort the wait immediately. Sleeps `poll_interval`
/// between probes.
pub fn poll_until(
    mut done: impl FnMut() -> Result<bool>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if done()? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
}
