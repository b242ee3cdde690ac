//! Maps `Box<dyn Error>` from trait boundaries to typed `CoreError`.
//!
//! The traits in `phasectl_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `phasectl_hardware::HwError` downcasting.

use crate::error::CoreError;

/// Map a trait-boundary error to a typed `CoreError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> CoreError {
    #[cfg(feature = "hardware-errors")]
    {
        use phasectl_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => CoreError::Timeout,
                HwError::Device(code) => {
                    CoreError::HardwareFault(format!("device error code {code}"))
                }
                other => CoreError::Hardware(other.to_string()),
            };
        }
    }

    if let Some(core) = e.downcast_ref::<CoreError>() {
        return core.clone();
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        CoreError::Timeout
    } else {
        CoreError::Hardware(s)
    }
}
