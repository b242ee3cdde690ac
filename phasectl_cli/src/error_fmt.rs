//! Human-readable error descriptions and structured JSON error formatting.

use phasectl_core::error::{BuildError, CoreError};
use phasectl_hardware::HwError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingActuator => {
                "What happened: No actuator controller was provided to the control engine.\nLikely causes: The rotation stage failed to initialize or was not wired into the builder.\nHow to fix: Check [actuator] in the config, or rerun with --simulate.".to_string()
            }
            BuildError::MissingBuffer | BuildError::MissingBus => {
                "What happened: The control engine has no spectrum input.\nLikely causes: The acquisition pipeline was not wired into the builder.\nHow to fix: This is a wiring bug; rerun with --log-level=debug and report it.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid engine configuration ({msg}).\nLikely causes: Out-of-range values in [engine].\nHow to fix: Edit poll_ms / pending_wait_ms in the config, then rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<CoreError>() {
        return match ce {
            CoreError::Stream(reason) => format!(
                "What happened: The spectrum stream failed ({reason}) and the control loop stopped.\nLikely causes: The acquisition process exited, the spectrometer was unplugged, or it sent malformed frames.\nHow to fix: Check [spectrometer].command runs on its own and prints JSON lines, then restart."
            ),
            CoreError::Timeout => {
                "What happened: The rotation stage did not settle in time.\nLikely causes: Mechanical obstruction, wrong bus address, or settle timeout too low.\nHow to fix: Verify the stage moves freely and raise actuator.settle_timeout_ms.".to_string()
            }
            CoreError::Hardware(msg) | CoreError::HardwareFault(msg) => format!(
                "What happened: Rotation stage error ({msg}).\nLikely causes: Wrong serial port, cable unplugged, or the stage reported a fault.\nHow to fix: Check [actuator].port and address, power-cycle the stage, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(he) = err.downcast_ref::<HwError>() {
        return match he {
            HwError::Serial(msg) => format!(
                "What happened: Could not open the serial port ({msg}).\nLikely causes: Wrong port name, missing permissions, or the port is in use.\nHow to fix: Fix [actuator].port and make sure no other program holds the port."
            ),
            other => format!(
                "What happened: Hardware error: {other}.\nLikely causes: Device unplugged or not responding.\nHow to fix: Check cabling and power, then rerun."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("failed to read config") || lower.contains("failed to parse config") {
        let cause = err.root_cause();
        return format!(
            "What happened: {msg}.\nLikely causes: {cause}\nHow to fix: Check the --config path and the TOML syntax."
        );
    }

    if lower.contains("must be") || lower.contains("wavelength") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range or inconsistent values in the TOML.\nHow to fix: Edit the config file, then rerun."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable short name for the JSON `reason` field.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    if let Some(ce) = err.downcast_ref::<CoreError>() {
        return match ce {
            CoreError::Stream(_) => "StreamFailure",
            CoreError::Timeout => "Timeout",
            CoreError::Hardware(_) | CoreError::HardwareFault(_) => "Hardware",
            CoreError::Config(_) => "Config",
            _ => "Error",
        };
    }
    if err.downcast_ref::<HwError>().is_some() {
        return "Hardware";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
