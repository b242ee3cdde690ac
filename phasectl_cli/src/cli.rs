//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Config path tried when `--config` is not given.
pub const DEFAULT_CONFIG: &str = "etc/phasectl.toml";

#[derive(Parser, Debug)]
#[command(name = "phasectl", version, about = "Spectral phase control loop")]
pub struct Cli {
    /// Path to config TOML; defaults apply when omitted and etc/phasectl.toml is absent
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print reports and errors as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG takes precedence
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Control algorithm driving the stage.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Mode {
    /// Hold the fitted spectral phase at a target
    Stabilize,
    /// Hill-climb the smoothed spectrum maximum
    Envelope,
    /// Alternate the stage by a fixed step
    Randomize,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Stabilize => "stabilize",
            Mode::Envelope => "envelope",
            Mode::Randomize => "randomize",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a control loop until ctrl-c or the duration elapses
    Run {
        #[arg(long, value_enum, default_value = "stabilize")]
        mode: Mode,
        /// Use the simulated stage and spectrometer
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration_s: Option<f64>,
        /// Phase setpoint in radians (stabilize mode; overrides config)
        #[arg(long, value_name = "RAD", allow_hyphen_values = true)]
        target_phase_rad: Option<f64>,
        /// Issue one reset after this many seconds
        #[arg(long, value_name = "SECS")]
        reset_after_s: Option<f64>,
    },
    /// Validate the config and open the actuator
    SelfCheck {
        /// Check against the simulated stage
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
    },
}
