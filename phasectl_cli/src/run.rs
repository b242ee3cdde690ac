//! Loop wiring: hardware assembly, engine construction and report output.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use eyre::{Result, WrapErr};
use phasectl_config::Config;
use phasectl_core::{
    Acquisition, AcquisitionEvent, ActuatorController, Alternator, Angle, ControlEngine,
    ControllerStatus, CoreError, EngineState, EnvelopeSignalGenerator, Estimator, EventBus,
    FitModel, FitParameters, InterferenceModel, PhaseStabilizer, SpectrumBuffer, StepReport,
};
use phasectl_hardware::{JsonLineSource, SimulatedSpectrometer, SimulatedStage, StageHandle};
use phasectl_traits::{Actuator, MonotonicClock};

use crate::cli::Mode;

/// Stage-to-phase gain of the simulated setup (phase degrees per stage degree).
const SIM_PHASE_GAIN: f64 = 8.0;
const SIM_PIXELS: usize = 512;
const SIM_PHASE0_RAD: f64 = 1.2;
const SIM_MOTION: Duration = Duration::from_millis(30);
const SUPERVISE_TICK: Duration = Duration::from_millis(20);

pub struct RunOptions {
    pub mode: Mode,
    pub simulate: bool,
    pub duration: Option<Duration>,
    pub target_phase_rad: Option<f64>,
    pub reset_after: Option<Duration>,
    pub json: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    pub steps: u64,
    pub commands: u64,
    pub superseded: u64,
}

/// Rotation stage behind an [`ActuatorController`]. The handle is present
/// for the simulated stage only.
pub fn build_actuator(
    cfg: &Config,
    simulate: bool,
) -> Result<(ActuatorController, Option<StageHandle>)> {
    let act_cfg = phasectl_core::ActuatorCfg::from(&cfg.actuator);
    match (&cfg.actuator.port, simulate) {
        (Some(port), false) => {
            let ctl = ActuatorController::spawn(
                open_stage(port, cfg)?,
                act_cfg,
                MonotonicClock::new(),
            );
            Ok((ctl, None))
        }
        _ => {
            let stage = SimulatedStage::new().with_motion_time(SIM_MOTION);
            let handle = stage.handle();
            tracing::info!("using simulated rotation stage");
            Ok((
                ActuatorController::spawn(stage, act_cfg, MonotonicClock::new()),
                Some(handle),
            ))
        }
    }
}

#[cfg(feature = "hardware")]
fn open_stage(port: &str, cfg: &Config) -> Result<impl Actuator + Send + 'static> {
    let address = cfg
        .actuator
        .address
        .chars()
        .next()
        .ok_or_else(|| eyre::eyre!("actuator.address must be a single hex digit 0-9 or A-F"))?;
    tracing::info!(port, %address, "using ELL14 rotation stage");
    Ok(phasectl_hardware::Ell14::open_serial(port, address)
        .with_pulses_per_degree(cfg.actuator.pulses_per_degree))
}

#[cfg(not(feature = "hardware"))]
fn open_stage(port: &str, _cfg: &Config) -> Result<impl Actuator + Send + 'static> {
    Err::<SimulatedStage, _>(CoreError::Hardware(format!(
        "serial stage on {port} needs a build with --features hardware; pass --simulate instead"
    )))
    .wrap_err("cannot open rotation stage")
}

/// Fringe pattern whose phase follows the simulated stage angle.
fn simulated_spectrometer(cfg: &Config, stage: StageHandle) -> SimulatedSpectrometer {
    let st = &cfg.stabilization;
    let margin = 0.25 * (st.max_nm - st.min_nm);
    let axis = SimulatedSpectrometer::linear_axis(st.min_nm - margin, st.max_nm + margin, SIM_PIXELS);
    let model = InterferenceModel;
    let base = FitParameters::from(&st.seed);
    SimulatedSpectrometer::new(axis, cfg.spectrometer.simulate_rate_hz, move |x| {
        let stage_deg = stage.position_deg();
        let params = FitParameters {
            phase: Angle::from_radians(SIM_PHASE0_RAD - (SIM_PHASE_GAIN * stage_deg).to_radians()),
            ..base
        };
        let transmission = 0.6 + 0.4 * stage_deg.to_radians().cos().powi(2);
        model
            .evaluate(&params, x)
            .into_iter()
            .map(|y| 4000.0 * transmission * y)
            .collect()
    })
}

/// Start acquisition and the selected loop, then supervise until the run ends.
pub fn run(cfg: &Config, opts: &RunOptions, shutdown: Arc<AtomicBool>) -> Result<RunSummary> {
    let (actuator, stage) = build_actuator(cfg, opts.simulate)?;
    let actuator = Arc::new(actuator);
    actuator.request_open();

    let mut buffer = SpectrumBuffer::new().with_normalize(cfg.spectrometer.normalize);
    let simulated_source = opts.simulate || cfg.spectrometer.command.is_empty();
    if !simulated_source && let Some(csv) = &cfg.spectrometer.wavelength_csv {
        let axis = phasectl_config::load_wavelength_csv(std::path::Path::new(csv))
            .wrap_err_with(|| format!("failed to load wavelength axis {csv}"))?;
        buffer = buffer.with_axis(axis);
    }
    let buffer = Arc::new(buffer);
    let bus = Arc::new(EventBus::<AcquisitionEvent>::new());

    // Acquisition is spawned only for loops that consume spectra.
    let acquisition = if opts.mode == Mode::Randomize {
        None
    } else if simulated_source {
        let source = simulated_spectrometer(cfg, stage.clone().unwrap_or_default());
        Some(Acquisition::spawn(source, buffer.clone(), bus.clone(), MonotonicClock::new()))
    } else {
        let source = JsonLineSource::spawn_process(&cfg.spectrometer.command)
            .wrap_err("failed to launch acquisition process")?;
        Some(Acquisition::spawn(source, buffer.clone(), bus.clone(), MonotonicClock::new()))
    };

    let engine_cfg = phasectl_core::EngineCfg::from(&cfg.engine);
    let steps = match opts.mode {
        Mode::Stabilize => {
            let mut st_cfg = phasectl_core::StabilizationCfg::from(&cfg.stabilization);
            if let Some(rad) = opts.target_phase_rad {
                st_cfg.target_phase = Angle::from_radians(rad);
            }
            let engine = ControlEngine::builder(PhaseStabilizer::new(InterferenceModel, &st_cfg))
                .with_actuator(actuator.clone())
                .with_buffer(buffer)
                .with_bus(bus)
                .with_cfg(engine_cfg)
                .build()?;
            drive(&engine, opts, &shutdown)?
        }
        Mode::Envelope => {
            let env_cfg = phasectl_core::EnvelopeCfg::from(&cfg.envelope);
            let engine = ControlEngine::builder(EnvelopeSignalGenerator::new(&env_cfg))
                .with_actuator(actuator.clone())
                .with_buffer(buffer)
                .with_bus(bus)
                .with_cfg(engine_cfg)
                .build()?;
            drive(&engine, opts, &shutdown)?
        }
        Mode::Randomize => {
            let alt_cfg = phasectl_core::AlternatorCfg::from(&cfg.randomizer);
            let engine = ControlEngine::builder(Alternator::new(&alt_cfg))
                .with_actuator(actuator.clone())
                .with_cfg(engine_cfg)
                .build()?;
            drive(&engine, opts, &shutdown)?
        }
    };
    drop(acquisition);

    if let ControllerStatus::CommFailure(msg) = actuator.status() {
        tracing::warn!(error = %msg, "rotation stage link was left in a failed state");
    }
    Ok(RunSummary {
        steps,
        commands: actuator.commands_executed(),
        superseded: actuator.commands_superseded(),
    })
}

/// Run `engine` until ctrl-c, the duration, or a fatal stop. Returns the
/// number of reported steps.
fn drive<E: Estimator>(
    engine: &ControlEngine<E>,
    opts: &RunOptions,
    shutdown: &AtomicBool,
) -> Result<u64> {
    let json = opts.json;
    let mode = opts.mode.as_str();
    let counter = Arc::new(AtomicU64::new(0));
    let seen = counter.clone();
    engine.set_on_result(move |report| {
        let n = seen.fetch_add(1, Ordering::Relaxed) + 1;
        print_report(mode, n, report, json);
    });
    engine.set_on_state(|change| {
        tracing::debug!(state = ?change.state, reason = change.reason.as_deref(), "engine state");
    });

    engine.start()?;
    let started = Instant::now();
    let mut reset_issued = false;
    loop {
        std::thread::sleep(SUPERVISE_TICK);
        let elapsed = started.elapsed();
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("interrupted");
            break;
        }
        if opts.duration.is_some_and(|d| elapsed >= d) {
            break;
        }
        if !reset_issued && opts.reset_after.is_some_and(|d| elapsed >= d) {
            tracing::info!(estimator = mode, "reset requested");
            engine.reset();
            reset_issued = true;
        }
        if engine.state() == EngineState::Stopped {
            if let Some(reason) = engine.stop_reason() {
                return Err(CoreError::Stream(reason)).wrap_err("control loop stopped");
            }
            // A drained reset leaves the loop stopped and re-armed.
            tracing::info!(estimator = mode, "restarting after reset");
            engine.start()?;
        }
    }
    engine.stop();
    Ok(counter.load(Ordering::Relaxed))
}

fn print_report(mode: &str, n: u64, report: &StepReport, json: bool) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let res = if json {
        let line = serde_json::json!({
            "type": "step",
            "mode": mode,
            "step": n,
            "phase_rad": report.current_phase.map(|p| p.radians()),
            "metric": report.metric,
            "correction_deg": report.correction.map(|c| c.degrees()),
            "points": report.x.len(),
        });
        writeln!(out, "{line}")
    } else {
        let phase = report
            .current_phase
            .map_or_else(|| "-".to_string(), |p| format!("{:+.3} rad", p.radians()));
        let metric = report
            .metric
            .map_or_else(|| "-".to_string(), |m| format!("{m:.4}"));
        let correction = report
            .correction
            .map_or_else(|| "-".to_string(), |c| format!("{:+.3} deg", c.degrees()));
        writeln!(
            out,
            "[{mode}] step {n:>5}  phase {phase}  metric {metric}  correction {correction}"
        )
    };
    if let Err(e) = res {
        tracing::debug!(error = %e, "stdout closed");
    }
}

/// Open the stage once and wait for the command to settle.
pub fn self_check(cfg: &Config, simulate: bool) -> Result<()> {
    let (actuator, _stage) = build_actuator(cfg, simulate)?;
    actuator.request_open();
    let wait = Duration::from_millis(cfg.actuator.settle_timeout_ms) + Duration::from_secs(1);
    if !actuator.wait_idle(wait, Duration::from_millis(5)) {
        return Err(eyre::Report::new(CoreError::Timeout));
    }
    match actuator.status() {
        ControllerStatus::Ok => Ok(()),
        ControllerStatus::CommFailure(msg) => Err(eyre::Report::new(CoreError::Hardware(msg))),
        ControllerStatus::DeviceError(code) => Err(eyre::Report::new(CoreError::HardwareFault(
            format!("device error code {code}"),
        ))),
    }
}
