//! End-to-end runs of the stabilization engine against mock hardware.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use phasectl_core::mocks::{ActuatorProbe, ChannelSource, FixedPhaseModel, RecordingActuator, SourceFeed};
use phasectl_core::{
    Acquisition, AcquisitionEvent, ActuatorCfg, ActuatorController, Angle, ControlEngine,
    EngineCfg, EngineState, EventBus, PhaseStabilizer, SpectrumBuffer, StabilizationCfg,
    StateChange, StepReport, TrackerState,
};
use phasectl_traits::MonotonicClock;
use rstest::rstest;

const WAIT: Duration = Duration::from_secs(3);

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn axis() -> Vec<f64> {
    (0..64).map(|i| 796.0 + 14.0 * f64::from(i) / 63.0).collect()
}

fn counts() -> Vec<f64> {
    (0..64).map(|i| 100.0 + 50.0 * (f64::from(i) / 5.0).sin()).collect()
}

struct Rig {
    engine: ControlEngine<PhaseStabilizer<FixedPhaseModel>>,
    feed: SourceFeed,
    probe: ActuatorProbe,
    actuator: Arc<ActuatorController>,
    _acquisition: Acquisition,
}

fn rig(model: FixedPhaseModel, cfg: StabilizationCfg) -> Rig {
    let (act, probe) = RecordingActuator::with_probe();
    let actuator = Arc::new(ActuatorController::spawn(
        act,
        ActuatorCfg {
            settle_timeout: Duration::from_secs(5),
            status_poll: Duration::from_millis(1),
        },
        MonotonicClock::new(),
    ));
    let buffer = Arc::new(SpectrumBuffer::new());
    let bus = Arc::new(EventBus::<AcquisitionEvent>::new());
    let (source, feed) = ChannelSource::with_feed(axis());
    let acquisition = Acquisition::spawn(source, buffer.clone(), bus.clone(), MonotonicClock::new());
    let engine = ControlEngine::builder(PhaseStabilizer::new(model, &cfg))
        .with_actuator(actuator.clone())
        .with_buffer(buffer)
        .with_bus(bus)
        .with_cfg(EngineCfg::default())
        .build()
        .unwrap();
    Rig {
        engine,
        feed,
        probe,
        actuator,
        _acquisition: acquisition,
    }
}

fn phase_model() -> FixedPhaseModel {
    FixedPhaseModel {
        phase: Angle::from_radians(0.5),
        residual: 1.0,
    }
}

fn avg3() -> StabilizationCfg {
    StabilizationCfg {
        avg_spectra: 3,
        ..StabilizationCfg::default()
    }
}

fn feed_and_wait(rig: &Rig, n: u64) {
    for i in 1..=n {
        rig.feed.frame(counts());
        wait_for(|| rig.engine.steps_completed() == i);
    }
}

#[rstest]
#[case::off_target(0.0, 1)]
#[case::on_target(0.5, 0)]
fn six_spectra_yield_one_accepted_phase(#[case] target_rad: f64, #[case] expected_moves: usize) {
    let rig = rig(phase_model(), avg3());
    let reports: Arc<Mutex<Vec<StepReport>>> = Arc::default();
    let sink = reports.clone();
    rig.engine
        .set_on_result(move |r| sink.lock().unwrap().push(r.clone()));
    rig.engine
        .configure(|s| s.set_target_phase(Angle::from_radians(target_rad)));
    rig.engine.start().unwrap();

    feed_and_wait(&rig, 6);
    assert!(rig.actuator.wait_idle(WAIT, Duration::from_millis(1)));

    let moves = rig.probe.rotations();
    assert_eq!(moves.len(), expected_moves);
    if expected_moves == 1 {
        // 0.5 rad error, half-wave plate: 28.648° / 8.
        assert!((moves[0] - 0.5f64.to_degrees() / 8.0).abs() < 1e-6);
    }

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 6);
    assert!(reports[..5].iter().all(|r| r.current_phase.is_none()));
    assert_eq!(reports[5].current_phase, Some(Angle::from_radians(0.5)));
    assert!(reports[5].curve("fit").is_some());
    assert!(reports[5].curve("zero_phase").is_some());
    rig.engine.stop();
}

#[test]
fn unusable_spectra_are_skipped_silently() {
    let rig = rig(phase_model(), avg3());
    rig.engine.start().unwrap();
    rig.feed.frame(vec![0.0; 64]);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(rig.engine.steps_completed(), 0);
    assert_eq!(rig.engine.state(), EngineState::Running);

    feed_and_wait(&rig, 1);
    rig.engine.stop();
}

#[test]
fn stop_is_prompt_while_waiting_for_a_busy_actuator() {
    let rig = rig(phase_model(), avg3());
    rig.engine.start().unwrap();
    rig.probe.hold();
    rig.actuator.request_rotation(Angle::from_degrees(1.0));
    wait_for(|| rig.probe.rotations().len() == 1);
    rig.feed.frame(counts());
    std::thread::sleep(Duration::from_millis(30));

    let start = Instant::now();
    rig.engine.stop();
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(rig.engine.state(), EngineState::Stopped);
    assert_eq!(rig.engine.steps_completed(), 0);
    rig.probe.release();
}

#[test]
fn stop_is_prompt_when_idle() {
    let rig = rig(phase_model(), avg3());
    rig.engine.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    rig.engine.stop();
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[rstest]
#[case::source_error(true, "usb unplugged")]
#[case::source_closed(false, "closed")]
fn stream_failure_stops_the_engine(#[case] fail: bool, #[case] needle: &str) {
    let rig = rig(phase_model(), avg3());
    let changes: Arc<Mutex<Vec<StateChange>>> = Arc::default();
    let sink = changes.clone();
    rig.engine
        .set_on_state(move |c| sink.lock().unwrap().push(c.clone()));
    rig.engine.start().unwrap();

    if fail {
        rig.feed.fail("usb unplugged");
    } else {
        rig.feed.end();
    }
    wait_for(|| rig.engine.state() == EngineState::Stopped);

    let reason = rig.engine.stop_reason().unwrap();
    assert!(reason.contains(needle), "reason: {reason}");
    let changes = changes.lock().unwrap();
    let last = changes.last().unwrap();
    assert_eq!(last.state, EngineState::Stopped);
    assert!(last.reason.is_some());
}

#[test]
fn malformed_frame_is_fatal() {
    let rig = rig(phase_model(), avg3());
    rig.engine.start().unwrap();
    rig.feed.frame(vec![1.0, 2.0, 3.0]);
    wait_for(|| rig.engine.state() == EngineState::Stopped);
    assert!(rig.engine.stop_reason().unwrap().contains("counts"));
}

#[test]
fn in_place_reset_restarts_gathering_without_stopping() {
    let rig = rig(phase_model(), avg3());
    rig.engine.start().unwrap();
    feed_and_wait(&rig, 3);
    assert_eq!(
        rig.engine.configure(|s| s.tracker().state()),
        TrackerState::PhaseOnly
    );

    rig.engine.reset();
    assert_eq!(
        rig.engine.configure(|s| s.tracker().state()),
        TrackerState::Gathering
    );
    assert_eq!(rig.engine.state(), EngineState::Running);
    rig.engine.stop();
}

#[test]
fn restart_after_stop_runs_again() {
    let rig = rig(phase_model(), avg3());
    rig.engine.start().unwrap();
    feed_and_wait(&rig, 1);
    rig.engine.stop();
    rig.engine.start().unwrap();
    assert_eq!(rig.engine.state(), EngineState::Running);
    rig.feed.frame(counts());
    wait_for(|| rig.engine.steps_completed() == 2);
    rig.engine.stop();
}
