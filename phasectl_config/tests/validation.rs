use phasectl_config::{EnvelopeMode, load_toml};
use rstest::rstest;

#[test]
fn empty_file_yields_valid_defaults() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should pass");
    assert_eq!(cfg.stabilization.avg_spectra, 10);
    assert!((cfg.stabilization.residuals_threshold - 15.0).abs() < 1e-12);
    assert!((cfg.stabilization.correction_scale - 0.125).abs() < 1e-12);
    assert_eq!(cfg.actuator.speed_percent, 70);
    assert_eq!(cfg.engine.poll_ms, 10);
    assert_eq!(cfg.envelope.mode, EnvelopeMode::Maximize);
    assert!((cfg.randomizer.step_deg - 90.0).abs() < 1e-12);
}

#[test]
fn parses_full_document() {
    let toml = r#"
[spectrometer]
command = ["python", "-m", "spm_002.json_stream_server"]
normalize = false

[actuator]
port = "/dev/ttyUSB0"
address = "2"
speed_percent = 50

[engine]
poll_ms = 5
pending_wait_ms = 50

[stabilization]
min_nm = 798.0
max_nm = 806.0
avg_spectra = 4
target_phase_rad = 1.2

[stabilization.seed]
central_wavelength_nm = 801.0
tau_ps = 0.5

[envelope]
mode = "minimize"
smooth_window = 5

[randomizer]
step_deg = 45.0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.spectrometer.command.len(), 3);
    assert!(!cfg.spectrometer.normalize);
    assert_eq!(cfg.actuator.port.as_deref(), Some("/dev/ttyUSB0"));
    assert_eq!(cfg.stabilization.avg_spectra, 4);
    assert!((cfg.stabilization.seed.central_wavelength_nm - 801.0).abs() < 1e-12);
    // untouched seed fields keep their defaults
    assert!((cfg.stabilization.seed.bandwidth_nm - 7.4728).abs() < 1e-12);
    assert_eq!(cfg.envelope.mode, EnvelopeMode::Minimize);
    assert!((cfg.randomizer.step_deg - 45.0).abs() < 1e-12);
}

#[test]
fn rejects_unknown_envelope_mode() {
    let toml = r#"
[envelope]
mode = "sideways"
"#;
    assert!(load_toml(toml).is_err());
}

#[rstest]
#[case("[engine]\npoll_ms = 0", "engine.poll_ms must be >= 1")]
#[case("[engine]\npoll_ms = 20\npending_wait_ms = 10", "pending_wait_ms must be >=")]
#[case("[actuator]\nspeed_percent = 0", "actuator.speed_percent must be in [1, 100]")]
#[case("[actuator]\nspeed_percent = 101", "actuator.speed_percent must be in [1, 100]")]
#[case("[actuator]\naddress = \"10\"", "actuator.address must be a single hex digit")]
#[case("[stabilization]\navg_spectra = 0", "stabilization.avg_spectra must be >= 1")]
#[case("[stabilization]\nmin_nm = 810.0\nmax_nm = 796.0", "stabilization.max_nm must be >")]
#[case("[stabilization]\ncorrection_sign = 2", "correction_sign must be 1 or -1")]
#[case("[stabilization]\nresiduals_threshold = 0.0", "residuals_threshold must be > 0")]
#[case("[stabilization.seed]\nbaseline = 1.5", "seed.baseline must be in")]
#[case("[envelope]\nsmooth_window = 0", "envelope.smooth_window must be >= 1")]
#[case("[envelope]\nstep_deg = -1.0", "envelope.step_deg must be > 0")]
#[case("[envelope]\nimprove_eps = -0.1", "envelope.improve_eps must be >= 0")]
#[case("[randomizer]\nstep_deg = 0.0", "randomizer.step_deg must be > 0")]
#[case("[spectrometer]\nsimulate_rate_hz = 0", "simulate_rate_hz must be > 0")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "message {msg:?} lacks {needle:?}");
}
