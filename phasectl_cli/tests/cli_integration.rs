use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Small averaging window and a fast simulated spectrometer keep runs short.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[spectrometer]
simulate_rate_hz = 50

[actuator]
speed_percent = 60
settle_timeout_ms = 1000

[engine]
poll_ms = 5
pending_wait_ms = 50

[stabilization]
avg_spectra = 2

[envelope]
step_deg = 2.0
smooth_window = 5

[randomizer]
step_deg = 45.0
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--simulate", "--duration-s", "0.5"], 0, "done:", "stdout")]
#[case(&["run", "--mode", "envelope", "--simulate", "--duration-s", "0.5"], 0, "done:", "stdout")]
#[case(&["run", "--mode", "randomize", "--simulate", "--duration-s", "0.5"], 0, "done:", "stdout")]
#[case(&["self-check", "--simulate"], 0, "ok", "stdout")]
#[case(&["run", "--mode", "sideways"], 2, "invalid value", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("phasectl").unwrap();
    cmd.arg("--config").arg(&cfg).arg("--log-level").arg("warn");
    for a in args {
        cmd.arg(a);
    }

    let output = cmd.output().unwrap();
    let text = if stream == "stdout" {
        String::from_utf8_lossy(&output.stdout).to_string()
    } else {
        String::from_utf8_lossy(&output.stderr).to_string()
    };
    assert_eq!(
        output.status.code(),
        Some(exit_code),
        "args {args:?}; stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains(needle), "expected {needle:?} in {stream}: {text}");
}

#[rstest]
fn missing_explicit_config_is_an_error() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("phasectl").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("self-check")
        .arg("--simulate");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read config"));
}

#[rstest]
fn default_config_path_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("phasectl").unwrap();
    cmd.current_dir(dir.path()).arg("self-check").arg("--simulate");
    cmd.assert().success().stdout(predicate::str::contains("ok"));
}

#[rstest]
#[case("[stabilization]\navg_spectra = 0\n", "avg_spectra")]
#[case("[engine]\npoll_ms = 20\npending_wait_ms = 5\n", "pending_wait_ms")]
#[case("[actuator]\naddress = \"x\"\n", "actuator.address")]
fn invalid_config_is_humanized(#[case] toml: &str, #[case] key: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, toml).unwrap();

    let mut cmd = Command::cargo_bin("phasectl").unwrap();
    cmd.arg("--config").arg(&path).arg("self-check").arg("--simulate");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("What happened: Configuration is invalid"))
        .stderr(predicate::str::contains(key));
}

#[rstest]
fn serial_stage_without_hardware_feature_explains_the_fix() {
    if cfg!(feature = "hardware") {
        return;
    }
    let dir = tempdir().unwrap();
    let path = dir.path().join("port.toml");
    fs::write(&path, "[actuator]\nport = \"/dev/ttyUSB0\"\n").unwrap();

    let mut cmd = Command::cargo_bin("phasectl").unwrap();
    cmd.arg("--config").arg(&path).arg("self-check");
    cmd.assert()
        .code(1)
        .stderr(predicate::str::contains("Rotation stage error"))
        .stderr(predicate::str::contains("--features hardware"));
}

#[rstest]
fn reset_during_randomize_restarts_the_loop() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);
    let mut cmd = Command::cargo_bin("phasectl").unwrap();
    cmd.arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("warn")
        .arg("run")
        .arg("--mode")
        .arg("randomize")
        .arg("--simulate")
        .arg("--duration-s")
        .arg("1.0")
        .arg("--reset-after-s")
        .arg("0.3");
    cmd.assert().success().stdout(predicate::str::contains("done:"));
}
