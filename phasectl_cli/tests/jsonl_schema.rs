use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[spectrometer]
simulate_rate_hz = 50

[engine]
poll_ms = 5
pending_wait_ms = 50

[stabilization]
avg_spectra = 2
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn run_json(mode: &str) -> Vec<serde_json::Value> {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("phasectl").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--mode")
        .arg(mode)
        .arg("--simulate")
        .arg("--duration-s")
        .arg("1.0");

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    stdout
        .lines()
        .map(|l| {
            serde_json::from_str::<serde_json::Value>(l)
                .unwrap_or_else(|e| panic!("stdout line is not JSON ({e}): {l}"))
        })
        .collect()
}

/// Every stdout line is JSON; steps are numbered and the summary counts them.
#[rstest]
#[case("stabilize")]
#[case("envelope")]
#[case("randomize")]
fn jsonl_run_schema(#[case] mode: &str) {
    let lines = run_json(mode);
    let (summary, steps) = lines.split_last().expect("no output");

    assert_eq!(summary["type"], "summary");
    assert_eq!(summary["mode"], mode);
    assert_eq!(summary["steps"].as_u64(), Some(steps.len() as u64));
    assert!(summary["commands"].as_u64().is_some());

    for (i, step) in steps.iter().enumerate() {
        assert_eq!(step["type"], "step");
        assert_eq!(step["mode"], mode);
        assert_eq!(step["step"].as_u64(), Some(i as u64 + 1));
        for key in ["phase_rad", "metric", "correction_deg", "points"] {
            assert!(step.get(key).is_some(), "missing {key} in {step}");
        }
    }
}

#[rstest]
fn randomize_reports_alternating_corrections() {
    let lines = run_json("randomize");
    let corrections: Vec<f64> = lines
        .iter()
        .filter(|l| l["type"] == "step")
        .filter_map(|l| l["correction_deg"].as_f64())
        .collect();
    assert!(corrections.len() >= 2, "too few steps: {corrections:?}");
    for pair in corrections.windows(2) {
        assert!((pair[0] + pair[1]).abs() < 1e-9, "not alternating: {corrections:?}");
    }
}
