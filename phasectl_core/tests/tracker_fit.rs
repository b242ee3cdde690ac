//! Phase tracking on synthetic interference spectra.

use phasectl_core::{
    Angle, FitModel, FitParameters, InterferenceModel, PhaseTracker, Spectrum, TrackerUpdate,
};

fn axis() -> Vec<f64> {
    (0..160).map(|i| 796.0 + 14.0 * f64::from(i) / 159.0).collect()
}

fn synthetic(phase_rad: f64) -> Spectrum {
    let x = axis();
    let truth = FitParameters {
        phase: Angle::from_radians(phase_rad),
        ..FitParameters::default()
    };
    let y = InterferenceModel.evaluate(&truth, &x);
    Spectrum::new(x, y).unwrap()
}

#[test]
fn accepts_true_phase_after_two_windows() {
    let mut tracker = PhaseTracker::new(InterferenceModel, FitParameters::default(), 2, 15.0);
    let s = synthetic(0.7);

    assert!(matches!(
        tracker.update(&s).unwrap(),
        TrackerUpdate::Gathering { .. }
    ));
    assert_eq!(tracker.update(&s).unwrap(), TrackerUpdate::Consolidated);
    assert!(matches!(
        tracker.update(&s).unwrap(),
        TrackerUpdate::Collecting { .. }
    ));
    let TrackerUpdate::Accepted(phase) = tracker.update(&s).unwrap() else {
        panic!("phase window not accepted");
    };
    assert!((phase.radians() - 0.7).abs() < 0.05, "phase {}", phase.radians());
    assert!(tracker.params().residual < 1e-3);
}

#[test]
fn accepted_phase_follows_a_shift() {
    let mut tracker = PhaseTracker::new(InterferenceModel, FitParameters::default(), 1, 15.0);
    tracker.update(&synthetic(0.2)).unwrap();
    let first = tracker.update(&synthetic(0.2)).unwrap();
    let second = tracker.update(&synthetic(-0.9)).unwrap();
    match (first, second) {
        (TrackerUpdate::Accepted(a), TrackerUpdate::Accepted(b)) => {
            assert!((a.radians() - 0.2).abs() < 0.05);
            assert!((b.radians() + 0.9).abs() < 0.05);
        }
        other => panic!("unexpected updates: {other:?}"),
    }
}

#[test]
fn window_straddling_pi_reports_phase_near_pi() {
    let mut tracker = PhaseTracker::new(InterferenceModel, FitParameters::default(), 2, 15.0);
    tracker.update(&synthetic(3.10)).unwrap();
    assert_eq!(tracker.update(&synthetic(3.10)).unwrap(), TrackerUpdate::Consolidated);
    tracker.update(&synthetic(3.10)).unwrap();
    // 3.20 rad comes back from the fit wrapped to about -3.08 rad.
    let TrackerUpdate::Accepted(phase) = tracker.update(&synthetic(3.20)).unwrap() else {
        panic!("phase window not accepted");
    };
    let off = (phase.radians() - 3.15).rem_euclid(std::f64::consts::TAU);
    let off = off.min(std::f64::consts::TAU - off);
    assert!(off < 0.05, "phase {}", phase.radians());
    assert!(phase.radians().abs() > 3.0);
}

#[test]
fn tight_threshold_rejects_noisy_windows() {
    let mut tracker = PhaseTracker::new(InterferenceModel, FitParameters::default(), 1, 1e-9);
    let x = axis();
    let mut y = InterferenceModel.evaluate(&FitParameters::default(), &x);
    for (i, v) in y.iter_mut().enumerate() {
        *v += if i % 2 == 0 { 0.05 } else { -0.05 };
    }
    let noisy = Spectrum::new(x, y).unwrap();
    assert_eq!(tracker.update(&noisy).unwrap(), TrackerUpdate::Consolidated);
    assert!(matches!(
        tracker.update(&noisy).unwrap(),
        TrackerUpdate::Rejected { .. }
    ));
    assert!(tracker.current_phase().is_none());
}

#[test]
fn fit_failure_leaves_tracker_untouched() {
    let mut tracker = PhaseTracker::new(InterferenceModel, FitParameters::default(), 2, 15.0);
    let short = Spectrum::new(vec![800.0, 801.0, 802.0], vec![0.1, 0.5, 0.2]).unwrap();
    assert!(tracker.update(&short).is_err());
    assert!(tracker.last_fit().is_none());
    assert!(matches!(
        tracker.update(&synthetic(0.1)).unwrap(),
        TrackerUpdate::Gathering { collected: 1, .. }
    ));
}
