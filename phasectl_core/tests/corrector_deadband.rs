use phasectl_core::{Angle, PhaseCorrector};
use rstest::rstest;

#[rstest]
#[case::inside_band(5.0, 0.0)]
#[case::at_edge(10.0, 0.0)]
#[case::just_outside(10.5, 10.5 / 8.0)]
#[case::negative(-40.0, -5.0)]
#[case::large(80.0, 10.0)]
fn default_band_and_scale(#[case] measured_deg: f64, #[case] expected_deg: f64) {
    let c = PhaseCorrector::default();
    let out = c.update(Angle::from_degrees(measured_deg));
    assert!(
        (out.degrees() - expected_deg).abs() < 1e-9,
        "{measured_deg}° -> {} (expected {expected_deg}°)",
        out.degrees()
    );
}

#[test]
fn error_is_measured_minus_target_without_wrapping() {
    let mut c = PhaseCorrector::default();
    c.set_target_phase(Angle::from_degrees(170.0));
    let e = c.error(Angle::from_degrees(-170.0));
    assert!((e.degrees() + 340.0).abs() < 1e-9);
}

#[test]
fn target_change_applies_to_next_update() {
    let mut c = PhaseCorrector::default();
    let measured = Angle::from_radians(0.5);
    assert!(!c.update(measured).is_zero());
    c.set_target_phase(Angle::from_radians(0.5));
    assert!(c.update(measured).is_zero());
}

#[test]
fn negative_sign_reverses_correction() {
    let c = PhaseCorrector::new(Angle::ZERO, Angle::from_degrees(1.0), 0.5, -1.0);
    let out = c.update(Angle::from_degrees(20.0));
    assert!((out.degrees() + 10.0).abs() < 1e-9);
}
