use phasectl_core::envelope::moving_average;
use phasectl_core::{Angle, AngleUnit, PhaseCorrector, Spectrum, WavelengthRange};
use proptest::prelude::*;

proptest! {
    #[test]
    fn degree_radian_round_trip(deg in -1.0e4f64..1.0e4) {
        let a = Angle::new(deg, AngleUnit::Degrees);
        let back = Angle::new(a.value_in(AngleUnit::Radians), AngleUnit::Radians);
        prop_assert!((back.degrees() - deg).abs() <= 1e-9 * deg.abs().max(1.0));
    }

    #[test]
    fn wrap_pi_stays_in_range_and_is_equivalent(rad in -100.0f64..100.0) {
        let w = Angle::from_radians(rad).wrap_pi().radians();
        prop_assert!((-std::f64::consts::PI..=std::f64::consts::PI).contains(&w));
        let turns = (rad - w) / std::f64::consts::TAU;
        prop_assert!((turns - turns.round()).abs() < 1e-9);
    }

    // Inside the band the plate never moves; outside it moves against the error.
    #[test]
    fn correction_respects_dead_band(err_deg in -180.0f64..180.0) {
        let c = PhaseCorrector::default();
        let out = c.update(Angle::from_degrees(err_deg));
        if err_deg.abs() <= 10.0 {
            prop_assert!(out.is_zero());
        } else {
            prop_assert!(out.degrees().signum() == err_deg.signum());
            prop_assert!((out.degrees() - err_deg / 8.0).abs() < 1e-9);
        }
    }

    #[test]
    fn smoothing_stays_within_data_bounds(
        values in prop::collection::vec(-50.0f64..50.0, 1..64),
        window in 1usize..12,
    ) {
        let s = moving_average(&values, window);
        prop_assert_eq!(s.len(), values.len());
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(s.iter().all(|v| *v >= lo - 1e-9 && *v <= hi + 1e-9));
    }

    #[test]
    fn cut_keeps_only_points_in_range(
        start in 780.0f64..800.0,
        n in 2usize..100,
        lo in 780.0f64..820.0,
        width in 0.0f64..20.0,
    ) {
        let x: Vec<f64> = (0..n).map(|i| start + i as f64 * 0.3).collect();
        let s = Spectrum::new(x.clone(), vec![1.0; n]).unwrap();
        let range = WavelengthRange::new(lo, lo + width);
        let c = s.cut(range);
        prop_assert!(c.wavelengths().iter().all(|w| range.contains(*w)));
        prop_assert_eq!(c.len(), x.iter().filter(|w| range.contains(**w)).count());
    }
}
