use phasectl_core::{CoreError, SpectrumBuffer};
use phasectl_traits::{StreamFrame, StreamMeta};
use proptest::prelude::*;

fn meta(n: usize) -> StreamMeta {
    StreamMeta {
        device_index: 0,
        num_pixels: n,
        wavelengths: Some((0..n).map(|i| 800.0 + i as f64).collect()),
    }
}

fn frame(counts: Vec<f64>) -> StreamFrame {
    StreamFrame {
        timestamp: 0.0,
        device_index: 0,
        counts,
    }
}

proptest! {
    // However many frames land between two reads, the reader sees only the last.
    #[test]
    fn reader_sees_only_the_newest_frame(batches in prop::collection::vec(
        prop::collection::vec(prop::collection::vec(0.0f64..1000.0, 4), 1..8),
        1..6,
    )) {
        let buf = SpectrumBuffer::new().with_normalize(false);
        buf.set_meta(&meta(4)).unwrap();
        for batch in batches {
            let last = batch.last().cloned().unwrap();
            for counts in batch {
                buf.update(frame(counts));
            }
            let got = buf.get_latest().unwrap().unwrap();
            prop_assert_eq!(got.intensities(), last.as_slice());
            prop_assert!(buf.get_latest().unwrap().is_none());
        }
    }
}

#[test]
fn empty_buffer_reports_nothing() {
    let buf = SpectrumBuffer::new();
    assert!(buf.get_latest().unwrap().is_none());
    assert!(!buf.has_pending());
}

#[test]
fn frame_before_meta_is_a_stream_error() {
    let buf = SpectrumBuffer::new();
    buf.update(frame(vec![1.0, 2.0]));
    assert!(matches!(buf.get_latest(), Err(CoreError::Stream(_))));
}

#[test]
fn pixel_count_mismatch_is_a_stream_error() {
    let buf = SpectrumBuffer::new();
    buf.set_meta(&meta(3)).unwrap();
    buf.update(frame(vec![1.0, 2.0]));
    assert!(matches!(buf.get_latest(), Err(CoreError::Stream(_))));
}

#[test]
fn configured_axis_overrides_missing_meta_axis() {
    let buf = SpectrumBuffer::new().with_axis(vec![796.0, 800.0, 804.0]);
    let m = StreamMeta {
        device_index: 1,
        num_pixels: 3,
        wavelengths: None,
    };
    buf.set_meta(&m).unwrap();
    buf.update(frame(vec![10.0, 30.0, 20.0]));
    let s = buf.get_latest().unwrap().unwrap();
    assert_eq!(s.wavelengths(), &[796.0, 800.0, 804.0]);
    assert_eq!(s.intensities(), &[0.0, 1.0, 0.5]);

    let bare = SpectrumBuffer::new();
    assert!(bare.set_meta(&m).is_err());
}
