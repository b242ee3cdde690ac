use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use phasectl_core::{Angle, FitModel, FitParameters, FitScope, InterferenceModel};

// Detector-like axis: 200 pixels across the fit window
fn axis(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 796.0 + 14.0 * i as f64 / (n - 1) as f64)
        .collect()
}

// Model output plus small deterministic noise
fn noisy_spectrum(x: &[f64], phase_rad: f64, noise_amp: f64, seed: u32) -> Vec<f64> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut v = state;
        v ^= v << 13;
        v ^= v >> 17;
        v ^= v << 5;
        state = v;
        f64::from(v) / (f64::from(u32::MAX) + 1.0)
    };
    let truth = FitParameters {
        phase: Angle::from_radians(phase_rad),
        ..FitParameters::default()
    };
    InterferenceModel
        .evaluate(&truth, x)
        .into_iter()
        .map(|y| y + (next() * 2.0 - 1.0) * noise_amp)
        .collect()
}

fn configure(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p phasectl_core --bench fit_model
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(10));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_fit(c: &mut Criterion) {
    let mut g = c.benchmark_group("interference_fit");
    configure(&mut g);

    let x = axis(200);
    let y = noisy_spectrum(&x, 0.7, 0.01, 0xC0FFEE);
    let seed = FitParameters::default();

    for (label, scope) in [("phase_only", FitScope::PhaseOnly), ("full", FitScope::Full)] {
        g.bench_function(label, |b| {
            b.iter_batched(
                || seed,
                |s| {
                    let p = InterferenceModel.fit(black_box(&x), black_box(&y), &s, scope);
                    black_box(p.ok());
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

pub fn bench_evaluate(c: &mut Criterion) {
    let mut g = c.benchmark_group("interference_evaluate");
    configure(&mut g);

    let params = FitParameters::default();
    for n in [200usize, 2048] {
        let x = axis(n);
        g.bench_function(format!("points_{n}"), |b| {
            b.iter(|| black_box(InterferenceModel.evaluate(black_box(&params), black_box(&x))))
        });
    }
    g.finish();
}

criterion_group!(fit_model, bench_fit, bench_evaluate);
criterion_main!(fit_model);
