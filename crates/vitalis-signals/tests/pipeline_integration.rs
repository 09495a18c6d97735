use std::f32::consts::PI;

use ndarray::{Array3, Axis};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vitalis_signals::{
    ChannelConfig, ChannelMeans, ChannelProcessor, QualityRating, RateSource, SignalError,
    VitalsConfig, VitalsMonitor,
};

/// Uniform noise in `[-a, a]` has std `a / sqrt(3)`.
fn uniform_for_std(std: f32) -> f32 {
    std * 3.0f32.sqrt()
}

fn solid_roi(r: u8, g: u8, b: u8) -> Array3<u8> {
    let mut block = Array3::<u8>::zeros((12, 10, 3));
    block.index_axis_mut(Axis(2), 0).fill(r);
    block.index_axis_mut(Axis(2), 1).fill(g);
    block.index_axis_mut(Axis(2), 2).fill(b);
    block
}

#[test]
fn respiration_end_to_end_twelve_breaths_per_minute() {
    let mut config = ChannelConfig::respiration();
    config.buffer_capacity = 150;
    let mut processor = ChannelProcessor::new(config).unwrap();

    let fs = 30.0;
    let amplitude = 30.0;
    let noise = uniform_for_std(0.01 * amplitude);
    let mut rng = StdRng::seed_from_u64(42);

    for i in 0..150 {
        let t = i as f32 / fs;
        let v = 100.0 + amplitude * (2.0 * PI * 0.2 * t).cos() + rng.gen_range(-noise..noise);
        processor
            .add_sample(ChannelMeans::new(v, v, v), t as f64)
            .unwrap();
    }

    let report = processor.estimate_rate().unwrap();
    assert!(
        (10.0..=14.0).contains(&report.rate),
        "rate {} from {:?}",
        report.rate,
        report.estimates
    );
    assert_ne!(report.source, RateSource::PopulationDefault);
}

#[test]
fn zero_roi_frames_are_rejected_without_touching_the_buffer() {
    let mut processor = ChannelProcessor::respiration().unwrap();
    let good = solid_roi(120, 110, 100);
    for i in 0..5 {
        processor.process_roi(good.view(), i as f64 / 30.0).unwrap();
    }
    let before = processor.get_filtered_signal();

    let black = solid_roi(0, 0, 0);
    for i in 5..15 {
        let result = processor.process_roi(black.view(), i as f64 / 30.0);
        assert!(
            matches!(result, Err(SignalError::NonPositiveChannel { .. })),
            "{:?}",
            result
        );
        assert!(result.unwrap_err().is_numeric_error());
    }

    let after = processor.get_filtered_signal();
    assert_eq!(processor.len(), 5);
    assert_eq!(before.values, after.values);
    assert_eq!(before.time, after.time);
}

#[test]
fn empty_roi_is_an_input_error() {
    let mut processor = ChannelProcessor::rppg().unwrap();
    let empty = Array3::<u8>::zeros((0, 0, 3));
    let err = processor.process_roi(empty.view(), 0.0).unwrap_err();
    assert!(err.is_input_error());
    assert!(processor.is_empty());
    assert_eq!(processor.session_start(), None);
}

#[test]
fn rppg_heart_rate_from_green_pulse() {
    let mut processor = ChannelProcessor::rppg().unwrap();
    let fs = 30.0;
    let amplitude = 2.0;
    let noise = uniform_for_std(0.01 * amplitude);
    let mut rng = StdRng::seed_from_u64(7);

    for i in 0..300 {
        let t = i as f32 / fs;
        let g = 120.0 + amplitude * (2.0 * PI * 1.2 * t).sin() + rng.gen_range(-noise..noise);
        let r = 150.0 + rng.gen_range(-noise..noise);
        processor
            .add_sample(ChannelMeans::new(r, g, 90.0), t as f64)
            .unwrap();
    }

    let report = processor.estimate_rate().unwrap();
    assert!((report.rate - 72.0).abs() <= 2.0, "rate {}", report.rate);
    assert_eq!(report.estimates.len(), 2, "{:?}", report.failures);
    assert!(processor.get_signal_quality() >= QualityRating::Fair);
}

#[test]
fn rppg_follows_timestamps_not_frame_counts() {
    // Camera delivers 25 fps while the channel is configured for 30.
    let mut processor = ChannelProcessor::rppg().unwrap();
    let fs = 25.0;
    let mut rng = StdRng::seed_from_u64(3);

    for i in 0..250 {
        let t = i as f32 / fs;
        let jitter = rng.gen_range(-0.002..0.002);
        let g = 120.0 + 2.0 * (2.0 * PI * 1.2 * t).sin();
        processor
            .add_sample(ChannelMeans::new(150.0, g, 90.0), (t + jitter) as f64)
            .unwrap();
    }

    let filtered = processor.get_filtered_signal();
    assert!((filtered.sample_rate - 25.0).abs() < 0.5, "{}", filtered.sample_rate);

    let report = processor.estimate_rate().unwrap();
    assert!((report.rate - 72.0).abs() <= 3.0, "rate {}", report.rate);
}

#[test]
fn insufficient_data_reported_explicitly() {
    let mut processor = ChannelProcessor::rppg().unwrap();
    for i in 0..149 {
        processor
            .add_sample(ChannelMeans::new(150.0, 120.0, 90.0), i as f64 / 30.0)
            .unwrap();
    }
    let err = processor.estimate_rate().unwrap_err();
    assert!(err.is_insufficient_data());
    assert_eq!(
        err,
        SignalError::InsufficientData {
            available: 149,
            required: 150
        }
    );
}

#[test]
fn monitor_runs_both_channels_from_rois() {
    let mut monitor = VitalsMonitor::new(VitalsConfig::default()).unwrap();

    for i in 0..200 {
        let t = i as f64 / 30.0;
        let chest = solid_roi(120, 120, 120);
        let face = solid_roi(150, 120, 90);
        let out = monitor.process_frame(Some(chest.view()), Some(face.view()), t);
        assert!(out.respiration.is_ok());
        assert!(out.rppg.is_ok());
    }

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.respiration.samples, 200);
    assert_eq!(snapshot.rppg.samples, 200);
    // A perfectly still image carries no rhythm.
    assert!(matches!(snapshot.rppg.rate, Err(SignalError::NoEstimate { .. })));
    assert_eq!(snapshot.rppg.quality.rating, QualityRating::Poor);
}

#[test]
fn config_file_drives_processor() {
    use std::io::Write;

    let mut config = VitalsConfig::default();
    config.respiration.buffer_capacity = 450;
    config.rppg.filter.sample_rate = 25.0;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(config.to_toml_string().unwrap().as_bytes())
        .unwrap();

    let loaded = VitalsConfig::from_file(file.path()).unwrap();
    assert_eq!(loaded, config);

    let monitor = VitalsMonitor::new(loaded).unwrap();
    assert_eq!(monitor.respiration().config().buffer_capacity, 450);
    assert_eq!(monitor.rppg().config().sample_rate(), 25.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn arbitrary_samples_never_produce_non_finite_output(
        values in prop::collection::vec(
            prop_oneof![
                8 => 0.0f32..300.0,
                1 => Just(f32::NAN),
                1 => Just(f32::INFINITY),
            ],
            0..400,
        )
    ) {
        let mut processor = ChannelProcessor::respiration().unwrap();
        for (i, v) in values.iter().enumerate() {
            let _ = processor.add_sample(ChannelMeans::new(*v, *v, *v), i as f64 / 30.0);
        }

        let filtered = processor.get_filtered_signal();
        prop_assert!(filtered.values.iter().all(|v| v.is_finite()));
        prop_assert_eq!(filtered.values.len(), processor.len());
        prop_assert_eq!(filtered.time.len(), processor.len());

        if let Ok(report) = processor.estimate_rate() {
            prop_assert!(report.rate.is_finite());
            prop_assert!((5.0..=40.0).contains(&report.rate));
        }
    }
}
