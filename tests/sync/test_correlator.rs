use ltesync::frame::{pss_position, subframe_len, symbol_size};
use ltesync::simulation::{CellConfig, ChannelConfig};
use ltesync::sync::Correlator;
use ltesync::tracing_init::init_test_tracing;
use ltesync::{CellSynchronizer, HalfFrame, ReferenceGenerator, SyncConfig, SyncOutcome};

#[path = "../test_utils.rs"]
mod test_utils;
use test_utils::{block_with_reference, simulated_samples};

#[test]
fn test_reference_located_for_every_hypothesis() {
    init_test_tracing();
    let mut config = SyncConfig::new(128);
    config.secondary_enabled = false;
    let mut sync = CellSynchronizer::new(config).unwrap();

    for (h, offset) in [(0u8, 17usize), (1, 960), (2, 1790)] {
        let reference = sync.reference(h).unwrap().clone();
        let block = block_with_reference(&reference, 1920, offset, 1.0, 0.01, 40 + h as u64);
        match sync.attempt(&block, 0).unwrap() {
            SyncOutcome::Found(d) => {
                assert_eq!(d.hypothesis, h);
                assert_eq!(d.peak_position, offset);
                assert!(d.peak_value > 0.9, "peak {}", d.peak_value);
            }
            other => panic!("hypothesis {}: {:?}", h, other),
        }
    }
}

#[test]
fn test_noise_only_stays_below_threshold() {
    let mut config = SyncConfig::new(128);
    config.secondary_enabled = false;
    let mut sync = CellSynchronizer::new(config).unwrap();
    let silence = ReferenceGenerator::new(128).unwrap().generate(0).unwrap();

    for seed in 0..5 {
        // zero amplitude: only the noise is left
        let block = block_with_reference(&silence, 1920, 0, 0.0, 1.0, seed);
        let outcome = sync.attempt(&block, 0).unwrap();
        assert!(!outcome.is_found(), "seed {}: {:?}", seed, outcome);
        assert!(outcome.peak_value() < 0.5);
    }
    assert!(sync.mean_energy() > 0.0);
}

#[test]
fn test_peak_position_is_absolute_for_offset_search() {
    let reference = ReferenceGenerator::new(128).unwrap().generate(2).unwrap();
    let block = block_with_reference(&reference, 1920, 840, 1.0, 0.0, 0);

    let mut correlator = Correlator::new(1920, 33, 128).unwrap();
    let result = correlator.find(&block, &reference, 816).unwrap();
    assert_eq!(result.peak_position, 840);
    assert_eq!(correlator.profile().len(), 33);

    // outside the window the true peak is not visible
    let result = correlator.find(&block, &reference, 600).unwrap();
    assert!(result.peak_position >= 600 && result.peak_position < 633);
    assert_ne!(result.peak_position, 840);
}

#[test]
fn test_simulated_cell_at_wider_bandwidths() {
    init_test_tracing();
    for (nof_prb, secondary_id, hypothesis) in [(15usize, 42u16, 1u8), (25, 150, 0), (100, 111, 2)] {
        let fft_size = symbol_size(nof_prb).unwrap();
        let cell = CellConfig {
            nof_prb,
            secondary_id,
            group_hypothesis: hypothesis,
            ..CellConfig::default()
        };
        let block = simulated_samples(&cell, ChannelConfig::default(), 3, subframe_len(fft_size));

        // default threshold: the data around the sync band is not counted
        let mut sync = CellSynchronizer::new(SyncConfig::new(fft_size)).unwrap();
        match sync.attempt(&block, 0).unwrap() {
            SyncOutcome::Found(d) => {
                assert_eq!(d.peak_position, pss_position(fft_size));
                assert!(d.peak_value > 0.9, "{} PRB: peak {}", nof_prb, d.peak_value);
                assert_eq!(d.hypothesis, hypothesis);
                assert!(!d.history_short);
                let id = d.identity.expect("secondary id decoded");
                assert_eq!(id.secondary_id, secondary_id);
                assert_eq!(id.half_frame, HalfFrame::First);
                assert_eq!(id.composite_id(), 3 * secondary_id + hypothesis as u16);
            }
            other => panic!("{} PRB: {:?}", nof_prb, other),
        }
    }
}
