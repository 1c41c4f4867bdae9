use ltesync::tracing_init::init_test_tracing;
use ltesync::{CellSynchronizer, SyncConfig, SyncOutcome};

#[path = "../test_utils.rs"]
mod test_utils;
use test_utils::block_with_reference;

// hypothesis-1 reference in the middle of a noisy subframe
#[test]
fn test_mid_block_reference_with_noise() {
    init_test_tracing();
    let mut sync = CellSynchronizer::new(SyncConfig::new(128)).unwrap();
    let reference = sync.reference(1).unwrap().clone();
    let block = block_with_reference(&reference, 1920, 960, 1.0, 0.01, 2024);

    let detection = match sync.attempt(&block, 0).unwrap() {
        SyncOutcome::Found(d) => d,
        other => panic!("expected a detection, got {:?}", other),
    };
    assert!(
        (955..=965).contains(&detection.peak_position),
        "peak at {}",
        detection.peak_position
    );
    assert_eq!(detection.hypothesis, 1);
    assert!(detection.peak_value > 0.9);

    let cfo = detection.cfo.expect("full symbol available");
    assert!(cfo.abs() < 0.01, "cfo {}", cfo);
    assert_eq!(sync.last_cfo(), Some(cfo));

    // no SSS was transmitted, the detection still stands
    assert!(detection.identity.is_none());
}

#[test]
fn test_cfo_estimation_can_be_disabled() {
    let mut sync = CellSynchronizer::new(SyncConfig::new(128)).unwrap();
    sync.enable_cfo(false);
    sync.enable_secondary(false);
    let reference = sync.reference(1).unwrap().clone();
    let block = block_with_reference(&reference, 1920, 960, 1.0, 0.0, 0);

    match sync.attempt(&block, 0).unwrap() {
        SyncOutcome::Found(d) => {
            assert!(d.cfo.is_none());
            assert!(d.identity.is_none());
        }
        other => panic!("expected a detection, got {:?}", other),
    }
    assert!(sync.last_cfo().is_none());
    assert_eq!(sync.cfo_mean(), 0.0);
}

#[test]
fn test_peak_at_block_edge_reports_short_history() {
    let mut sync = CellSynchronizer::new(SyncConfig::new(128)).unwrap();
    let reference = sync.reference(0).unwrap().clone();
    // prefix windows would start before the block
    let block = block_with_reference(&reference, 1920, 40, 1.0, 0.0, 0);

    match sync.attempt(&block, 0).unwrap() {
        SyncOutcome::Found(d) => {
            assert_eq!(d.peak_position, 40);
            assert!(d.history_short);
            assert!(d.identity.is_none());
        }
        other => panic!("expected a detection, got {:?}", other),
    }
}
