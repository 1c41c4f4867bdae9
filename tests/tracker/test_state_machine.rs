use ltesync::simulation::{add_awgn, CellConfig, ChannelConfig, SimulatedSource};
use ltesync::source::SliceSource;
use ltesync::sync::Correlator;
use ltesync::tracing_init::init_test_tracing;
use ltesync::{AcquisitionTracker, CellIdentity, SampleSource, SourceError, Step, SyncError, TrackerConfig, TrackerState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustfft::num_complex::Complex32;

#[path = "../test_utils.rs"]
mod test_utils;
use test_utils::{acquire, simulated_tracker};

#[test]
fn test_lock_lost_after_max_consecutive_misses() {
    init_test_tracing();
    let cell = CellConfig {
        secondary_id: 33,
        group_hypothesis: 1,
        ..CellConfig::default()
    };
    let channel = ChannelConfig {
        signal_until: Some(40 * 1920),
        ..ChannelConfig::default()
    };
    let source = SimulatedSource::new(&cell, channel, 8).unwrap();
    let config = TrackerConfig {
        max_lost: 3,
        ..TrackerConfig::default()
    };
    let mut tracker = AcquisitionTracker::new(config, source).unwrap();

    // subframe 0 is the first block
    let (id, blocks) = acquire(&mut tracker, 1);
    assert_eq!(blocks, 1);
    assert_eq!(id.composite_id(), 100);

    // blocks 1..=49: the cell goes silent with block 40 (subframe 0)
    for block in 1..50u64 {
        let step = tracker.work().unwrap();
        assert_eq!(step, Step::Subframe((block % 10) as u8), "block {}", block);
        let expected_losses = match block {
            b if b < 40 => 0,
            b if b < 45 => 1,
            _ => 2,
        };
        assert_eq!(tracker.loss_count(), expected_losses, "block {}", block);
    }

    // third miss in a row
    assert_eq!(tracker.work().unwrap(), Step::LockLost);
    assert_eq!(tracker.state(), TrackerState::Find);
    assert!(tracker.identity().is_none());
    assert!(tracker.find_synchronizer().mean_energy() > 0.0);

    for _ in 0..10 {
        assert_eq!(tracker.work().unwrap(), Step::Searching);
    }
}

#[test]
fn test_restricted_hypothesis_ignores_other_cells() {
    let cell = CellConfig {
        secondary_id: 5,
        group_hypothesis: 1,
        ..CellConfig::default()
    };
    let source = SimulatedSource::new(&cell, ChannelConfig::default(), 2).unwrap();
    let config = TrackerConfig {
        hypothesis: Some(0),
        ..TrackerConfig::default()
    };
    let mut tracker = AcquisitionTracker::new(config, source).unwrap();
    for _ in 0..30 {
        assert_eq!(tracker.work().unwrap(), Step::Searching);
    }

    let source = SimulatedSource::new(&cell, ChannelConfig::default(), 2).unwrap();
    let config = TrackerConfig {
        hypothesis: Some(1),
        ..TrackerConfig::default()
    };
    let mut tracker = AcquisitionTracker::new(config, source).unwrap();
    let (id, _) = acquire(&mut tracker, 10);
    assert_eq!(id.group_hypothesis, 1);
    assert_eq!(id.secondary_id, 5);
}

#[test]
fn test_frequency_offset_tracked_and_removed() {
    init_test_tracing();
    let cell = CellConfig {
        secondary_id: 77,
        group_hypothesis: 0,
        ..CellConfig::default()
    };
    let channel = ChannelConfig {
        noise_variance: 0.01,
        cfo: 0.15,
        timing_offset: 700,
        ..ChannelConfig::default()
    };
    let mut tracker = simulated_tracker(&cell, channel, 13);
    let (id, _) = acquire(&mut tracker, 20);
    assert_eq!(id.secondary_id, 77);
    assert!((tracker.cfo() - 0.15).abs() < 0.03, "seeded cfo {}", tracker.cfo());

    let correlator = Correlator::new(1920, 1920, 128).unwrap();
    let reference = tracker.track_synchronizer().reference(0).unwrap().clone();
    let mut residuals = Vec::new();
    for _ in 0..200 {
        if let Step::Subframe(0 | 5) = tracker.work().unwrap() {
            let block = tracker.subframe().to_vec();
            if let Some(residual) = correlator.estimate_cfo(&block, tracker.peak_index(), &reference) {
                residuals.push(residual);
            }
        }
    }

    assert_eq!(tracker.state(), TrackerState::Track);
    assert_eq!(tracker.loss_count(), 0);
    assert!((tracker.cfo() - 0.15).abs() < 0.02, "tracked cfo {}", tracker.cfo());

    // the last few corrected subframes carry almost no offset
    assert!(residuals.len() > 20);
    let tail = &residuals[residuals.len() - 10..];
    let mean = tail.iter().sum::<f32>() / tail.len() as f32;
    assert!(mean.abs() < 0.02, "residual cfo {}", mean);
}

#[test]
fn test_reacquires_after_reset() {
    let cell = CellConfig {
        secondary_id: 150,
        group_hypothesis: 2,
        ..CellConfig::default()
    };
    let mut tracker = simulated_tracker(&cell, ChannelConfig::default(), 4);
    acquire(&mut tracker, 20);
    for _ in 0..7 {
        tracker.work().unwrap();
    }

    tracker.reset();
    assert_eq!(tracker.state(), TrackerState::Find);
    assert_eq!(tracker.success_count(), 0);
    assert_eq!(tracker.attempt_count(), 0);

    // FIND starts over from wherever the stream is
    let (id, _) = acquire(&mut tracker, 20);
    assert_eq!(id.composite_id(), 452);
    let mut indices = Vec::new();
    for _ in 0..12 {
        match tracker.work().unwrap() {
            Step::Subframe(i) => indices.push(i),
            other => panic!("unexpected step {:?}", other),
        }
    }
    for pair in indices.windows(2) {
        assert_eq!(pair[1], (pair[0] + 1) % 10);
    }
    assert_eq!(tracker.time_offset(), 0);
}

/// Acquisitions and lock losses until the source runs dry
fn run_to_end<S: SampleSource>(tracker: &mut AcquisitionTracker<S>) -> (Vec<CellIdentity>, u32) {
    let mut acquired = Vec::new();
    let mut lost = 0;
    loop {
        match tracker.work() {
            Ok(Step::Acquired(id)) => acquired.push(id),
            Ok(Step::LockLost) => lost += 1,
            Ok(_) => {}
            Err(SyncError::Receive {
                source: SourceError::EndOfStream,
            }) => break,
            Err(e) => panic!("tracker failed: {}", e),
        }
    }
    (acquired, lost)
}

#[test]
fn test_reacquires_after_signal_gap() {
    init_test_tracing();
    let cell = CellConfig {
        secondary_id: 64,
        group_hypothesis: 2,
        ..CellConfig::default()
    };
    let channel = ChannelConfig {
        noise_variance: 0.001,
        ..ChannelConfig::default()
    };
    let mut simulated = SimulatedSource::new(&cell, channel, 6).unwrap();

    // 40 subframes of cell, 80 of silence, 40 of cell again
    let mut capture = simulated.take(40 * 1920);
    capture.extend(std::iter::repeat(Complex32::new(0.0, 0.0)).take(80 * 1920));
    capture.extend(simulated.take(40 * 1920));

    let mut tracker = AcquisitionTracker::new(TrackerConfig::default(), SliceSource::new(capture)).unwrap();
    let (acquired, lost) = run_to_end(&mut tracker);

    assert_eq!(lost, 1);
    assert_eq!(acquired.len(), 2);
    assert_eq!(acquired[0].composite_id(), 194);
    assert_eq!(acquired[1], acquired[0]);
    assert_eq!(tracker.state(), TrackerState::Track);
}

#[test]
fn test_holds_lock_after_gain_drop() {
    init_test_tracing();
    let cell = CellConfig {
        secondary_id: 90,
        group_hypothesis: 1,
        ..CellConfig::default()
    };
    let mut simulated = SimulatedSource::new(&cell, ChannelConfig::default(), 9).unwrap();

    // a long strong session, a gap of whole frames, then the same cell 26 dB down
    let mut capture = simulated.take(300 * 1920);
    capture.extend(std::iter::repeat(Complex32::new(0.0, 0.0)).take(30 * 1920));
    let mut weak: Vec<Complex32> = simulated.take(400 * 1920).iter().map(|s| s * 0.05).collect();
    add_awgn(&mut weak, 1e-4, &mut StdRng::seed_from_u64(19));
    capture.extend(weak);

    let mut tracker = AcquisitionTracker::new(TrackerConfig::default(), SliceSource::new(capture)).unwrap();
    let (acquired, lost) = run_to_end(&mut tracker);

    // the gap costs one lock, the weak signal is then tracked to the end
    assert_eq!(lost, 1);
    assert_eq!(acquired.len(), 2);
    assert_eq!(acquired[1].composite_id(), 271);
    assert_eq!(tracker.state(), TrackerState::Track);
    assert_eq!(tracker.loss_count(), 0);
    // restarted from the weak signal, not averaged with the strong session
    let energy = tracker.track_synchronizer().mean_energy();
    assert!(energy < 1.0, "track energy {}", energy);
}

#[test]
fn test_default_config_acquires_wide_bandwidths() {
    init_test_tracing();
    for (nof_prb, secondary_id, hypothesis) in [(25usize, 150u16, 0u8), (100, 111, 2)] {
        let cell = CellConfig {
            nof_prb,
            secondary_id,
            group_hypothesis: hypothesis,
            ..CellConfig::default()
        };
        let channel = ChannelConfig {
            noise_variance: 0.001,
            timing_offset: 1000,
            ..ChannelConfig::default()
        };
        let source = SimulatedSource::new(&cell, channel, 31).unwrap();
        let config = TrackerConfig::for_prb(nof_prb).unwrap();
        let block_len = config.block_len();
        let mut tracker = AcquisitionTracker::new(config, source).unwrap();

        let (id, blocks) = acquire(&mut tracker, 20);
        assert_eq!(blocks, 1, "{} PRB", nof_prb);
        assert_eq!(id.composite_id(), 3 * secondary_id + hypothesis as u16);

        for _ in 0..20 {
            assert!(matches!(tracker.work().unwrap(), Step::Subframe(_)), "{} PRB", nof_prb);
        }
        assert_eq!(tracker.state(), TrackerState::Track);
        assert_eq!(tracker.loss_count(), 0);
        assert_eq!(tracker.time_offset(), 0);
        assert_eq!(tracker.last_read_len(), block_len);
    }
}

#[test]
fn test_half_frame_parity_corrects_subframe_index() {
    init_test_tracing();
    let cell = CellConfig {
        secondary_id: 20,
        group_hypothesis: 0,
        ..CellConfig::default()
    };
    // five whole subframes go missing in the middle of subframe 40
    let gap_start = 40 * 1920 + 300;
    let channel = ChannelConfig {
        drop_at: (gap_start..gap_start + 5 * 1920).collect(),
        ..ChannelConfig::default()
    };
    let mut tracker = simulated_tracker(&cell, channel, 12);
    let (id, blocks) = acquire(&mut tracker, 1);
    assert_eq!(blocks, 1);
    assert_eq!(id.composite_id(), 60);

    for block in 1..40u64 {
        assert_eq!(tracker.work().unwrap(), Step::Subframe((block % 10) as u8));
    }

    // block 40 carries the PSS and SSS of subframe 45
    assert_eq!(tracker.work().unwrap(), Step::Subframe(5));
    assert_eq!(tracker.subframe_index(), 5);
    for expected in [6u8, 7, 8, 9, 0, 1, 2, 3, 4, 5, 6] {
        assert_eq!(tracker.work().unwrap(), Step::Subframe(expected));
        assert_eq!(tracker.subframe_index(), expected);
    }
    assert_eq!(tracker.state(), TrackerState::Track);
    assert_eq!(tracker.loss_count(), 0);
    assert_eq!(tracker.time_offset(), 0);
}

#[test]
fn test_peak_at_block_start_shifts_next_read() {
    let cell = CellConfig {
        secondary_id: 140,
        group_hypothesis: 1,
        ..CellConfig::default()
    };
    // the first PSS lands at 132, too early for the SSS and CP windows
    let channel = ChannelConfig {
        timing_offset: 700,
        ..ChannelConfig::default()
    };
    let mut tracker = simulated_tracker(&cell, channel, 5);

    assert_eq!(tracker.work().unwrap(), Step::Searching);
    assert_eq!(tracker.last_read_len(), 1920);
    assert_eq!(tracker.work().unwrap(), Step::Searching);
    assert_eq!(tracker.last_read_len(), 1920 + 960);
    assert_eq!(tracker.work().unwrap(), Step::Searching);
    assert_eq!(tracker.last_read_len(), 1920);

    let (id, _) = acquire(&mut tracker, 20);
    assert_eq!(id.composite_id(), 421);
}

#[test]
fn test_integer_frequency_offset_acquired_and_tracked() {
    init_test_tracing();
    let cell = CellConfig {
        secondary_id: 49,
        group_hypothesis: 2,
        ..CellConfig::default()
    };
    let channel = ChannelConfig {
        noise_variance: 0.001,
        cfo: 1.2,
        timing_offset: 300,
        ..ChannelConfig::default()
    };
    let source = SimulatedSource::new(&cell, channel, 27).unwrap();
    let config = TrackerConfig {
        cfo_integer: true,
        ..TrackerConfig::default()
    };
    let mut tracker = AcquisitionTracker::new(config, source).unwrap();

    let (id, _) = acquire(&mut tracker, 20);
    assert_eq!(id.composite_id(), 149);
    assert_eq!(tracker.find_synchronizer().integer_cfo(), 1);
    assert!((tracker.cfo() - 1.2).abs() < 0.03, "acquired cfo {}", tracker.cfo());

    for _ in 0..100 {
        assert!(matches!(tracker.work().unwrap(), Step::Subframe(_)));
    }
    assert_eq!(tracker.loss_count(), 0);
    assert_eq!(tracker.track_synchronizer().integer_cfo(), 1);
    assert!((tracker.cfo() - 1.2).abs() < 0.02, "tracked cfo {}", tracker.cfo());
}
