use ltesync::frame::pss_position;
use ltesync::simulation::{CellConfig, ChannelConfig};
use ltesync::{CellSynchronizer, CpKind, HalfFrame, SyncConfig, SyncOutcome};

#[path = "../test_utils.rs"]
mod test_utils;
use test_utils::simulated_samples;

const SUBFRAME: usize = 1920;

/// Identity decoded from subframe `index` of a simulated frame
fn decode_subframe(cell: &CellConfig, channel: ChannelConfig, index: usize) -> ltesync::Detection {
    let samples = simulated_samples(cell, channel, 5, SUBFRAME * 10);
    let block = &samples[index * SUBFRAME..(index + 1) * SUBFRAME];

    let mut sync = CellSynchronizer::new(SyncConfig::new(128)).unwrap();
    match sync.attempt(block, 0).unwrap() {
        SyncOutcome::Found(d) => d,
        other => panic!("subframe {}: {:?}", index, other),
    }
}

#[test]
fn test_secondary_id_and_half_frame_recovered() {
    let cells = [(0u16, 0u8), (1, 2), (83, 1), (167, 2)];
    for (secondary_id, hypothesis) in cells {
        let cell = CellConfig {
            secondary_id,
            group_hypothesis: hypothesis,
            ..CellConfig::default()
        };
        let channel = ChannelConfig {
            noise_variance: 0.01,
            ..ChannelConfig::default()
        };
        for (subframe, half) in [(0usize, HalfFrame::First), (5, HalfFrame::Second)] {
            let d = decode_subframe(&cell, channel.clone(), subframe);
            assert_eq!(d.peak_position, pss_position(128));
            let id = d
                .identity
                .unwrap_or_else(|| panic!("id {} subframe {} unresolved", secondary_id, subframe));
            assert_eq!(id.secondary_id, secondary_id);
            assert_eq!(id.group_hypothesis, hypothesis);
            assert_eq!(id.half_frame, half);
        }
    }
}

#[test]
fn test_secondary_decoded_under_frequency_offset() {
    let cell = CellConfig {
        secondary_id: 120,
        group_hypothesis: 1,
        ..CellConfig::default()
    };
    let channel = ChannelConfig {
        noise_variance: 0.01,
        cfo: 0.15,
        ..ChannelConfig::default()
    };
    let d = decode_subframe(&cell, channel, 5);
    let cfo = d.cfo.unwrap();
    assert!((cfo - 0.15).abs() < 0.03, "cfo {}", cfo);
    let id = d.identity.expect("secondary id decoded");
    assert_eq!(id.composite_id(), 361);
    assert_eq!(id.half_frame, HalfFrame::Second);
}

#[test]
fn test_prefix_length_classified() {
    for cp in [CpKind::Normal, CpKind::Extended] {
        let cell = CellConfig {
            secondary_id: 9,
            group_hypothesis: 0,
            cp,
            ..CellConfig::default()
        };
        let d = decode_subframe(&cell, ChannelConfig::default(), 0);
        assert_eq!(d.cp_kind, cp);
        let id = d.identity.expect("secondary id decoded");
        assert_eq!(id.cp_kind, cp);
        assert_eq!(id.secondary_id, 9);
    }
}

#[test]
fn test_data_subframes_not_detected() {
    let cell = CellConfig::default();
    for subframe in [1usize, 2, 7] {
        let samples = simulated_samples(&cell, ChannelConfig::default(), 5, SUBFRAME * 10);
        let block = &samples[subframe * SUBFRAME..(subframe + 1) * SUBFRAME];
        let mut sync = CellSynchronizer::new(SyncConfig::new(128)).unwrap();
        let outcome = sync.attempt(block, 0).unwrap();
        assert!(!outcome.is_found(), "subframe {}: {:?}", subframe, outcome);
    }
}
