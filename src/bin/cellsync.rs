//! Cell search and tracking over a capture file
//!
//! Usage:
//!   cellsync [OPTIONS] <input>
//!
//! Prints the acquired cell, then one line per frame with the tracking state.
//! `RUST_LOG=ltesync::tracker=debug` shows every tracking attempt.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, warn};

use ltesync::source::{RawFileSource, WavIqSource};
use ltesync::tracing_init::init_tracing;
use ltesync::{AcquisitionTracker, SampleSource, SourceError, Step, SyncError, TrackerConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Wav,
    Raw,
}

/// LTE cell search and time/frequency tracking
#[derive(Parser, Debug)]
#[command(name = "cellsync", version, about = "Acquire and track an LTE cell in a capture")]
struct Cli {
    /// Capture file (stereo WAV or interleaved f32 I/Q)
    input: PathBuf,

    /// Input format, guessed from the extension when absent
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Bandwidth in resource blocks (6, 15, 25, 50, 75 or 100)
    #[arg(short, long, default_value_t = 6)]
    prb: usize,

    /// Only search for this group hypothesis (N_ID_2)
    #[arg(long)]
    hypothesis: Option<u8>,

    /// Detection threshold during cell search
    #[arg(long, default_value_t = ltesync::sync::DEFAULT_THRESHOLD)]
    find_threshold: f32,

    /// Detection threshold while tracking
    #[arg(long, default_value_t = ltesync::tracker::DEFAULT_TRACK_THRESHOLD)]
    track_threshold: f32,

    /// Consecutive tracking misses before searching again
    #[arg(long, default_value_t = ltesync::tracker::DEFAULT_MAX_LOST)]
    max_lost: u32,

    /// Do not correct the frequency offset of tracked subframes
    #[arg(long)]
    no_cfo_correction: bool,

    /// Also search for a frequency offset of one subcarrier either way
    #[arg(long)]
    cfo_integer: bool,

    /// Correct timing only every N tracking hits (0: on every hit)
    #[arg(long, default_value_t = 0)]
    sfo_period: u32,

    /// Stop after this many subframes
    #[arg(short = 'n', long)]
    max_subframes: Option<u64>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Default)]
struct Summary {
    acquisitions: u32,
    losses: u32,
    tracked: u64,
}

fn track<S: SampleSource>(cli: &Cli, config: TrackerConfig, source: S) -> Result<Summary, SyncError> {
    let mut tracker = AcquisitionTracker::new(config, source)?;
    let mut summary = Summary::default();

    loop {
        if cli.max_subframes.is_some_and(|max| tracker.frames() >= max) {
            break;
        }
        let step = match tracker.work() {
            Ok(step) => step,
            Err(SyncError::Receive {
                source: SourceError::EndOfStream,
            }) => break,
            Err(e) => return Err(e),
        };

        match step {
            Step::Searching => {}
            Step::Acquired(id) => {
                summary.acquisitions += 1;
                println!(
                    "Cell {:>3}  (N_ID_1 {:>3}, N_ID_2 {})  {:?} CP  {:?} half-frame  CFO {:+.3}",
                    id.composite_id(),
                    id.secondary_id,
                    id.group_hypothesis,
                    id.cp_kind,
                    id.half_frame,
                    tracker.cfo()
                );
            }
            Step::Subframe(index) => {
                summary.tracked += 1;
                if index == 0 {
                    println!(
                        "  frame {:>6}  peak {:>5}  offset {:+}  mean offset {:+.3}  SFO {:+.1} Hz  CFO {:+.4}  peak value {:.2}",
                        tracker.frames(),
                        tracker.peak_index(),
                        tracker.time_offset(),
                        tracker.mean_time_offset(),
                        tracker.sfo(),
                        tracker.cfo(),
                        tracker.track_synchronizer().peak_ema()
                    );
                }
            }
            Step::LockLost => {
                summary.losses += 1;
                warn!(frames = tracker.frames(), "lock lost");
                println!("Lock lost at block {}", tracker.frames());
            }
        }
    }

    println!(
        "\n{} blocks, {} acquisitions, {} lock losses, {} subframes tracked",
        tracker.frames(),
        summary.acquisitions,
        summary.losses,
        summary.tracked
    );
    Ok(summary)
}

fn run(cli: &Cli) -> Result<Summary, SyncError> {
    let config = TrackerConfig {
        find_threshold: cli.find_threshold,
        track_threshold: cli.track_threshold,
        hypothesis: cli.hypothesis,
        max_lost: cli.max_lost,
        cfo_correction: !cli.no_cfo_correction,
        cfo_integer: cli.cfo_integer,
        sample_offset_correct_period: cli.sfo_period,
        ..TrackerConfig::for_prb(cli.prb)?
    };

    let format = cli.format.unwrap_or_else(|| match cli.input.extension().and_then(|e| e.to_str()) {
        Some("wav") => Format::Wav,
        _ => Format::Raw,
    });
    let sample_rate = 15_000.0 * config.fft_size as f64;

    match format {
        Format::Wav => {
            let source = WavIqSource::open(&cli.input)?;
            if source.sample_rate() as f64 != sample_rate {
                warn!(
                    file_rate = source.sample_rate(),
                    expected = sample_rate,
                    "capture sample rate does not match the bandwidth"
                );
            }
            track(cli, config, source)
        }
        Format::Raw => track(cli, config, RawFileSource::open(&cli.input, Some(sample_rate))?),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(summary) if summary.acquisitions > 0 => ExitCode::SUCCESS,
        Ok(_) => {
            eprintln!("cellsync: no cell found");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "cell sync failed");
            eprintln!("cellsync: {}", e);
            ExitCode::FAILURE
        }
    }
}
