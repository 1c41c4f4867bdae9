//! LTE downlink simulator
//!
//! Writes a capture of a simulated cell with channel impairments, for use
//! with `cellsync` or any other receiver.
//!
//! Usage:
//!   ltesim [OPTIONS] <output>
//!
//! Examples:
//!   # Cell 301 at 1.4 MHz, 10 frames, clean
//!   ltesim --cell-id 301 capture.wav
//!
//!   # Noisy 5 MHz cell with a frequency offset and a late start
//!   ltesim --prb 25 --snr 5 --cfo 0.2 --timing 1000 capture.cf32

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};

use ltesync::frame::{subframe_len, symbol_size};
use ltesync::simulation::{mean_power, noise_variance_for_snr, CellConfig, ChannelConfig, SimulatedSource};
use ltesync::source::{write_raw, write_wav_iq};
use ltesync::tracing_init::init_tracing;
use ltesync::{CpKind, SyncError};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// Stereo float WAV, I left and Q right
    Wav,
    /// Interleaved little-endian f32 I/Q
    Raw,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Prefix {
    Normal,
    Extended,
}

/// Simulated LTE downlink capture generator
#[derive(Parser, Debug)]
#[command(name = "ltesim", version, about = "Generate a simulated LTE downlink capture")]
struct Cli {
    /// Output file
    output: PathBuf,

    /// Physical cell id, 0..=503
    #[arg(short, long, default_value_t = 0)]
    cell_id: u16,

    /// Bandwidth in resource blocks (6, 15, 25, 50, 75 or 100)
    #[arg(short, long, default_value_t = 6)]
    prb: usize,

    /// Cyclic prefix length
    #[arg(long, value_enum, default_value = "normal")]
    cp: Prefix,

    /// Signal-to-noise ratio in dB, no noise when absent
    #[arg(short, long)]
    snr: Option<f32>,

    /// Carrier frequency offset in subcarrier spacings
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    cfo: f32,

    /// Samples skipped at the start of the capture
    #[arg(short, long, default_value_t = 0)]
    timing: usize,

    /// Number of subframes to write
    #[arg(short = 'n', long, default_value_t = 100)]
    subframes: usize,

    /// Repeat one sample every this many samples (sample clock drift)
    #[arg(long)]
    insert_period: Option<u64>,

    /// Output format, guessed from the extension when absent
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Random seed
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn run(cli: &Cli) -> Result<(), SyncError> {
    if cli.cell_id > 503 {
        return Err(SyncError::InvalidConfiguration {
            reason: format!("cell id {} out of range 0..=503", cli.cell_id),
        });
    }
    let fft_size = symbol_size(cli.prb)?;
    let cell = CellConfig {
        nof_prb: cli.prb,
        secondary_id: cli.cell_id / 3,
        group_hypothesis: (cli.cell_id % 3) as u8,
        cp: match cli.cp {
            Prefix::Normal => CpKind::Normal,
            Prefix::Extended => CpKind::Extended,
        },
    };

    // signal power from one clean frame
    let noise_variance = match cli.snr {
        Some(snr) => {
            let mut preview = SimulatedSource::new(&cell, ChannelConfig::default(), cli.seed)?;
            let frame = preview.take(10 * subframe_len(fft_size));
            noise_variance_for_snr(snr, mean_power(&frame))
        }
        None => 0.0,
    };

    let channel = ChannelConfig {
        noise_variance,
        cfo: cli.cfo,
        timing_offset: cli.timing,
        insert_period: cli.insert_period,
        ..ChannelConfig::default()
    };
    let mut source = SimulatedSource::new(&cell, channel, cli.seed)?;
    let samples = source.take(cli.subframes * subframe_len(fft_size));

    let format = cli.format.unwrap_or_else(|| {
        match cli.output.extension().and_then(|e| e.to_str()) {
            Some("wav") => Format::Wav,
            _ => Format::Raw,
        }
    });
    let sample_rate = 15_000 * fft_size as u32;
    match format {
        Format::Wav => write_wav_iq(&cli.output, &samples, sample_rate)?,
        Format::Raw => write_raw(&cli.output, &samples)?,
    }

    info!(
        path = %cli.output.display(),
        cell_id = cli.cell_id,
        fft_size,
        sample_rate,
        samples = samples.len(),
        noise_variance,
        "capture written"
    );
    println!(
        "Wrote {} samples ({} subframes, {} Hz) of cell {} to {}",
        samples.len(),
        cli.subframes,
        sample_rate,
        cli.cell_id,
        cli.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "simulation failed");
            eprintln!("ltesim: {}", e);
            ExitCode::FAILURE
        }
    }
}
