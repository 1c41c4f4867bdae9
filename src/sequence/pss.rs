//! Primary synchronization signal
//!
//! Length-62 Zadoff-Chu sequences, one per group hypothesis, mapped onto the
//! 62 subcarriers around DC (DC itself unused).

use std::f64::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::frame::{subcarrier_bin, validate_fft_size};

/// Active subcarriers of the PSS and SSS
pub const SYNC_LEN: usize = 62;

/// Number of group hypotheses (N_ID_2)
pub const NUM_HYPOTHESES: u8 = 3;

/// Zadoff-Chu root index per hypothesis
const ROOTS: [u32; 3] = [25, 29, 34];

pub(crate) fn check_hypothesis(hypothesis: u8) -> Result<()> {
    if hypothesis >= NUM_HYPOTHESES {
        return Err(SyncError::invalid(format!(
            "group hypothesis {} out of range 0..=2",
            hypothesis
        )));
    }
    Ok(())
}

/// Subcarrier index (relative to DC) of sequence element `i`
pub fn sync_subcarrier(i: usize) -> i32 {
    if i < SYNC_LEN / 2 {
        i as i32 - 31
    } else {
        i as i32 - 30
    }
}

/// Frequency-domain PSS for a group hypothesis
pub fn pss_sequence(hypothesis: u8) -> Result<[Complex32; SYNC_LEN]> {
    check_hypothesis(hypothesis)?;
    let u = ROOTS[hypothesis as usize] as f64;

    let mut seq = [Complex32::new(0.0, 0.0); SYNC_LEN];
    for (n, value) in seq.iter_mut().enumerate() {
        let n = n as f64;
        let arg = if n < 31.0 {
            -PI * u * n * (n + 1.0) / 63.0
        } else {
            -PI * u * (n + 1.0) * (n + 2.0) / 63.0
        };
        *value = Complex32::new(arg.cos() as f32, arg.sin() as f32);
    }
    Ok(seq)
}

/// Correlation reference for one group hypothesis
///
/// `time` is one useful symbol (no prefix) scaled to unit mean power, so
/// `sum(|time|^2) == fft_size`. A non-zero `shift` moves every element up by
/// that many subcarriers, which is what a cell received with an integer
/// frequency offset looks like.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceWaveform {
    hypothesis: u8,
    shift: i8,
    fft_size: usize,
    freq: [Complex32; SYNC_LEN],
    time: Vec<Complex32>,
}

impl ReferenceWaveform {
    pub fn hypothesis(&self) -> u8 {
        self.hypothesis
    }

    /// Subcarrier shift, 0 for the nominal reference
    pub fn shift(&self) -> i8 {
        self.shift
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// The 62 subcarrier values, lowest subcarrier first
    pub fn freq(&self) -> &[Complex32; SYNC_LEN] {
        &self.freq
    }

    pub fn time(&self) -> &[Complex32] {
        &self.time
    }

    /// Sum of |r|^2 over the time waveform
    pub fn energy(&self) -> f32 {
        self.time.iter().map(|s| s.norm_sqr()).sum()
    }
}

/// Builds time-domain PSS references for a fixed transform size
pub struct ReferenceGenerator {
    fft_size: usize,
    ifft: Arc<dyn Fft<f32>>,
}

impl ReferenceGenerator {
    pub fn new(fft_size: usize) -> Result<Self> {
        validate_fft_size(fft_size)?;
        let mut planner = FftPlanner::<f32>::new();
        let ifft = planner.plan_fft_inverse(fft_size);
        Ok(Self { fft_size, ifft })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Generate the reference waveform for `hypothesis` (0..=2)
    pub fn generate(&self, hypothesis: u8) -> Result<ReferenceWaveform> {
        self.generate_shifted(hypothesis, 0)
    }

    /// Reference for `hypothesis` moved by `shift` subcarriers
    pub fn generate_shifted(&self, hypothesis: u8, shift: i8) -> Result<ReferenceWaveform> {
        let freq = pss_sequence(hypothesis)?;
        let edge = (SYNC_LEN / 2) as i32 + shift.unsigned_abs() as i32;
        if edge >= (self.fft_size / 2) as i32 {
            return Err(SyncError::invalid(format!(
                "shift {} moves the PSS outside a {}-point transform",
                shift, self.fft_size
            )));
        }

        let mut time = vec![Complex32::new(0.0, 0.0); self.fft_size];
        for (i, &value) in freq.iter().enumerate() {
            time[subcarrier_bin(sync_subcarrier(i) + shift as i32, self.fft_size)] = value;
        }
        self.ifft.process(&mut time);

        let scale = 1.0 / (SYNC_LEN as f32).sqrt();
        for s in time.iter_mut() {
            *s *= scale;
        }

        debug!(
            hypothesis,
            shift,
            fft_size = self.fft_size,
            "generated PSS reference"
        );

        Ok(ReferenceWaveform {
            hypothesis,
            shift,
            fft_size: self.fft_size,
            freq,
            time,
        })
    }
}
