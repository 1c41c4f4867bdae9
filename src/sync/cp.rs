//! Cyclic prefix length detection
//!
//! The prefix of an OFDM symbol repeats its tail. For each hypothesis the two
//! symbols ending at the PSS are checked: correlation of the assumed prefix
//! against the matching tail, divided by the prefix energy. The true prefix
//! length gives a ratio near 1.

use rustfft::num_complex::Complex32;
use tracing::trace;

use crate::error::{Result, SyncError};
use crate::frame::CpKind;

/// Smoothing factor of the per-hypothesis ratio averages
pub const CP_EMA_ALPHA: f32 = 0.1;

/// Symbols before the PSS end that are examined
const CP_WINDOWS: usize = 2;

pub struct CpClassifier {
    fft_size: usize,
    current: CpKind,
    normal_avg: f32,
    extended_avg: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct PrefixCorrelation {
    real: f32,
    energy: f32,
}

impl PrefixCorrelation {
    fn ratio(&self) -> f32 {
        if self.energy > 0.0 {
            self.real / self.energy
        } else {
            0.0
        }
    }
}

fn ema(value: f32, average: f32, alpha: f32) -> f32 {
    alpha * value + (1.0 - alpha) * average
}

impl CpClassifier {
    pub fn new(fft_size: usize, initial: CpKind) -> Self {
        Self {
            fft_size,
            current: initial,
            normal_avg: 0.0,
            extended_avg: 0.0,
        }
    }

    /// Last decided hypothesis
    pub fn current(&self) -> CpKind {
        self.current
    }

    pub fn set_current(&mut self, cp: CpKind) {
        self.current = cp;
    }

    /// Smoothed (normal, extended) ratios
    pub fn averages(&self) -> (f32, f32) {
        (self.normal_avg, self.extended_avg)
    }

    pub fn reset(&mut self) {
        self.normal_avg = 0.0;
        self.extended_avg = 0.0;
    }

    /// Samples needed before the end of the PSS symbol
    pub fn min_history(&self) -> usize {
        CP_WINDOWS * (self.fft_size + CpKind::Extended.cp_len(self.fft_size))
    }

    fn correlate(&self, samples: &[Complex32], symbol_end: usize, cp_len: usize) -> PrefixCorrelation {
        let n = self.fft_size;
        let mut acc = PrefixCorrelation::default();
        for i in 1..=CP_WINDOWS {
            let start = symbol_end - i * (n + cp_len);
            let prefix = &samples[start..start + cp_len];
            let tail = &samples[start + n..start + n + cp_len];
            for (p, t) in prefix.iter().zip(tail.iter()) {
                acc.real += (t * p.conj()).re;
                acc.energy += p.norm_sqr();
            }
        }
        acc
    }

    /// Decide the prefix length from the symbols before `peak_position`
    ///
    /// On `InsufficientSamples` the averages and the current hypothesis are
    /// left untouched.
    pub fn classify(&mut self, samples: &[Complex32], peak_position: usize) -> Result<CpKind> {
        let symbol_end = peak_position + self.fft_size;
        if symbol_end > samples.len() {
            return Err(SyncError::InsufficientSamples {
                needed: symbol_end,
                available: samples.len(),
            });
        }
        if symbol_end < self.min_history() {
            return Err(SyncError::InsufficientSamples {
                needed: self.min_history(),
                available: symbol_end,
            });
        }

        let normal = self.correlate(samples, symbol_end, CpKind::Normal.cp_len(self.fft_size));
        let extended = self.correlate(samples, symbol_end, CpKind::Extended.cp_len(self.fft_size));

        self.normal_avg = ema(normal.ratio(), self.normal_avg, CP_EMA_ALPHA);
        self.extended_avg = ema(extended.ratio(), self.extended_avg, CP_EMA_ALPHA);

        self.current = if self.normal_avg > self.extended_avg {
            CpKind::Normal
        } else if self.normal_avg < self.extended_avg {
            CpKind::Extended
        } else if normal.real > extended.real {
            CpKind::Normal
        } else {
            CpKind::Extended
        };

        trace!(
            normal = self.normal_avg,
            extended = self.extended_avg,
            decided = ?self.current,
            "cp ratios"
        );
        Ok(self.current)
    }
}
