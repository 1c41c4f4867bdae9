//! Carrier frequency offset correction
//!
//! Offsets are in units of the subcarrier spacing, so a full cycle takes
//! `fft_size / cfo` samples.

use rustfft::num_complex::Complex32;

/// Smoothing factor of the running CFO estimate
pub const CFO_EMA_ALPHA: f32 = 0.1;

/// Largest fractional estimate (7 kHz at 15 kHz spacing) that still enters
/// the running average once it is seeded
pub const MAX_CFO_OFFSET: f32 = 7000.0 / 15000.0;

/// Offsets below this are not worth a pass over the block
const CFO_TOLERANCE: f32 = 1e-5;

pub struct CfoCorrector {
    fft_size: usize,
}

impl CfoCorrector {
    pub fn new(fft_size: usize) -> Self {
        Self { fft_size }
    }

    /// Remove an offset of `cfo` subcarriers: x[n] * exp(-j 2 pi cfo n / N)
    pub fn correct(&self, samples: &mut [Complex32], cfo: f32) {
        if cfo.abs() < CFO_TOLERANCE {
            return;
        }
        let step = -2.0 * std::f64::consts::PI * cfo as f64 / self.fft_size as f64;
        for (n, s) in samples.iter_mut().enumerate() {
            let phase = step * n as f64;
            *s *= Complex32::new(phase.cos() as f32, phase.sin() as f32);
        }
    }
}

/// Exponential moving average seeded by its first value
pub(crate) fn ema_update(average: Option<f32>, value: f32, alpha: f32) -> f32 {
    match average {
        Some(avg) => alpha * value + (1.0 - alpha) * avg,
        None => value,
    }
}

/// Cumulative moving average after `count` previous values
pub(crate) fn cma_update(average: f32, value: f32, count: u64) -> f32 {
    average + (value - average) / (count + 1) as f32
}
