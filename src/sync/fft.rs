///! Transform helpers shared by the sync components
///!
///! Owns pre-planned rustfft transforms and their scratch space so the
///! per-block paths never allocate.

use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::frame::subcarrier_bin;
use crate::sequence::{sync_subcarrier, SYNC_LEN};

/// Forward DFT of one useful OFDM symbol, reduced to the 62 sync subcarriers
pub(crate) struct SymbolTransform {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl SymbolTransform {
    pub(crate) fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Self {
            fft_size,
            fft,
            buffer: vec![Complex32::new(0.0, 0.0); fft_size],
            scratch,
        }
    }

    /// Transform `symbol` (exactly `fft_size` samples) and pick the sync
    /// subcarriers, lowest subcarrier first
    pub(crate) fn sync_subcarriers(&mut self, symbol: &[Complex32]) -> [Complex32; SYNC_LEN] {
        debug_assert_eq!(symbol.len(), self.fft_size);
        self.buffer.copy_from_slice(symbol);
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let mut out = [Complex32::new(0.0, 0.0); SYNC_LEN];
        for (i, value) in out.iter_mut().enumerate() {
            *value = self.buffer[subcarrier_bin(sync_subcarrier(i), self.fft_size)];
        }
        out
    }
}

/// Linear cross-correlation through one forward and one inverse transform
/// of length `len`
pub(crate) struct ConvolutionPlan {
    len: usize,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
}

impl ConvolutionPlan {
    pub(crate) fn new(len: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        Self {
            len,
            forward,
            inverse,
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn forward(&mut self, buffer: &mut [Complex32]) {
        self.forward.process_with_scratch(buffer, &mut self.scratch);
    }

    /// Multiply by a precomputed spectrum and transform back (unscaled)
    pub(crate) fn apply(&mut self, buffer: &mut [Complex32], spectrum: &[Complex32]) {
        for (x, h) in buffer.iter_mut().zip(spectrum.iter()) {
            *x *= *h;
        }
        self.inverse.process_with_scratch(buffer, &mut self.scratch);
    }
}
