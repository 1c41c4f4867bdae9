//! PSS correlation
//!
//! Cross-correlates a search span of the block with a time-domain reference
//! by FFT convolution. A candidate alignment `m` correlates the reference
//! with `samples[search_offset + m ..]`; alignments that run past the end of
//! the block see zeros.

use rustfft::num_complex::Complex32;
use tracing::trace;

use super::fft::{ConvolutionPlan, SymbolTransform};
use crate::error::{Result, SyncError};
use crate::frame::validate_fft_size;
use crate::sequence::ReferenceWaveform;

/// Result of one correlation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationResult {
    /// Absolute index in the block of the first sample of the reference symbol
    pub peak_position: usize,
    /// Peak magnitude divided by the root energy of the reference
    pub peak_value: f32,
    /// Mean magnitude over all candidate alignments (noise floor)
    pub mean_value: f32,
}

pub struct Correlator {
    block_len: usize,
    search_len: usize,
    fft_size: usize,
    plan: ConvolutionPlan,
    buffer: Vec<Complex32>,
    /// Conjugated spectrum of the zero-padded reference
    reference_spectrum: Vec<Complex32>,
    reference_norm: f32,
    cached: Option<(u8, i8)>,
    magnitudes: Vec<f32>,
    dft: SymbolTransform,
}

impl Correlator {
    /// # Arguments
    /// * `block_len` - Samples per block handed to `find`
    /// * `search_len` - Number of candidate alignments per call
    /// * `fft_size` - Useful symbol length, equal to the reference length
    pub fn new(block_len: usize, search_len: usize, fft_size: usize) -> Result<Self> {
        validate_fft_size(fft_size)?;
        if block_len < fft_size {
            return Err(SyncError::invalid(format!(
                "block length {} shorter than transform size {}",
                block_len, fft_size
            )));
        }
        if search_len == 0 || search_len > block_len {
            return Err(SyncError::invalid(format!(
                "search length {} must be in 1..={}",
                search_len, block_len
            )));
        }

        let conv_len = search_len + 2 * fft_size;
        Ok(Self {
            block_len,
            search_len,
            fft_size,
            plan: ConvolutionPlan::new(conv_len),
            buffer: vec![Complex32::new(0.0, 0.0); conv_len],
            reference_spectrum: vec![Complex32::new(0.0, 0.0); conv_len],
            reference_norm: 0.0,
            cached: None,
            magnitudes: Vec::with_capacity(search_len),
            dft: SymbolTransform::new(fft_size),
        })
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    pub fn search_len(&self) -> usize {
        self.search_len
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    fn load_reference(&mut self, reference: &ReferenceWaveform) {
        let key = (reference.hypothesis(), reference.shift());
        if self.cached == Some(key) {
            return;
        }

        self.reference_spectrum.fill(Complex32::new(0.0, 0.0));
        self.reference_spectrum[..self.fft_size].copy_from_slice(reference.time());
        self.plan.forward(&mut self.reference_spectrum);
        for s in self.reference_spectrum.iter_mut() {
            *s = s.conj();
        }
        self.reference_norm = reference.energy().sqrt();
        self.cached = Some(key);
        trace!(
            hypothesis = reference.hypothesis(),
            shift = reference.shift(),
            "cached reference spectrum"
        );
    }

    /// Locate the strongest alignment of `reference` at or after `search_offset`
    pub fn find(
        &mut self,
        samples: &[Complex32],
        reference: &ReferenceWaveform,
        search_offset: usize,
    ) -> Result<CorrelationResult> {
        if samples.len() != self.block_len {
            return Err(SyncError::ConfigurationMismatch {
                expected: self.block_len,
                actual: samples.len(),
            });
        }
        if search_offset >= self.block_len {
            return Err(SyncError::ConfigurationMismatch {
                expected: self.block_len,
                actual: search_offset,
            });
        }
        if reference.fft_size() != self.fft_size {
            return Err(SyncError::ConfigurationMismatch {
                expected: self.fft_size,
                actual: reference.fft_size(),
            });
        }

        self.load_reference(reference);

        let candidates = self.search_len.min(self.block_len - search_offset);
        let data_end = (search_offset + candidates + self.fft_size - 1).min(self.block_len);
        let data = &samples[search_offset..data_end];

        self.buffer.fill(Complex32::new(0.0, 0.0));
        self.buffer[..data.len()].copy_from_slice(data);
        self.plan.forward(&mut self.buffer);
        self.plan.apply(&mut self.buffer, &self.reference_spectrum);

        let scale = 1.0 / (self.plan.len() as f32 * self.reference_norm);
        self.magnitudes.clear();
        self.magnitudes
            .extend(self.buffer[..candidates].iter().map(|c| c.norm() * scale));

        let mut peak_index = 0;
        let mut peak_value = f32::NEG_INFINITY;
        let mut sum = 0.0f32;
        for (m, &magnitude) in self.magnitudes.iter().enumerate() {
            if magnitude > peak_value {
                peak_value = magnitude;
                peak_index = m;
            }
            sum += magnitude;
        }

        let result = CorrelationResult {
            peak_position: search_offset + peak_index,
            peak_value,
            mean_value: sum / candidates as f32,
        };
        trace!(
            peak_position = result.peak_position,
            peak_value = result.peak_value,
            mean_value = result.mean_value,
            "correlation"
        );
        Ok(result)
    }

    /// Correlation magnitudes of the last `find`, one per candidate alignment
    pub fn profile(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Root energy of the symbol starting at `position`, if it fits in the block
    pub fn symbol_energy(&self, samples: &[Complex32], position: usize) -> Option<f32> {
        let window = samples.get(position..position + self.fft_size)?;
        Some(window.iter().map(|s| s.norm_sqr()).sum::<f32>().sqrt())
    }

    /// Root energy of the symbol at `position` restricted to the 62 sync
    /// subcarriers, on the same scale as `symbol_energy`
    ///
    /// The reference only sees these subcarriers, so this is the energy a
    /// perfect match is measured against whatever else the symbol carries.
    pub fn sync_band_energy(&mut self, samples: &[Complex32], position: usize) -> Option<f32> {
        let window = samples.get(position..position + self.fft_size)?;
        let bins = self.dft.sync_subcarriers(window);
        let energy = bins.iter().map(|b| b.norm_sqr()).sum::<f32>() / self.fft_size as f32;
        Some(energy.sqrt())
    }

    /// Root energy of whatever part of the symbol at `position` is inside the block
    pub(crate) fn partial_energy(&self, samples: &[Complex32], position: usize) -> f32 {
        let end = (position + self.fft_size).min(samples.len());
        samples
            .get(position..end)
            .map(|w| w.iter().map(|s| s.norm_sqr()).sum::<f32>().sqrt())
            .unwrap_or(0.0)
    }

    /// Fractional CFO (in subcarrier spacings) from the phase drift between
    /// the two halves of the correlation product at `position`
    pub fn estimate_cfo(
        &self,
        samples: &[Complex32],
        position: usize,
        reference: &ReferenceWaveform,
    ) -> Option<f32> {
        let window = samples.get(position..position + self.fft_size)?;
        let half = self.fft_size / 2;
        let r = reference.time();

        let dot = |range: std::ops::Range<usize>| -> Complex32 {
            range.map(|n| window[n] * r[n].conj()).sum()
        };
        let y0 = dot(0..half);
        let y1 = dot(half..self.fft_size);

        Some((y0.conj() * y1).arg() / std::f32::consts::PI)
    }
}
