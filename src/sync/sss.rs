//! Secondary synchronization decoding
//!
//! The PSS symbol doubles as a channel estimate for the SSS symbol right in
//! front of it. After equalization the SSS subcarriers are correlated against
//! every (secondary id, half frame) candidate for the detected hypothesis.

use rustfft::num_complex::Complex32;
use tracing::{debug, trace};

use super::fft::SymbolTransform;
use crate::error::{Result, SyncError};
use crate::frame::{sss_offset, CpKind, HalfFrame};
use crate::sequence::pss::check_hypothesis;
use crate::sequence::{pss_sequence, sss_sequence, NUM_HYPOTHESES, NUM_SECONDARY_IDS, SYNC_LEN};

/// Default minimum normalized correlation for a resolved identity
pub const DEFAULT_SSS_THRESHOLD: f32 = 0.5;

/// A resolved secondary signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondaryMatch {
    pub secondary_id: u16,
    pub half_frame: HalfFrame,
    /// Normalized correlation in [0, 1]
    pub correlation: f32,
}

struct Candidate {
    secondary_id: u16,
    half_frame: HalfFrame,
    sequence: [f32; SYNC_LEN],
}

pub struct GroupIdentityDecoder {
    fft_size: usize,
    threshold: f32,
    dft: SymbolTransform,
    pss: Vec<[Complex32; SYNC_LEN]>,
    /// Candidates per hypothesis, built on first use
    candidates: Vec<Vec<Candidate>>,
}

fn build_candidates(hypothesis: u8) -> Result<Vec<Candidate>> {
    let mut out = Vec::with_capacity(2 * NUM_SECONDARY_IDS as usize);
    for secondary_id in 0..NUM_SECONDARY_IDS {
        for half_frame in [HalfFrame::First, HalfFrame::Second] {
            out.push(Candidate {
                secondary_id,
                half_frame,
                sequence: sss_sequence(secondary_id, hypothesis, half_frame)?,
            });
        }
    }
    Ok(out)
}

impl GroupIdentityDecoder {
    pub fn new(fft_size: usize, threshold: f32) -> Result<Self> {
        let pss = (0..NUM_HYPOTHESES)
            .map(pss_sequence)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            fft_size,
            threshold,
            dft: SymbolTransform::new(fft_size),
            pss,
            candidates: (0..NUM_HYPOTHESES).map(|_| Vec::new()).collect(),
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Equalized SSS subcarriers for the PSS at `peak_position`
    fn equalized(
        &mut self,
        samples: &[Complex32],
        peak_position: usize,
        hypothesis: u8,
        cp: CpKind,
        cfo: Option<f32>,
    ) -> Result<[Complex32; SYNC_LEN]> {
        let n = self.fft_size;
        let offset = sss_offset(n, cp);
        if peak_position < offset {
            return Err(SyncError::InsufficientSamples {
                needed: offset,
                available: peak_position,
            });
        }
        if peak_position + n > samples.len() {
            return Err(SyncError::InsufficientSamples {
                needed: peak_position + n,
                available: samples.len(),
            });
        }

        let sss_start = peak_position - offset;
        let y_pss = self.dft.sync_subcarriers(&samples[peak_position..peak_position + n]);
        let y_sss = self.dft.sync_subcarriers(&samples[sss_start..sss_start + n]);

        // phase drift across one symbol plus prefix
        let rotation = cfo
            .map(|c| Complex32::from_polar(1.0, 2.0 * std::f32::consts::PI * c * offset as f32 / n as f32))
            .unwrap_or(Complex32::new(1.0, 0.0));

        let d = &self.pss[hypothesis as usize];
        let mut y = [Complex32::new(0.0, 0.0); SYNC_LEN];
        for i in 0..SYNC_LEN {
            let channel = y_pss[i] * d[i].conj();
            y[i] = y_sss[i] * channel.conj() * rotation;
        }
        Ok(y)
    }

    /// Resolve the secondary id and half frame of the PSS at `peak_position`
    ///
    /// Returns `Ok(None)` when the best candidate stays below the threshold.
    pub fn decode(
        &mut self,
        samples: &[Complex32],
        peak_position: usize,
        hypothesis: u8,
        cp: CpKind,
        cfo: Option<f32>,
    ) -> Result<Option<SecondaryMatch>> {
        check_hypothesis(hypothesis)?;

        let y = self.equalized(samples, peak_position, hypothesis, cp, cfo)?;
        let energy: f32 = y.iter().map(|v| v.norm_sqr()).sum();
        if energy <= 0.0 {
            return Ok(None);
        }

        let h = hypothesis as usize;
        if self.candidates[h].is_empty() {
            self.candidates[h] = build_candidates(hypothesis)?;
        }

        let mut best: Option<(&Candidate, f32)> = None;
        for candidate in self.candidates[h].iter() {
            let metric: f32 = candidate
                .sequence
                .iter()
                .zip(y.iter())
                .map(|(&d, v)| d * v.re)
                .sum();
            if best.map_or(true, |(_, m)| metric > m) {
                best = Some((candidate, metric));
            }
        }

        let norm = (SYNC_LEN as f32).sqrt() * energy.sqrt();
        let Some((candidate, metric)) = best else {
            return Ok(None);
        };
        let correlation = metric / norm;
        trace!(
            secondary_id = candidate.secondary_id,
            half_frame = ?candidate.half_frame,
            correlation,
            "best secondary candidate"
        );

        if correlation < self.threshold {
            debug!(correlation, threshold = self.threshold, "secondary signal unresolved");
            return Ok(None);
        }

        Ok(Some(SecondaryMatch {
            secondary_id: candidate.secondary_id,
            half_frame: candidate.half_frame,
            correlation,
        }))
    }
}
