//! Synthetic LTE downlink
//!
//! Produces one subframe at a time: QPSK on every occupied subcarrier,
//! PSS and SSS in the last two symbols of slot 0 in subframes 0 and 5 (the
//! rest of the central 72 subcarriers stays empty there). All symbols are
//! scaled to unit mean power.

use std::sync::Arc;

use rand::prelude::*;
use rand::rngs::StdRng;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::error::{Result, SyncError};
use crate::frame::{subcarrier_bin, subframe_len, symbol_size, CpKind, HalfFrame, SUBFRAMES_PER_FRAME};
use crate::sequence::{pss_sequence, sss_sequence, sync_subcarrier, SYNC_LEN};

/// Half-width of the band reserved around the sync signals
const SYNC_BAND: i32 = 36;

/// Cell being transmitted
#[derive(Debug, Clone)]
pub struct CellConfig {
    pub nof_prb: usize,
    pub secondary_id: u16,
    pub group_hypothesis: u8,
    pub cp: CpKind,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            nof_prb: 6,
            secondary_id: 0,
            group_hypothesis: 0,
            cp: CpKind::Normal,
        }
    }
}

enum SymbolContent {
    Data,
    Pss,
    Sss(HalfFrame),
}

pub struct DownlinkGenerator {
    fft_size: usize,
    nof_prb: usize,
    cp: CpKind,
    pss: [Complex32; SYNC_LEN],
    sss: [[f32; SYNC_LEN]; 2],
    ifft: Arc<dyn Fft<f32>>,
    rng: StdRng,
    subframe_index: u8,
    scale: f32,
    buffer: Vec<Complex32>,
}

impl DownlinkGenerator {
    pub fn new(cell: &CellConfig, seed: u64) -> Result<Self> {
        let fft_size = symbol_size(cell.nof_prb)?;
        if cell.secondary_id >= 168 {
            return Err(SyncError::invalid(format!(
                "secondary id {} out of range 0..=167",
                cell.secondary_id
            )));
        }

        let pss = pss_sequence(cell.group_hypothesis)?;
        let sss = [
            sss_sequence(cell.secondary_id, cell.group_hypothesis, HalfFrame::First)?,
            sss_sequence(cell.secondary_id, cell.group_hypothesis, HalfFrame::Second)?,
        ];

        let mut planner = FftPlanner::<f32>::new();
        Ok(Self {
            fft_size,
            nof_prb: cell.nof_prb,
            cp: cell.cp,
            pss,
            sss,
            ifft: planner.plan_fft_inverse(fft_size),
            rng: StdRng::seed_from_u64(seed),
            subframe_index: 0,
            scale: 1.0 / ((12 * cell.nof_prb) as f32).sqrt(),
            buffer: vec![Complex32::new(0.0, 0.0); fft_size],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Index of the subframe the next call produces
    pub fn subframe_index(&self) -> u8 {
        self.subframe_index
    }

    fn qpsk(&mut self) -> Complex32 {
        let a = std::f32::consts::FRAC_1_SQRT_2;
        let bits: u8 = self.rng.random_range(0..4);
        Complex32::new(
            if bits & 1 == 0 { a } else { -a },
            if bits & 2 == 0 { a } else { -a },
        )
    }

    fn render_symbol(&mut self, content: SymbolContent, cp_len: usize, out: &mut Vec<Complex32>) {
        let n = self.fft_size;
        let half = 6 * self.nof_prb as i32;
        let mut freq = vec![Complex32::new(0.0, 0.0); n];

        let sync_symbol = !matches!(content, SymbolContent::Data);
        for k in (-half..=half).filter(|&k| k != 0) {
            if sync_symbol && k.abs() <= SYNC_BAND {
                continue;
            }
            freq[subcarrier_bin(k, n)] = self.qpsk();
        }
        match content {
            SymbolContent::Data => {}
            SymbolContent::Pss => {
                for (i, &d) in self.pss.iter().enumerate() {
                    freq[subcarrier_bin(sync_subcarrier(i), n)] = d;
                }
            }
            SymbolContent::Sss(half_frame) => {
                let seq = &self.sss[match half_frame {
                    HalfFrame::First => 0,
                    HalfFrame::Second => 1,
                }];
                for (i, &d) in seq.iter().enumerate() {
                    freq[subcarrier_bin(sync_subcarrier(i), n)] = Complex32::new(d, 0.0);
                }
            }
        }

        self.buffer.copy_from_slice(&freq);
        self.ifft.process(&mut self.buffer);
        for s in self.buffer.iter_mut() {
            *s *= self.scale;
        }
        out.extend_from_slice(&self.buffer[n - cp_len..]);
        out.extend_from_slice(&self.buffer);
    }

    /// Append the next subframe to `out`
    pub fn write_subframe(&mut self, out: &mut Vec<Complex32>) {
        let n = self.fft_size;
        let symbols = self.cp.symbols_per_slot();
        let half_frame = HalfFrame::from_subframe(self.subframe_index);

        for slot in 0..2 {
            for l in 0..symbols {
                let content = match half_frame {
                    Some(_) if slot == 0 && l == symbols - 1 => SymbolContent::Pss,
                    Some(hf) if slot == 0 && l == symbols - 2 => SymbolContent::Sss(hf),
                    _ => SymbolContent::Data,
                };
                let cp_len = self.cp.symbol_cp_len(l, n);
                self.render_symbol(content, cp_len, out);
            }
        }

        self.subframe_index = (self.subframe_index + 1) % SUBFRAMES_PER_FRAME;
    }

    pub fn next_subframe(&mut self) -> Vec<Complex32> {
        let mut out = Vec::with_capacity(subframe_len(self.fft_size));
        self.write_subframe(&mut out);
        out
    }
}
