//! LTE downlink frame geometry
//!
//! Lengths are in samples at the configured transform size `N`. A subframe is
//! `15 * N` samples (1 ms) and holds two slots. A normal-CP slot carries seven
//! symbols (the first one with a longer prefix), an extended-CP slot six.
//!
//! The PSS is the last symbol of slot 0 in subframes 0 and 5, so its useful
//! part starts `L/2 - N` samples into the subframe for either CP length. The
//! SSS is the symbol right before it.

use crate::error::{Result, SyncError};

/// Number of subframes in a radio frame
pub const SUBFRAMES_PER_FRAME: u8 = 10;

/// Smallest supported transform size (6 resource blocks)
pub const MIN_FFT_SIZE: usize = 128;

/// Largest supported transform size (30.72 Msps)
pub const MAX_FFT_SIZE: usize = 2048;

/// Cyclic prefix length hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpKind {
    #[default]
    Normal,
    Extended,
}

impl CpKind {
    /// Prefix length of every symbol except the first one of a slot
    pub fn cp_len(self, fft_size: usize) -> usize {
        match self {
            CpKind::Normal => 144 * fft_size / 2048,
            CpKind::Extended => fft_size / 4,
        }
    }

    /// Prefix length of the first symbol of a slot
    pub fn first_cp_len(self, fft_size: usize) -> usize {
        match self {
            CpKind::Normal => 160 * fft_size / 2048,
            CpKind::Extended => fft_size / 4,
        }
    }

    pub fn symbols_per_slot(self) -> usize {
        match self {
            CpKind::Normal => 7,
            CpKind::Extended => 6,
        }
    }

    /// Prefix length of symbol `l` within a slot
    pub fn symbol_cp_len(self, l: usize, fft_size: usize) -> usize {
        if l == 0 {
            self.first_cp_len(fft_size)
        } else {
            self.cp_len(fft_size)
        }
    }
}

/// Which half of the radio frame carried the synchronization signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfFrame {
    /// Subframe 0
    First,
    /// Subframe 5
    Second,
}

impl HalfFrame {
    pub fn subframe_index(self) -> u8 {
        match self {
            HalfFrame::First => 0,
            HalfFrame::Second => 5,
        }
    }

    pub fn from_subframe(index: u8) -> Option<Self> {
        match index {
            0 => Some(HalfFrame::First),
            5 => Some(HalfFrame::Second),
            _ => None,
        }
    }
}

/// Transform size for a channel bandwidth given in resource blocks
pub fn symbol_size(nof_prb: usize) -> Result<usize> {
    let size = match nof_prb {
        6 => 128,
        15 => 256,
        25 => 384,
        50 => 768,
        75 => 1024,
        100 => 1536,
        other => {
            return Err(SyncError::invalid(format!(
                "unsupported number of resource blocks: {}",
                other
            )))
        }
    };
    Ok(size)
}

/// Check a transform size: a multiple of 128 within 128..=2048 keeps every
/// prefix length an integer
pub fn validate_fft_size(fft_size: usize) -> Result<()> {
    if fft_size < MIN_FFT_SIZE || fft_size > MAX_FFT_SIZE || fft_size % 128 != 0 {
        return Err(SyncError::invalid(format!(
            "transform size {} must be a multiple of 128 in {}..={}",
            fft_size, MIN_FFT_SIZE, MAX_FFT_SIZE
        )));
    }
    Ok(())
}

/// Samples per subframe
pub fn subframe_len(fft_size: usize) -> usize {
    15 * fft_size
}

pub fn slot_len(fft_size: usize) -> usize {
    subframe_len(fft_size) / 2
}

/// Offset of the PSS useful part from the start of subframe 0 or 5
pub fn pss_position(fft_size: usize) -> usize {
    slot_len(fft_size) - fft_size
}

/// Offset of the SSS useful part relative to the PSS useful part
pub fn sss_offset(fft_size: usize, cp: CpKind) -> usize {
    fft_size + cp.cp_len(fft_size)
}

/// FFT bin of subcarrier `k` (DC at 0, negative subcarriers wrapped)
pub fn subcarrier_bin(k: i32, fft_size: usize) -> usize {
    if k < 0 {
        (fft_size as i32 + k) as usize
    } else {
        k as usize
    }
}
