//! Secondary synchronization signal
//!
//! Two interleaved length-31 m-sequences scrambled by the group hypothesis.
//! The (m0, m1) shift pair encodes the secondary id; the order of the halves
//! encodes subframe 0 versus subframe 5.

use lazy_static::lazy_static;

use crate::error::{Result, SyncError};
use crate::frame::HalfFrame;
use crate::sequence::pss::{check_hypothesis, SYNC_LEN};

/// Length of each m-sequence
pub const M_SEQ_LEN: usize = 31;

/// Number of secondary ids (N_ID_1)
pub const NUM_SECONDARY_IDS: u16 = 168;

/// The three ±1 base sequences s̃, c̃ and z̃
#[derive(Debug, Clone)]
pub struct SecondaryTables {
    pub s: [f32; M_SEQ_LEN],
    pub c: [f32; M_SEQ_LEN],
    pub z: [f32; M_SEQ_LEN],
}

/// 5-stage LFSR, x(i+5) = sum of x(i+t) over `taps` (mod 2), seeded 00001
fn m_sequence(taps: &[usize]) -> [f32; M_SEQ_LEN] {
    let mut x = [0u8; M_SEQ_LEN];
    x[4] = 1;
    for i in 0..M_SEQ_LEN - 5 {
        x[i + 5] = taps.iter().fold(0, |acc, &t| acc ^ x[i + t]);
    }

    let mut out = [0.0f32; M_SEQ_LEN];
    for (o, &bit) in out.iter_mut().zip(x.iter()) {
        *o = 1.0 - 2.0 * bit as f32;
    }
    out
}

impl SecondaryTables {
    pub fn new() -> Self {
        Self {
            s: m_sequence(&[2, 0]),
            c: m_sequence(&[3, 0]),
            z: m_sequence(&[4, 2, 1, 0]),
        }
    }
}

impl Default for SecondaryTables {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref TABLES: SecondaryTables = SecondaryTables::new();

    /// (m0, m1) -> secondary id
    static ref M_TO_ID: [[Option<u8>; M_SEQ_LEN]; M_SEQ_LEN] = {
        let mut table = [[None; M_SEQ_LEN]; M_SEQ_LEN];
        for id in 0..NUM_SECONDARY_IDS {
            let (m0, m1) = shift_pair(id);
            table[m0][m1] = Some(id as u8);
        }
        table
    };
}

fn shift_pair(secondary_id: u16) -> (usize, usize) {
    let n1 = secondary_id as usize;
    let q_prime = n1 / 30;
    let q = (n1 + q_prime * (q_prime + 1) / 2) / 30;
    let m_prime = n1 + q * (q + 1) / 2;
    let m0 = m_prime % 31;
    let m1 = (m0 + m_prime / 31 + 1) % 31;
    (m0, m1)
}

fn check_secondary_id(secondary_id: u16) -> Result<()> {
    if secondary_id >= NUM_SECONDARY_IDS {
        return Err(SyncError::invalid(format!(
            "secondary id {} out of range 0..=167",
            secondary_id
        )));
    }
    Ok(())
}

/// Shared base sequences
pub fn secondary_tables() -> &'static SecondaryTables {
    &TABLES
}

/// Cyclic shifts (m0, m1) for a secondary id
pub fn m0_m1(secondary_id: u16) -> Result<(usize, usize)> {
    check_secondary_id(secondary_id)?;
    Ok(shift_pair(secondary_id))
}

/// Reverse lookup of the shift pair; `None` for pairs no id uses
pub fn secondary_id_from_m(m0: usize, m1: usize) -> Option<u16> {
    M_TO_ID
        .get(m0)
        .and_then(|row| row.get(m1))
        .copied()
        .flatten()
        .map(u16::from)
}

/// The 62 SSS values for a cell, lowest subcarrier first
pub fn sss_sequence(secondary_id: u16, hypothesis: u8, half: HalfFrame) -> Result<[f32; SYNC_LEN]> {
    check_hypothesis(hypothesis)?;
    let (m0, m1) = m0_m1(secondary_id)?;
    let t = secondary_tables();
    let n2 = hypothesis as usize;

    let mut d = [0.0f32; SYNC_LEN];
    for n in 0..M_SEQ_LEN {
        let s0 = t.s[(n + m0) % 31];
        let s1 = t.s[(n + m1) % 31];
        let c0 = t.c[(n + n2) % 31];
        let c1 = t.c[(n + n2 + 3) % 31];
        let z_m0 = t.z[(n + m0 % 8) % 31];
        let z_m1 = t.z[(n + m1 % 8) % 31];

        let (even, odd) = match half {
            HalfFrame::First => (s0 * c0, s1 * c1 * z_m0),
            HalfFrame::Second => (s1 * c0, s0 * c1 * z_m1),
        };
        d[2 * n] = even;
        d[2 * n + 1] = odd;
    }
    Ok(d)
}
