//! Reference sequences for LTE cell search
//!
//! - `pss` - Zadoff-Chu primary sequences and their time-domain correlation
//!   references
//! - `sss` - m-sequence tables and the secondary-id shift table
//!
//! Everything here is pure and can be computed before any samples exist.

pub mod pss;
pub mod sss;

pub use pss::{
    pss_sequence, sync_subcarrier, ReferenceGenerator, ReferenceWaveform, NUM_HYPOTHESES,
    SYNC_LEN,
};
pub use sss::{
    m0_m1, secondary_id_from_m, secondary_tables, sss_sequence, SecondaryTables, M_SEQ_LEN,
    NUM_SECONDARY_IDS,
};
