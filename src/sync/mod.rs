///! LTE cell synchronization
///!
///! One `CellSynchronizer::attempt` runs the full detection chain on a block:
///!
///! 1. Correlate against the PSS reference(s) (`correlator`), optionally
///!    also moved by one subcarrier either way to catch an integer CFO
///! 2. Normalize the peak by the running in-band received energy
///! 3. Below threshold: stop, this is the common case
///! 4. Estimate the fractional CFO from the PSS halves (`cfo`)
///! 5. Decide the prefix length (`cp`) and decode the SSS (`sss`)
///!
///! **Module Organization**:
///! - `fft` - pre-planned rustfft transforms
///! - `correlator` - FFT correlation, symbol energy, CFO estimate
///! - `cp` - cyclic prefix classifier
///! - `sss` - group identity decoder
///! - `cfo` - frequency correction and moving averages

mod fft;
pub mod cfo;
pub mod correlator;
pub mod cp;
pub mod sss;

use rustfft::num_complex::Complex32;
use tracing::debug;

use crate::error::{Result, SyncError};
use crate::frame::{subframe_len, validate_fft_size, CpKind, HalfFrame};
use crate::sequence::{ReferenceGenerator, ReferenceWaveform, NUM_HYPOTHESES};

pub use cfo::{CfoCorrector, CFO_EMA_ALPHA, MAX_CFO_OFFSET};
pub use correlator::{CorrelationResult, Correlator};
pub use cp::CpClassifier;
pub use sss::{GroupIdentityDecoder, SecondaryMatch, DEFAULT_SSS_THRESHOLD};

use cfo::{cma_update, ema_update};

/// Default detection threshold on the normalized peak
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Smoothing factor of the displayed peak average
pub const PEAK_EMA_ALPHA: f32 = 0.1;

/// Subcarrier shifts tried by the integer CFO search, nominal first so that
/// ties keep it
const INTEGER_SHIFTS: [i8; 3] = [0, -1, 1];

/// Position of a (hypothesis, shift) pair in the reference and correlator tables
fn slot(hypothesis: u8, shift: i8) -> usize {
    3 * hypothesis as usize + (shift + 1) as usize
}

/// Decoded identity of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellIdentity {
    /// N_ID_2, 0..=2
    pub group_hypothesis: u8,
    /// N_ID_1, 0..=167
    pub secondary_id: u16,
    pub half_frame: HalfFrame,
    pub cp_kind: CpKind,
}

impl CellIdentity {
    /// Physical cell id, 0..=503
    pub fn composite_id(&self) -> u16 {
        3 * self.secondary_id + self.group_hypothesis as u16
    }
}

/// A peak that cleared the threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub peak_position: usize,
    pub peak_value: f32,
    pub hypothesis: u8,
    /// Instantaneous CFO estimate (integer part included), `None` when
    /// disabled or without a full symbol
    pub cfo: Option<f32>,
    pub cp_kind: CpKind,
    /// `None` while the secondary signal is unresolved
    pub identity: Option<CellIdentity>,
    /// A sub-step was skipped for lack of samples at the block edge
    pub history_short: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncOutcome {
    NotFound { peak_position: usize, peak_value: f32 },
    Found(Detection),
}

impl SyncOutcome {
    pub fn is_found(&self) -> bool {
        matches!(self, SyncOutcome::Found(_))
    }

    pub fn peak_value(&self) -> f32 {
        match self {
            SyncOutcome::NotFound { peak_value, .. } => *peak_value,
            SyncOutcome::Found(d) => d.peak_value,
        }
    }
}

/// Configuration of one synchronizer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub fft_size: usize,
    /// Samples per block; one subframe for the tracker
    pub block_len: usize,
    /// Candidate alignments per attempt
    pub search_len: usize,
    pub threshold: f32,
    /// Restrict to one group hypothesis, `None` tries all three
    pub hypothesis: Option<u8>,
    pub cfo_enabled: bool,
    /// Also search the references shifted by one subcarrier either way
    pub cfo_integer: bool,
    pub secondary_enabled: bool,
    pub cp_detection: bool,
    pub sss_threshold: f32,
    /// Prefix assumed until the classifier decides otherwise
    pub default_cp: CpKind,
}

impl SyncConfig {
    /// Whole-subframe search at `fft_size`
    pub fn new(fft_size: usize) -> Self {
        let block_len = subframe_len(fft_size);
        Self {
            fft_size,
            block_len,
            search_len: block_len,
            threshold: DEFAULT_THRESHOLD,
            hypothesis: None,
            cfo_enabled: true,
            cfo_integer: false,
            secondary_enabled: true,
            cp_detection: true,
            sss_threshold: DEFAULT_SSS_THRESHOLD,
            default_cp: CpKind::Normal,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_fft_size(self.fft_size)?;
        validate_threshold(self.threshold)?;
        if let Some(h) = self.hypothesis {
            validate_hypothesis(h)?;
        }
        if !(0.0..=1.0).contains(&self.sss_threshold) {
            return Err(SyncError::invalid(format!(
                "secondary threshold {} outside 0..=1",
                self.sss_threshold
            )));
        }
        Ok(())
    }
}

fn validate_threshold(threshold: f32) -> Result<()> {
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(SyncError::invalid(format!(
            "detection threshold {} must be positive",
            threshold
        )));
    }
    Ok(())
}

fn validate_hypothesis(hypothesis: u8) -> Result<()> {
    if hypothesis >= NUM_HYPOTHESES {
        return Err(SyncError::invalid(format!(
            "group hypothesis {} out of range 0..=2",
            hypothesis
        )));
    }
    Ok(())
}

/// PSS/SSS detector with running averages
pub struct CellSynchronizer {
    config: SyncConfig,
    /// Indexed by `slot(hypothesis, shift)`
    references: Vec<ReferenceWaveform>,
    /// One correlator per reference so each keeps its cached spectrum
    correlators: Vec<Correlator>,
    cp: CpClassifier,
    sss: GroupIdentityDecoder,
    corrector: CfoCorrector,
    /// Block with the integer CFO removed, for the CP and SSS stages
    shifted: Vec<Complex32>,

    mean_energy: f32,
    energy_count: u64,
    last_energy: Option<f32>,
    peak_ema: Option<f32>,
    mean_peak_value: f32,
    peak_count: u64,
    /// Fractional part only, `integer_cfo` holds the rest
    cfo_mean: Option<f32>,
    integer_cfo: i8,
    last_cfo: Option<f32>,
}

impl CellSynchronizer {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let generator = ReferenceGenerator::new(config.fft_size)?;
        let mut references = Vec::with_capacity(3 * NUM_HYPOTHESES as usize);
        for h in 0..NUM_HYPOTHESES {
            for shift in -1..=1 {
                references.push(generator.generate_shifted(h, shift)?);
            }
        }
        let correlators = references
            .iter()
            .map(|_| Correlator::new(config.block_len, config.search_len, config.fft_size))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            cp: CpClassifier::new(config.fft_size, config.default_cp),
            sss: GroupIdentityDecoder::new(config.fft_size, config.sss_threshold)?,
            corrector: CfoCorrector::new(config.fft_size),
            shifted: Vec::with_capacity(config.block_len),
            references,
            correlators,
            config,
            mean_energy: 0.0,
            energy_count: 0,
            last_energy: None,
            peak_ema: None,
            mean_peak_value: 0.0,
            peak_count: 0,
            cfo_mean: None,
            integer_cfo: 0,
            last_cfo: None,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Nominal (unshifted) reference of `hypothesis`
    pub fn reference(&self, hypothesis: u8) -> Option<&ReferenceWaveform> {
        if hypothesis >= NUM_HYPOTHESES {
            return None;
        }
        self.references.get(slot(hypothesis, 0))
    }

    pub fn set_hypothesis(&mut self, hypothesis: Option<u8>) -> Result<()> {
        if let Some(h) = hypothesis {
            validate_hypothesis(h)?;
        }
        self.config.hypothesis = hypothesis;
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: f32) -> Result<()> {
        validate_threshold(threshold)?;
        self.config.threshold = threshold;
        Ok(())
    }

    pub fn enable_secondary(&mut self, enabled: bool) {
        self.config.secondary_enabled = enabled;
    }

    pub fn enable_cfo(&mut self, enabled: bool) {
        self.config.cfo_enabled = enabled;
    }

    /// Cumulative average of the in-band root energy at the peak
    pub fn mean_energy(&self) -> f32 {
        self.mean_energy
    }

    /// In-band root energy measured by the last attempt
    pub fn last_energy(&self) -> Option<f32> {
        self.last_energy
    }

    /// Restart the energy average from a single measurement
    pub fn seed_energy(&mut self, energy: f32) {
        self.mean_energy = energy;
        self.energy_count = 1;
    }

    /// Exponential average of the normalized peak, for display
    pub fn peak_ema(&self) -> f32 {
        self.peak_ema.unwrap_or(0.0)
    }

    /// Cumulative average of the normalized peak
    pub fn mean_peak_value(&self) -> f32 {
        self.mean_peak_value
    }

    /// Smoothed CFO in subcarrier spacings, integer part included
    pub fn cfo_mean(&self) -> f32 {
        self.integer_cfo as f32 + self.cfo_mean.unwrap_or(0.0)
    }

    /// Integer CFO of the last detection, -1..=1
    pub fn integer_cfo(&self) -> i8 {
        self.integer_cfo
    }

    /// Seed the CFO state, e.g. from another synchronizer
    ///
    /// The nearest whole subcarrier (clamped to -1..=1) selects the reference
    /// used while the integer search is off, the rest seeds the average.
    pub fn set_cfo_mean(&mut self, cfo: f32) {
        let integer = cfo.round().clamp(-1.0, 1.0);
        self.integer_cfo = integer as i8;
        self.cfo_mean = Some(cfo - integer);
    }

    pub fn last_cfo(&self) -> Option<f32> {
        self.last_cfo
    }

    pub fn cp_kind(&self) -> CpKind {
        self.cp.current()
    }

    /// Clear all running averages
    pub fn reset(&mut self) {
        self.mean_energy = 0.0;
        self.energy_count = 0;
        self.last_energy = None;
        self.peak_ema = None;
        self.mean_peak_value = 0.0;
        self.peak_count = 0;
        self.cfo_mean = None;
        self.integer_cfo = 0;
        self.last_cfo = None;
        self.cp.reset();
        self.cp.set_current(self.config.default_cp);
    }

    /// Best (hypothesis, shift) over the searched references
    fn correlate(
        &mut self,
        samples: &[Complex32],
        search_offset: usize,
    ) -> Result<(u8, i8, CorrelationResult)> {
        let hypotheses = match self.config.hypothesis {
            Some(h) => h..h + 1,
            None => 0..NUM_HYPOTHESES,
        };
        let current = [self.integer_cfo];
        let shifts: &[i8] = if self.config.cfo_integer {
            &INTEGER_SHIFTS
        } else {
            &current
        };

        let mut best: Option<(u8, i8, CorrelationResult)> = None;
        for h in hypotheses {
            for &shift in shifts {
                let i = slot(h, shift);
                let result = self.correlators[i].find(samples, &self.references[i], search_offset)?;
                if best.map_or(true, |(_, _, b)| result.peak_value > b.peak_value) {
                    best = Some((h, shift, result));
                }
            }
        }
        best.ok_or_else(|| SyncError::invalid("no group hypothesis to search"))
    }

    /// One synchronization attempt over `samples` starting at `search_offset`
    pub fn attempt(&mut self, samples: &[Complex32], search_offset: usize) -> Result<SyncOutcome> {
        let (hypothesis, shift, result) = self.correlate(samples, search_offset)?;
        let peak_position = result.peak_position;
        let reference = slot(hypothesis, shift);
        let correlator = &mut self.correlators[reference];

        self.last_energy = correlator.sync_band_energy(samples, peak_position);
        if let Some(energy) = self.last_energy {
            self.mean_energy = cma_update(self.mean_energy, energy, self.energy_count);
            self.energy_count += 1;
        }

        let denominator = if self.mean_energy > 0.0 {
            self.mean_energy
        } else {
            correlator.partial_energy(samples, peak_position)
        };
        let peak_value = if denominator > 0.0 {
            result.peak_value / denominator
        } else {
            0.0
        };

        self.peak_ema = Some(ema_update(self.peak_ema, peak_value, PEAK_EMA_ALPHA));
        self.mean_peak_value = cma_update(self.mean_peak_value, peak_value, self.peak_count);
        self.peak_count += 1;

        if peak_value < self.config.threshold {
            debug!(peak_position, peak_value, "no peak above threshold");
            return Ok(SyncOutcome::NotFound {
                peak_position,
                peak_value,
            });
        }

        let mut history_short = false;

        // fractional part, measured against the shifted reference
        let fraction = if self.config.cfo_enabled {
            let estimate = correlator.estimate_cfo(samples, peak_position, &self.references[reference]);
            if let Some(c) = estimate {
                if self.cfo_mean.is_none() || c.abs() < MAX_CFO_OFFSET {
                    self.cfo_mean = Some(ema_update(self.cfo_mean, c, CFO_EMA_ALPHA));
                } else {
                    debug!(estimate = c, mean = self.cfo_mean(), "CFO estimate not averaged");
                }
                self.last_cfo = Some(shift as f32 + c);
            }
            estimate
        } else {
            None
        };
        if shift != self.integer_cfo {
            debug!(from = self.integer_cfo, to = shift, "integer CFO changed");
            self.integer_cfo = shift;
        }
        let cfo = fraction.map(|c| shift as f32 + c);

        let mut cp_kind = self.cp.current();
        let mut identity = None;
        if self.config.secondary_enabled {
            let samples: &[Complex32] = if shift != 0 {
                self.shifted.clear();
                self.shifted.extend_from_slice(samples);
                self.corrector.correct(&mut self.shifted, shift as f32);
                &self.shifted
            } else {
                samples
            };

            if self.config.cp_detection {
                match self.cp.classify(samples, peak_position) {
                    Ok(kind) => cp_kind = kind,
                    Err(e) if e.is_insufficient_samples() => history_short = true,
                    Err(e) => return Err(e),
                }
            }

            match self.sss.decode(samples, peak_position, hypothesis, cp_kind, fraction) {
                Ok(Some(m)) => {
                    identity = Some(CellIdentity {
                        group_hypothesis: hypothesis,
                        secondary_id: m.secondary_id,
                        half_frame: m.half_frame,
                        cp_kind,
                    })
                }
                Ok(None) => {}
                Err(e) if e.is_insufficient_samples() => history_short = true,
                Err(e) => return Err(e),
            }
        }

        debug!(
            peak_position,
            peak_value,
            hypothesis,
            shift,
            cfo = ?cfo,
            cp = ?cp_kind,
            identity = ?identity.map(|id| id.composite_id()),
            history_short,
            "peak found"
        );

        Ok(SyncOutcome::Found(Detection {
            peak_position,
            peak_value,
            hypothesis,
            cfo,
            cp_kind,
            identity,
            history_short,
        }))
    }
}
