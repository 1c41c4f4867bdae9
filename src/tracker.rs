//! Acquisition and tracking state machine
//!
//! FIND correlates whole subframes until a PSS with a decodable SSS shows up,
//! then realigns the stream so that every following block is exactly one
//! subframe. TRACK checks a narrow window around the expected PSS position in
//! subframes 0 and 5, follows the clock drift one sample at a time and falls
//! back to FIND after `max_lost` consecutive misses. With a correction
//! period the drift is averaged and applied every `period` hits instead.
//!
//! Each `work()` call does exactly one `receive`. Realignment is folded into
//! its length: samples to skip are read and thrown away at the head of the
//! next read, samples that already belong to the next subframe are carried
//! over and prepended.

use rustfft::num_complex::Complex32;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::frame::{pss_position, subframe_len, symbol_size, validate_fft_size, HalfFrame, SUBFRAMES_PER_FRAME};
use crate::source::SampleSource;
use crate::sync::cfo::{cma_update, ema_update};
use crate::sync::{
    CellIdentity, CellSynchronizer, CfoCorrector, SyncConfig, SyncOutcome, DEFAULT_SSS_THRESHOLD,
    DEFAULT_THRESHOLD,
};

/// Default detection threshold while tracking
pub const DEFAULT_TRACK_THRESHOLD: f32 = 0.4;

/// Consecutive tracking misses before falling back to FIND
pub const DEFAULT_MAX_LOST: u32 = 10;

/// Samples searched on each side of the expected PSS position while tracking
pub const DEFAULT_TRACK_WINDOW: usize = 16;

/// Smoothing factor of the sample offset between periodic corrections
pub const DEFAULT_SFO_EMA: f32 = 0.1;

/// Time between two tracking attempts (subframes 0 and 5), in seconds
const ATTEMPT_INTERVAL: f32 = 5e-3;

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub fft_size: usize,
    pub find_threshold: f32,
    pub track_threshold: f32,
    /// Restrict the search to one group hypothesis
    pub hypothesis: Option<u8>,
    pub cfo_correction: bool,
    /// Search for a +-1 subcarrier CFO during FIND
    pub cfo_integer: bool,
    pub decode_secondary_on_track: bool,
    pub max_lost: u32,
    pub track_window: usize,
    pub sss_threshold: f32,
    /// Tracking hits between timing corrections, 0 corrects on every hit
    pub sample_offset_correct_period: u32,
    /// Smoothing of the timing offset when a correction period is set
    pub sfo_ema: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            fft_size: 128,
            find_threshold: DEFAULT_THRESHOLD,
            track_threshold: DEFAULT_TRACK_THRESHOLD,
            hypothesis: None,
            cfo_correction: true,
            cfo_integer: false,
            decode_secondary_on_track: true,
            max_lost: DEFAULT_MAX_LOST,
            track_window: DEFAULT_TRACK_WINDOW,
            sss_threshold: DEFAULT_SSS_THRESHOLD,
            sample_offset_correct_period: 0,
            sfo_ema: DEFAULT_SFO_EMA,
        }
    }
}

impl TrackerConfig {
    /// Defaults for a channel of `nof_prb` resource blocks
    pub fn for_prb(nof_prb: usize) -> Result<Self> {
        Ok(Self {
            fft_size: symbol_size(nof_prb)?,
            ..Self::default()
        })
    }

    pub fn block_len(&self) -> usize {
        subframe_len(self.fft_size)
    }

    pub fn validate(&self) -> Result<()> {
        validate_fft_size(self.fft_size)?;
        if self.max_lost == 0 {
            return Err(SyncError::invalid("max_lost must be at least 1"));
        }
        if self.track_window == 0 || self.track_window >= pss_position(self.fft_size) {
            return Err(SyncError::invalid(format!(
                "track window {} must be in 1..{}",
                self.track_window,
                pss_position(self.fft_size)
            )));
        }
        if !(self.sfo_ema > 0.0 && self.sfo_ema <= 1.0) {
            return Err(SyncError::invalid(format!(
                "sfo_ema {} outside (0, 1]",
                self.sfo_ema
            )));
        }
        Ok(())
    }

    fn find_sync(&self) -> SyncConfig {
        SyncConfig {
            threshold: self.find_threshold,
            hypothesis: self.hypothesis,
            cfo_integer: self.cfo_integer,
            sss_threshold: self.sss_threshold,
            ..SyncConfig::new(self.fft_size)
        }
    }

    fn track_sync(&self) -> SyncConfig {
        SyncConfig {
            search_len: 2 * self.track_window + 1,
            threshold: self.track_threshold,
            hypothesis: self.hypothesis,
            secondary_enabled: self.decode_secondary_on_track,
            sss_threshold: self.sss_threshold,
            ..SyncConfig::new(self.fft_size)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Find,
    Track,
}

/// What one `work()` call produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Still looking for a cell, nothing delivered
    Searching,
    /// Cell found and stream realigned; subframes follow from the next call
    Acquired(CellIdentity),
    /// Aligned subframe with this index available through `subframe()`
    Subframe(u8),
    /// Too many tracking misses, back to FIND
    LockLost,
}

pub struct AcquisitionTracker<S> {
    config: TrackerConfig,
    source: S,
    find: CellSynchronizer,
    track: CellSynchronizer,
    corrector: CfoCorrector,

    state: TrackerState,
    identity: Option<CellIdentity>,

    block: Vec<Complex32>,
    read_buffer: Vec<Complex32>,
    carry: Vec<Complex32>,
    pending_discard: usize,
    last_read_len: usize,

    block_len: usize,
    expected_peak: usize,
    peak_index: usize,
    current_subframe: u8,
    next_subframe: u8,

    time_offset: isize,
    mean_time_offset: f32,
    /// Smoothed offset awaiting the next periodic correction
    pending_offset: f32,
    mean_correction: f32,
    loss_count: u32,
    success_count: u64,
    attempt_count: u64,
    frames: u64,
}

impl<S: SampleSource> AcquisitionTracker<S> {
    pub fn new(config: TrackerConfig, source: S) -> Result<Self> {
        config.validate()?;
        let block_len = config.block_len();
        let find = CellSynchronizer::new(config.find_sync())?;
        let track = CellSynchronizer::new(config.track_sync())?;
        let expected_peak = pss_position(config.fft_size);

        info!(
            fft_size = config.fft_size,
            block_len,
            hypothesis = ?config.hypothesis,
            "tracker created"
        );

        Ok(Self {
            corrector: CfoCorrector::new(config.fft_size),
            config,
            source,
            find,
            track,
            state: TrackerState::Find,
            identity: None,
            block: vec![Complex32::new(0.0, 0.0); block_len],
            read_buffer: vec![Complex32::new(0.0, 0.0); 2 * block_len],
            carry: Vec::with_capacity(block_len),
            pending_discard: 0,
            last_read_len: 0,
            block_len,
            expected_peak,
            peak_index: expected_peak,
            current_subframe: 0,
            next_subframe: 0,
            time_offset: 0,
            mean_time_offset: 0.0,
            pending_offset: 0.0,
            mean_correction: 0.0,
            loss_count: 0,
            success_count: 0,
            attempt_count: 0,
            frames: 0,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Identity acquired in the current session
    pub fn identity(&self) -> Option<CellIdentity> {
        self.identity
    }

    /// Last delivered (or searched) block
    pub fn subframe(&self) -> &[Complex32] {
        &self.block
    }

    pub fn subframe_index(&self) -> u8 {
        self.current_subframe
    }

    /// Signed timing error of the last successful tracking attempt
    pub fn time_offset(&self) -> isize {
        self.time_offset
    }

    /// Average timing error over the tracking session, in samples per
    /// tracking attempt (one attempt every 5 subframes)
    pub fn mean_time_offset(&self) -> f32 {
        self.mean_time_offset
    }

    /// Sampling frequency offset in samples per second, from the timing
    /// corrections applied in this session
    ///
    /// Positive when the PSS keeps arriving late, i.e. the receiver clock runs
    /// fast against the cell.
    pub fn sfo(&self) -> f32 {
        self.mean_correction / ATTEMPT_INTERVAL
    }

    /// Smoothed CFO of the active synchronizer
    pub fn cfo(&self) -> f32 {
        match self.state {
            TrackerState::Find => self.find.cfo_mean(),
            TrackerState::Track => self.track.cfo_mean(),
        }
    }

    /// PSS position observed at the last successful tracking attempt
    pub fn peak_index(&self) -> usize {
        self.peak_index
    }

    pub fn loss_count(&self) -> u32 {
        self.loss_count
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    /// Tracking attempts in the current session
    pub fn attempt_count(&self) -> u64 {
        self.attempt_count
    }

    /// Samples requested from the source by the last `work()` call
    pub fn last_read_len(&self) -> usize {
        self.last_read_len
    }

    /// Blocks processed since creation
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn find_synchronizer(&self) -> &CellSynchronizer {
        &self.find
    }

    pub fn track_synchronizer(&self) -> &CellSynchronizer {
        &self.track
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Force FIND and clear all session state
    pub fn reset(&mut self) {
        self.clear_session();
        self.carry.clear();
        self.pending_discard = 0;
        self.find.reset();
        self.track.reset();
        info!("tracker reset");
    }

    fn clear_session(&mut self) {
        self.state = TrackerState::Find;
        self.identity = None;
        self.time_offset = 0;
        self.mean_time_offset = 0.0;
        self.pending_offset = 0.0;
        self.mean_correction = 0.0;
        self.loss_count = 0;
        self.success_count = 0;
        self.attempt_count = 0;
        self.peak_index = self.expected_peak;
        self.current_subframe = 0;
        self.next_subframe = 0;
    }

    /// One receive plus processing
    pub fn work(&mut self) -> Result<Step> {
        self.fill_block()?;
        self.frames += 1;
        match self.state {
            TrackerState::Find => self.find_step(),
            TrackerState::Track => self.track_step(),
        }
    }

    fn fill_block(&mut self) -> Result<()> {
        let carried = self.carry.len();
        let read_len = self.block_len - carried + self.pending_discard;

        self.source.receive(&mut self.read_buffer[..read_len])?;

        self.block[..carried].copy_from_slice(&self.carry);
        self.block[carried..].copy_from_slice(&self.read_buffer[self.pending_discard..read_len]);

        self.carry.clear();
        self.pending_discard = 0;
        self.last_read_len = read_len;
        Ok(())
    }

    fn find_step(&mut self) -> Result<Step> {
        match self.find.attempt(&self.block, 0)? {
            SyncOutcome::Found(detection) => match detection.identity {
                Some(identity) => {
                    self.acquire(identity, detection.peak_position)?;
                    Ok(Step::Acquired(identity))
                }
                None if detection.history_short => {
                    // move the peak towards the middle of the next blocks
                    self.pending_discard = self.block_len / 2;
                    debug!(
                        peak_position = detection.peak_position,
                        "peak too close to block edge, shifting by half a subframe"
                    );
                    Ok(Step::Searching)
                }
                None => Ok(Step::Searching),
            },
            SyncOutcome::NotFound { .. } => Ok(Step::Searching),
        }
    }

    fn acquire(&mut self, identity: CellIdentity, peak_position: usize) -> Result<()> {
        // start of the subframe carrying this PSS, relative to the block
        let start = peak_position as isize - self.expected_peak as isize;
        let len = self.block_len as isize;
        self.pending_discard = start.rem_euclid(len) as usize;

        let skipped = if start < 0 { 2 } else { 1 };

        self.clear_session();
        self.state = TrackerState::Track;
        self.identity = Some(identity);
        self.next_subframe = (identity.half_frame.subframe_index() + skipped) % SUBFRAMES_PER_FRAME;

        self.track.set_hypothesis(Some(identity.group_hypothesis))?;
        self.track.set_cfo_mean(self.find.cfo_mean());
        // the gain may have changed since the last session
        if let Some(energy) = self.find.last_energy() {
            self.track.seed_energy(energy);
        }

        info!(
            cell_id = identity.composite_id(),
            secondary_id = identity.secondary_id,
            hypothesis = identity.group_hypothesis,
            half_frame = ?identity.half_frame,
            cp = ?identity.cp_kind,
            peak_position,
            cfo = self.find.cfo_mean(),
            "cell acquired"
        );
        Ok(())
    }

    fn track_step(&mut self) -> Result<Step> {
        self.current_subframe = self.next_subframe;
        self.next_subframe = (self.current_subframe + 1) % SUBFRAMES_PER_FRAME;

        if HalfFrame::from_subframe(self.current_subframe).is_some() && !self.track_attempt()? {
            self.lose_lock()?;
            return Ok(Step::LockLost);
        }

        if self.config.cfo_correction {
            self.corrector.correct(&mut self.block, self.track.cfo_mean());
        }
        Ok(Step::Subframe(self.current_subframe))
    }

    /// Returns false once the loss bound is reached
    fn track_attempt(&mut self) -> Result<bool> {
        self.attempt_count += 1;
        let search_offset = self.expected_peak - self.config.track_window;

        let detection = match self.track.attempt(&self.block, search_offset)? {
            SyncOutcome::Found(detection) => detection,
            SyncOutcome::NotFound { peak_value, .. } => {
                self.loss_count += 1;
                debug!(
                    subframe = self.current_subframe,
                    peak_value,
                    loss_count = self.loss_count,
                    "tracking miss"
                );
                return Ok(self.loss_count < self.config.max_lost);
            }
        };

        self.loss_count = 0;
        let offset = detection.peak_position as isize - self.expected_peak as isize;
        self.time_offset = offset;
        self.peak_index = detection.peak_position;
        self.mean_time_offset = cma_update(self.mean_time_offset, offset as f32, self.success_count);

        let period = self.config.sample_offset_correct_period as u64;
        let correction = if period == 0 {
            offset
        } else {
            self.pending_offset = ema_update(Some(self.pending_offset), offset as f32, self.config.sfo_ema);
            if self.success_count % period == 0 {
                let c = self.pending_offset.round() as isize;
                self.pending_offset = 0.0;
                c
            } else {
                0
            }
        };
        self.mean_correction = cma_update(self.mean_correction, correction as f32, self.success_count);
        self.success_count += 1;

        if let (Some(observed), Some(acquired)) = (detection.identity, self.identity) {
            let parity = observed.half_frame.subframe_index();
            if observed.secondary_id == acquired.secondary_id && parity != self.current_subframe {
                warn!(
                    expected = self.current_subframe,
                    observed = parity,
                    "half-frame parity mismatch, correcting subframe index"
                );
                self.current_subframe = parity;
                self.next_subframe = (parity + 1) % SUBFRAMES_PER_FRAME;
            }
        }

        if correction > 0 {
            self.pending_discard = correction as usize;
        } else if correction < 0 {
            let n = correction.unsigned_abs();
            self.carry.extend_from_slice(&self.block[self.block_len - n..]);
        }

        debug!(
            subframe = self.current_subframe,
            peak_position = detection.peak_position,
            time_offset = offset,
            correction,
            mean_time_offset = self.mean_time_offset,
            "tracking hit"
        );
        Ok(true)
    }

    fn lose_lock(&mut self) -> Result<()> {
        info!(
            cell_id = ?self.identity.map(|id| id.composite_id()),
            attempts = self.attempt_count,
            "lock lost, back to cell search"
        );
        self.clear_session();
        self.carry.clear();
        self.pending_discard = 0;
        self.track.set_hypothesis(self.config.hypothesis)?;
        Ok(())
    }
}
