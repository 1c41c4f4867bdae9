//! Simulated receive chain
//!
//! [`SimulatedSource`] wraps a [`DownlinkGenerator`] and applies channel and
//! clock impairments as samples are pulled: timing offset, CFO, AWGN, dropped
//! samples and a sample-clock drift modelled as one repeated sample every
//! `insert_period` transmitted samples.

pub mod frame;
pub mod noise;

use std::collections::VecDeque;

use rand::prelude::*;
use rand::rngs::StdRng;
use rustfft::num_complex::Complex32;

pub use frame::{CellConfig, DownlinkGenerator};
pub use noise::{add_awgn, generate_awgn, mean_power, noise_variance_for_snr, ComplexAwgn};

use crate::error::{Result, SourceError};
use crate::source::SampleSource;

/// Impairments applied between transmitter and receiver
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Total complex noise variance per sample
    pub noise_variance: f32,
    /// CFO in subcarrier spacings
    pub cfo: f32,
    pub amplitude: f32,
    /// Transmitted samples skipped before the first received sample
    pub timing_offset: usize,
    /// Repeat one sample every this many transmitted samples
    pub insert_period: Option<u64>,
    /// Transmitted sample indices that never reach the receiver (sorted)
    pub drop_at: Vec<u64>,
    /// Received samples after which the cell goes silent (noise only)
    pub signal_until: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            noise_variance: 0.0,
            cfo: 0.0,
            amplitude: 1.0,
            timing_offset: 0,
            insert_period: None,
            drop_at: Vec::new(),
            signal_until: None,
        }
    }
}

pub struct SimulatedSource {
    generator: DownlinkGenerator,
    channel: ChannelConfig,
    noise: ComplexAwgn,
    rng: StdRng,
    pending: VecDeque<Complex32>,
    scratch: Vec<Complex32>,
    repeat: Option<Complex32>,
    transmitted: u64,
    received: u64,
    sample_rate: f64,
}

impl SimulatedSource {
    pub fn new(cell: &CellConfig, mut channel: ChannelConfig, seed: u64) -> Result<Self> {
        let generator = DownlinkGenerator::new(cell, seed)?;
        channel.drop_at.sort_unstable();
        let sample_rate = 15_000.0 * generator.fft_size() as f64;
        let mut source = Self {
            noise: ComplexAwgn::new(channel.noise_variance),
            generator,
            channel,
            rng: StdRng::seed_from_u64(seed ^ 0x5eed_0f_c0ffee),
            pending: VecDeque::new(),
            scratch: Vec::new(),
            repeat: None,
            transmitted: 0,
            received: 0,
            sample_rate,
        };
        for _ in 0..source.channel.timing_offset {
            source.next_transmitted();
        }
        Ok(source)
    }

    pub fn fft_size(&self) -> usize {
        self.generator.fft_size()
    }

    /// Samples delivered so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Transmitted samples pulled from the generator so far
    pub fn transmitted(&self) -> u64 {
        self.transmitted
    }

    fn next_transmitted(&mut self) -> Complex32 {
        if self.pending.is_empty() {
            self.scratch.clear();
            self.generator.write_subframe(&mut self.scratch);
            self.pending.extend(self.scratch.iter().copied());
        }
        self.transmitted += 1;
        self.pending.pop_front().unwrap_or(Complex32::new(0.0, 0.0))
    }

    fn next_clean(&mut self) -> Complex32 {
        if let Some(s) = self.repeat.take() {
            return s;
        }
        loop {
            let index = self.transmitted;
            let s = self.next_transmitted();
            if self.channel.drop_at.binary_search(&index).is_ok() {
                continue;
            }
            if let Some(period) = self.channel.insert_period {
                if period > 0 && self.transmitted % period == 0 {
                    self.repeat = Some(s);
                }
            }
            return s;
        }
    }

    fn next_sample(&mut self) -> Complex32 {
        let n = self.received;
        self.received += 1;

        let silent = self.channel.signal_until.is_some_and(|until| n >= until);
        let clean = self.next_clean();
        let mut s = if silent {
            Complex32::new(0.0, 0.0)
        } else {
            clean * self.channel.amplitude
        };

        if self.channel.cfo != 0.0 {
            let phase = 2.0 * std::f64::consts::PI * self.channel.cfo as f64 * n as f64
                / self.generator.fft_size() as f64;
            s *= Complex32::new(phase.cos() as f32, phase.sin() as f32);
        }
        s + self.noise.sample(&mut self.rng)
    }

    /// Convenience for tests and tools: the next `len` received samples
    pub fn take(&mut self, len: usize) -> Vec<Complex32> {
        (0..len).map(|_| self.next_sample()).collect()
    }
}

impl SampleSource for SimulatedSource {
    fn receive(&mut self, buf: &mut [Complex32]) -> std::result::Result<(), SourceError> {
        for s in buf.iter_mut() {
            *s = self.next_sample();
        }
        Ok(())
    }

    fn timestamp(&self) -> Option<f64> {
        Some(self.received as f64 / self.sample_rate)
    }
}
