//! Upstream sample sources
//!
//! The tracker pulls samples through [`SampleSource::receive`], which blocks
//! until the whole buffer is filled. Captures on disk come in two layouts:
//!
//! - raw: interleaved little-endian `f32` I/Q pairs
//! - WAV: stereo, left channel I and right channel Q (16-bit PCM or float)

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use rustfft::num_complex::Complex32;
use snafu::ResultExt;
use tracing::debug;

use crate::error::{IoSnafu, SourceError, WavSnafu};

pub trait SampleSource {
    /// Fill `buf` completely with the next samples of the stream
    fn receive(&mut self, buf: &mut [Complex32]) -> Result<(), SourceError>;

    /// Stream time of the next sample in seconds, when known
    fn timestamp(&self) -> Option<f64> {
        None
    }
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    fn receive(&mut self, buf: &mut [Complex32]) -> Result<(), SourceError> {
        (**self).receive(buf)
    }

    fn timestamp(&self) -> Option<f64> {
        (**self).timestamp()
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn receive(&mut self, buf: &mut [Complex32]) -> Result<(), SourceError> {
        (**self).receive(buf)
    }

    fn timestamp(&self) -> Option<f64> {
        (**self).timestamp()
    }
}

/// In-memory samples, optionally replayed forever
pub struct SliceSource {
    samples: Vec<Complex32>,
    position: usize,
    looping: bool,
}

impl SliceSource {
    pub fn new(samples: Vec<Complex32>) -> Self {
        Self {
            samples,
            position: 0,
            looping: false,
        }
    }

    pub fn looping(samples: Vec<Complex32>) -> Self {
        Self {
            samples,
            position: 0,
            looping: true,
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl SampleSource for SliceSource {
    fn receive(&mut self, buf: &mut [Complex32]) -> Result<(), SourceError> {
        if self.samples.is_empty() {
            return Err(SourceError::EndOfStream);
        }
        let mut filled = 0;
        while filled < buf.len() {
            if self.position == self.samples.len() {
                if !self.looping {
                    return Err(SourceError::EndOfStream);
                }
                self.position = 0;
            }
            let n = (buf.len() - filled).min(self.samples.len() - self.position);
            buf[filled..filled + n].copy_from_slice(&self.samples[self.position..self.position + n]);
            filled += n;
            self.position += n;
        }
        Ok(())
    }
}

/// Interleaved little-endian `f32` I/Q capture
pub struct RawFileSource {
    reader: BufReader<File>,
    sample_rate: Option<f64>,
    consumed: u64,
    bytes: Vec<u8>,
}

impl RawFileSource {
    pub fn open(path: impl AsRef<Path>, sample_rate: Option<f64>) -> Result<Self, SourceError> {
        let file = File::open(path.as_ref()).context(IoSnafu)?;
        debug!(path = %path.as_ref().display(), "opened raw capture");
        Ok(Self {
            reader: BufReader::new(file),
            sample_rate,
            consumed: 0,
            bytes: Vec::new(),
        })
    }
}

impl SampleSource for RawFileSource {
    fn receive(&mut self, buf: &mut [Complex32]) -> Result<(), SourceError> {
        self.bytes.resize(buf.len() * 8, 0);
        match self.reader.read_exact(&mut self.bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(SourceError::EndOfStream),
            Err(e) => return Err(SourceError::Io { source: e }),
        }
        for (s, chunk) in buf.iter_mut().zip(self.bytes.chunks_exact(8)) {
            let re = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let im = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
            *s = Complex32::new(re, im);
        }
        self.consumed += buf.len() as u64;
        Ok(())
    }

    fn timestamp(&self) -> Option<f64> {
        self.sample_rate.map(|rate| self.consumed as f64 / rate)
    }
}

/// Write samples as interleaved little-endian `f32` I/Q
pub fn write_raw(path: impl AsRef<Path>, samples: &[Complex32]) -> Result<(), SourceError> {
    let file = File::create(path.as_ref()).context(IoSnafu)?;
    let mut writer = BufWriter::new(file);
    for s in samples {
        writer.write_all(&s.re.to_le_bytes()).context(IoSnafu)?;
        writer.write_all(&s.im.to_le_bytes()).context(IoSnafu)?;
    }
    writer.flush().context(IoSnafu)?;
    Ok(())
}

/// Stereo WAV capture, I on the left channel and Q on the right
pub struct WavIqSource {
    reader: hound::WavReader<BufReader<File>>,
    sample_rate: u32,
    consumed: u64,
}

impl WavIqSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let reader = hound::WavReader::open(path.as_ref()).context(WavSnafu)?;
        let spec = reader.spec();

        if spec.channels != 2 {
            return Err(SourceError::Format {
                reason: format!("expected 2 channels (I/Q), got {}", spec.channels),
            });
        }
        match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Float, 32) | (hound::SampleFormat::Int, 16) => {}
            (format, bits) => {
                return Err(SourceError::Format {
                    reason: format!("unsupported sample format {:?} with {} bits", format, bits),
                })
            }
        }

        debug!(
            path = %path.as_ref().display(),
            sample_rate = spec.sample_rate,
            "opened WAV I/Q capture"
        );
        Ok(Self {
            sample_rate: spec.sample_rate,
            reader,
            consumed: 0,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn next_value(&mut self) -> Result<f32, SourceError> {
        let value = match self.reader.spec().sample_format {
            hound::SampleFormat::Float => self.reader.samples::<f32>().next(),
            hound::SampleFormat::Int => self
                .reader
                .samples::<i16>()
                .next()
                .map(|r| r.map(|v| v as f32 / 32768.0)),
        };
        match value {
            Some(v) => v.context(WavSnafu),
            None => Err(SourceError::EndOfStream),
        }
    }
}

impl SampleSource for WavIqSource {
    fn receive(&mut self, buf: &mut [Complex32]) -> Result<(), SourceError> {
        for s in buf.iter_mut() {
            let re = self.next_value()?;
            let im = self.next_value()?;
            *s = Complex32::new(re, im);
        }
        self.consumed += buf.len() as u64;
        Ok(())
    }

    fn timestamp(&self) -> Option<f64> {
        Some(self.consumed as f64 / self.sample_rate as f64)
    }
}

/// Write samples as a 32-bit float stereo WAV
pub fn write_wav_iq(
    path: impl AsRef<Path>,
    samples: &[Complex32],
    sample_rate: u32,
) -> Result<(), SourceError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec).context(WavSnafu)?;
    for s in samples {
        writer.write_sample(s.re).context(WavSnafu)?;
        writer.write_sample(s.im).context(WavSnafu)?;
    }
    writer.finalize().context(WavSnafu)?;
    Ok(())
}
