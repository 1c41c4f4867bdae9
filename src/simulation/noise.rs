use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex32;

/// Circular complex white Gaussian noise with total variance `variance`
///
/// Each of I and Q gets half of the variance.
pub struct ComplexAwgn {
    normal: Option<Normal<f32>>,
}

impl ComplexAwgn {
    pub fn new(variance: f32) -> Self {
        let sigma = (variance.max(0.0) / 2.0).sqrt();
        Self {
            normal: if sigma > 0.0 {
                Normal::new(0.0, sigma).ok()
            } else {
                None
            },
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Complex32 {
        match &self.normal {
            Some(normal) => Complex32::new(normal.sample(rng), normal.sample(rng)),
            None => Complex32::new(0.0, 0.0),
        }
    }
}

/// Mean power per sample
pub fn mean_power(signal: &[Complex32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|s| s.norm_sqr()).sum::<f32>() / signal.len() as f32
}

/// Noise variance giving `snr_db` against a signal of `signal_power`
pub fn noise_variance_for_snr(snr_db: f32, signal_power: f32) -> f32 {
    signal_power / 10.0_f32.powf(snr_db / 10.0)
}

/// Add noise in place
pub fn add_awgn<R: Rng + ?Sized>(samples: &mut [Complex32], variance: f32, rng: &mut R) {
    let noise = ComplexAwgn::new(variance);
    for s in samples.iter_mut() {
        *s += noise.sample(rng);
    }
}

pub fn generate_awgn<R: Rng + ?Sized>(num_samples: usize, variance: f32, rng: &mut R) -> Vec<Complex32> {
    let noise = ComplexAwgn::new(variance);
    (0..num_samples).map(|_| noise.sample(rng)).collect()
}
