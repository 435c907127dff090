//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for the FFT-assisted pitch detector.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per frame length
//! - DC offset removal and Hann windowing before the transform
//! - Magnitudes up to the Nyquist frequency

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// # Arguments
/// * `signal` - Audio signal to process (modified in-place)
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the input buffer to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Forward FFT bound to one frame length.
///
/// Frames of a different length trigger a new plan.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(size),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Computes the magnitude spectrum of a frame.
    ///
    /// This function processes the frame through the following steps:
    /// 1. DC offset removal
    /// 2. Hann windowing
    /// 3. Forward FFT transformation
    ///
    /// # Returns
    /// * `Vec<f32>` - `signal.len() / 2` magnitudes, bin `k` centered on
    ///   `k * sample_rate / signal.len()` Hz
    pub fn magnitudes(&mut self, signal: &[f32]) -> Vec<f32> {
        if signal.len() != self.size {
            *self = Self::new(signal.len());
        }

        let mut processed_signal = signal.to_vec();
        remove_dc_offset(&mut processed_signal);
        apply_hann_window(&mut processed_signal);

        let mut buffer: Vec<Complex<f32>> = processed_signal
            .into_iter()
            .map(|sample| Complex { re: sample, im: 0.0 })
            .collect();

        self.fft.process(&mut buffer);

        buffer
            .iter()
            .take(self.size / 2)
            .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
            .collect()
    }
}
