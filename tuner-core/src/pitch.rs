//! # Pitch Detection Module
//!
//! Monophonic fundamental frequency estimators. Each detector turns one
//! analysis window into a [`PitchSample`] (frequency plus confidence); the
//! tuner pipeline decides what to do with low-confidence estimates.
//!
//! ## Detectors
//! - YIN with parabolic interpolation
//! - YIN refined against an FFT magnitude spectrum
//! - McLeod pitch method (normalized square difference function), via `pitch_detection`
//! - Average magnitude difference function (AMDF)
//!
//! All detectors apply an RMS noise gate and return `None` for silence.

use log::trace;
use pitch_detection::detector::PitchDetector as _;
use pitch_detection::detector::mcleod::McLeodDetector as Mpm;

use crate::{algorithm::PitchDetectionAlgorithm, fft::SpectrumAnalyzer, gating::PitchSample};

/// Frames with an RMS level below this are treated as silence.
pub const DEFAULT_AMPLITUDE_THRESHOLD: f32 = 0.01;

/// Lowest fundamental the detectors search for.
pub const MIN_FREQUENCY_HZ: f32 = 40.0;

/// Highest fundamental the lag-domain detectors search for.
pub const MAX_FREQUENCY_HZ: f32 = 2000.0;

/// Absolute threshold on the YIN cumulative mean normalized difference.
const YIN_THRESHOLD: f32 = 0.20;

/// McLeod picks the first NSDF peak above this share of the highest one.
const MPM_CLARITY_THRESHOLD: f32 = 0.9;

/// AMDF picks the first dip within this share of the value range above the minimum.
const AMDF_TOLERANCE: f32 = 0.1;

/// A source of pitch estimates for fixed-size analysis windows.
pub trait PitchDetector {
    /// Estimates the fundamental frequency of one frame.
    ///
    /// # Returns
    /// * `Some(sample)` - Estimated frequency and the detector's confidence
    /// * `None` - Silence, or no periodicity found
    fn detect(&mut self, frame: &[f32]) -> Option<PitchSample>;
}

/// Builds the detector for an algorithm selection.
pub fn create_detector(algorithm: PitchDetectionAlgorithm, sample_rate: u32) -> Box<dyn PitchDetector> {
    match algorithm {
        PitchDetectionAlgorithm::McLeod => Box::new(McLeodDetector::new(sample_rate)),
        PitchDetectionAlgorithm::Yin => Box::new(YinDetector::new(sample_rate)),
        PitchDetectionAlgorithm::FftYin => Box::new(FftYinDetector::new(sample_rate)),
        PitchDetectionAlgorithm::Amdf => Box::new(AmdfDetector::new(sample_rate)),
    }
}

fn rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    (signal.iter().map(|&s| s * s).sum::<f32>() / signal.len() as f32).sqrt()
}

/// Offset of the vertex of the parabola through three equally spaced points,
/// relative to the middle one.
fn parabolic_offset(y1: f32, y2: f32, y3: f32) -> f32 {
    let denominator = y1 - 2.0 * y2 + y3;
    if denominator.abs() < f32::EPSILON {
        return 0.0;
    }
    ((y1 - y3) / (2.0 * denominator)).clamp(-1.0, 1.0)
}

fn in_search_range(frequency: f32) -> bool {
    frequency.is_finite() && (MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency)
}

fn audible_frequency(sample_rate: u32, period: f32) -> Option<f32> {
    let frequency = sample_rate as f32 / period;
    (frequency.is_finite() && frequency >= MIN_FREQUENCY_HZ).then_some(frequency)
}

/// YIN pitch detector.
///
/// Confidence is `1 - d'(tau)`, where `d'` is the cumulative mean normalized
/// difference at the chosen period.
pub struct YinDetector {
    sample_rate: u32,
    amplitude_threshold: f32,
    yin_buffer: Vec<f32>,
}

impl YinDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            yin_buffer: Vec::new(),
        }
    }
}

impl PitchDetector for YinDetector {
    fn detect(&mut self, signal: &[f32]) -> Option<PitchSample> {
        if rms(signal) < self.amplitude_threshold {
            return None;
        }

        let half = signal.len() / 2;
        if half < 3 {
            return None;
        }
        let yin_buffer = &mut self.yin_buffer;
        yin_buffer.clear();
        yin_buffer.resize(half, 0.0);

        // --- Difference function ---
        for tau in 1..half {
            let mut diff = 0.0;
            for i in 0..half {
                let delta = signal[i] - signal[i + tau];
                diff += delta * delta;
            }
            yin_buffer[tau] = diff;
        }

        // --- Cumulative mean normalized difference ---
        yin_buffer[0] = 1.0;
        let mut running_sum = 0.0;
        for tau in 1..half {
            running_sum += yin_buffer[tau];
            yin_buffer[tau] = if running_sum > 0.0 {
                yin_buffer[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }

        // --- First dip below the absolute threshold, followed to its minimum ---
        let mut tau = 2;
        let mut period = None;
        while tau < half {
            if yin_buffer[tau] < YIN_THRESHOLD {
                while tau + 1 < half && yin_buffer[tau + 1] < yin_buffer[tau] {
                    tau += 1;
                }
                period = Some(tau);
                break;
            }
            tau += 1;
        }
        let period = period?;

        let period_float = if period + 1 < half {
            period as f32 + parabolic_offset(yin_buffer[period - 1], yin_buffer[period], yin_buffer[period + 1])
        } else {
            period as f32
        };

        let confidence = (1.0 - yin_buffer[period]).clamp(0.0, 1.0);
        let frequency = audible_frequency(self.sample_rate, period_float)?;
        trace!("yin: period {period_float:.2} -> {frequency:.2} Hz, confidence {confidence:.3}");
        Some(PitchSample::new(frequency, confidence))
    }
}

/// YIN estimate refined to sub-bin accuracy on the magnitude spectrum.
pub struct FftYinDetector {
    yin: YinDetector,
    spectrum: SpectrumAnalyzer,
}

impl FftYinDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            yin: YinDetector::new(sample_rate),
            spectrum: SpectrumAnalyzer::new(crate::audio::WINDOW_SIZE),
        }
    }
}

impl PitchDetector for FftYinDetector {
    fn detect(&mut self, frame: &[f32]) -> Option<PitchSample> {
        let rough = self.yin.detect(frame)?;
        let magnitudes = self.spectrum.magnitudes(frame);
        let frequency = refine_from_spectrum(&magnitudes, rough.frequency_hz, self.yin.sample_rate)
            .unwrap_or(rough.frequency_hz);
        Some(PitchSample::new(frequency, rough.confidence))
    }
}

/// Refines a frequency estimate using a pre-computed magnitude spectrum.
///
/// Searches two bins either side of the estimate for the strongest bin and
/// fits a parabola to the log magnitudes around it.
///
/// # Arguments
/// * `spectrum_magnitudes` - Magnitude spectrum from FFT (half the frame length)
/// * `rough_freq` - Initial frequency estimate in Hz
/// * `sample_rate` - Sample rate in Hz
///
/// # Returns
/// * `Some(refined_freq)` - Refined estimate, or `rough_freq` when refinement is not possible
/// * `None` - `rough_freq` is not positive or the spectrum is empty
pub fn refine_from_spectrum(spectrum_magnitudes: &[f32], rough_freq: f32, sample_rate: u32) -> Option<f32> {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 {
        return None;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let start_bin = (target_bin - search_radius).max(0.0) as usize;
    let end_bin = (target_bin + search_radius).min((spectrum_magnitudes.len() - 1) as f32) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let peak_bin = spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(offset, _)| start_bin + offset)?;

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let interpolated_bin = peak_bin as f32 + parabolic_offset(y1, y2, y3);
    let final_freq = (interpolated_bin * sample_rate as f32) / buffer_size as f32;

    if final_freq.is_finite() && final_freq > 0.0 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

/// McLeod pitch method, backed by the `pitch_detection` crate.
///
/// Confidence is the clarity of the chosen NSDF peak. The inner detector is
/// sized per frame length and rebuilt when the length changes.
pub struct McLeodDetector {
    sample_rate: u32,
    amplitude_threshold: f32,
    mpm: Option<(usize, Mpm<f32>)>,
}

impl McLeodDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            mpm: None,
        }
    }

    fn detector_for(&mut self, size: usize) -> &mut Mpm<f32> {
        if self.mpm.as_ref().is_some_and(|(current, _)| *current != size) {
            self.mpm = None;
        }
        let (_, mpm) = self.mpm.get_or_insert_with(|| (size, Mpm::new(size, size / 2)));
        mpm
    }
}

impl PitchDetector for McLeodDetector {
    fn detect(&mut self, frame: &[f32]) -> Option<PitchSample> {
        if frame.len() < 4 || rms(frame) < self.amplitude_threshold {
            return None;
        }
        let sample_rate = self.sample_rate as usize;
        let pitch = self
            .detector_for(frame.len())
            .get_pitch(frame, sample_rate, 0.0, MPM_CLARITY_THRESHOLD)?;

        let frequency = pitch.frequency;
        if !in_search_range(frequency) {
            return None;
        }
        let confidence = pitch.clarity.clamp(0.0, 1.0);
        trace!("mpm: {frequency:.2} Hz, clarity {confidence:.3}");
        Some(PitchSample::new(frequency, confidence))
    }
}

/// Average magnitude difference function detector.
///
/// Confidence is `1 - amdf(tau) / max(amdf)`.
pub struct AmdfDetector {
    sample_rate: u32,
    amplitude_threshold: f32,
    amdf: Vec<f32>,
}

impl AmdfDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            amplitude_threshold: DEFAULT_AMPLITUDE_THRESHOLD,
            amdf: Vec::new(),
        }
    }
}

impl PitchDetector for AmdfDetector {
    fn detect(&mut self, frame: &[f32]) -> Option<PitchSample> {
        if rms(frame) < self.amplitude_threshold {
            return None;
        }
        let min_lag = ((self.sample_rate as f32 / MAX_FREQUENCY_HZ) as usize).max(2);
        let max_lag = ((self.sample_rate as f32 / MIN_FREQUENCY_HZ) as usize).min(frame.len() / 2);
        if max_lag < min_lag + 2 {
            return None;
        }

        self.amdf.clear();
        for tau in min_lag..=max_lag {
            let count = frame.len() - tau;
            let total: f32 = (0..count).map(|i| (frame[i] - frame[i + tau]).abs()).sum();
            self.amdf.push(total / count as f32);
        }

        let amdf = &self.amdf;
        let min_val = amdf.iter().copied().fold(f32::INFINITY, f32::min);
        let max_val = amdf.iter().copied().fold(0.0_f32, f32::max);
        if max_val <= 0.0 {
            return None;
        }

        let cutoff = min_val + AMDF_TOLERANCE * (max_val - min_val);
        let mut idx = amdf.iter().position(|&v| v <= cutoff)?;
        while idx + 1 < amdf.len() && amdf[idx + 1] < amdf[idx] {
            idx += 1;
        }

        let offset = if idx > 0 && idx + 1 < amdf.len() {
            parabolic_offset(amdf[idx - 1], amdf[idx], amdf[idx + 1])
        } else {
            0.0
        };
        let period = (min_lag + idx) as f32 + offset;

        let frequency = audible_frequency(self.sample_rate, period)?;
        let confidence = (1.0 - amdf[idx] / max_val).clamp(0.0, 1.0);
        trace!("amdf: period {period:.2} -> {frequency:.2} Hz, confidence {confidence:.3}");
        Some(PitchSample::new(frequency, confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{SAMPLE_RATE, WINDOW_SIZE};

    fn sine(frequency: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn cents_between(a: f32, b: f32) -> f32 {
        1200.0 * (a / b).log2()
    }

    #[test]
    fn every_detector_finds_a_pure_tone() {
        for algorithm in PitchDetectionAlgorithm::ALL {
            let mut detector = create_detector(algorithm, SAMPLE_RATE);
            for expected in [220.0, 440.0, 880.0] {
                let sample = detector
                    .detect(&sine(expected, WINDOW_SIZE))
                    .unwrap_or_else(|| panic!("{algorithm} found nothing at {expected} Hz"));
                let error = cents_between(sample.frequency_hz, expected);
                assert!(error.abs() < 10.0, "{algorithm} at {expected} Hz: {} Hz", sample.frequency_hz);
                assert!(sample.confidence > 0.85, "{algorithm} at {expected} Hz: confidence {}", sample.confidence);
            }
        }
    }

    #[test]
    fn silence_is_not_a_pitch() {
        let quiet: Vec<f32> = sine(440.0, WINDOW_SIZE).iter().map(|s| s * 0.001).collect();
        for algorithm in PitchDetectionAlgorithm::ALL {
            let mut detector = create_detector(algorithm, SAMPLE_RATE);
            assert!(detector.detect(&vec![0.0; WINDOW_SIZE]).is_none(), "{algorithm}");
            assert!(detector.detect(&quiet).is_none(), "{algorithm}");
            assert!(detector.detect(&[]).is_none(), "{algorithm}");
        }
    }

    #[test]
    fn yin_handles_low_notes() {
        let sample = YinDetector::new(SAMPLE_RATE).detect(&sine(82.41, WINDOW_SIZE)).unwrap();
        assert!(cents_between(sample.frequency_hz, 82.41).abs() < 10.0);
    }

    #[test]
    fn spectrum_refinement() {
        let frame = sine(440.0, WINDOW_SIZE);
        let magnitudes = SpectrumAnalyzer::new(WINDOW_SIZE).magnitudes(&frame);

        let refined = refine_from_spectrum(&magnitudes, 436.0, SAMPLE_RATE).unwrap();
        assert!(cents_between(refined, 440.0).abs() < 5.0, "{refined} Hz");
        assert!(refine_from_spectrum(&magnitudes, 0.0, SAMPLE_RATE).is_none());
        assert!(refine_from_spectrum(&magnitudes, -1.0, SAMPLE_RATE).is_none());
    }

    #[test]
    fn parabola_vertex() {
        assert_eq!(parabolic_offset(1.0, 0.0, 1.0), 0.0);
        assert!((parabolic_offset(2.0, 0.0, 1.0) - 1.0 / 6.0).abs() < 1e-6);
        assert_eq!(parabolic_offset(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn mcleod_follows_frame_length_changes() {
        let mut detector = McLeodDetector::new(SAMPLE_RATE);
        for len in [WINDOW_SIZE, 2048, WINDOW_SIZE] {
            let sample = detector.detect(&sine(330.0, len)).unwrap();
            assert!(cents_between(sample.frequency_hz, 330.0).abs() < 10.0, "{len}: {} Hz", sample.frequency_hz);
        }
    }
}
