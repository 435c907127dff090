//! # Confidence Gating
//!
//! Pitch detectors report an estimate for nearly every frame, including
//! silence and transients. The gate forwards only confident, finite,
//! positive frequency estimates to the converter.

use anyhow::{Result, ensure};

/// Samples must report a confidence strictly above this value.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.85;

/// One estimate from a pitch detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchSample {
    /// Estimated fundamental frequency in Hz
    pub frequency_hz: f32,
    /// Detector certainty that the estimate is a real pitch (0.0 to 1.0)
    pub confidence: f32,
}

impl PitchSample {
    pub fn new(frequency_hz: f32, confidence: f32) -> Self {
        Self {
            frequency_hz,
            confidence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f32,
}

impl ConfidenceGate {
    /// # Returns
    /// * `Err` - If `threshold` is outside [0, 1]
    pub fn new(threshold: f32) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&threshold),
            "confidence threshold must be within [0, 1], got {threshold}"
        );
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// True if the sample is confident enough and carries a usable frequency.
    ///
    /// The threshold is exclusive: a sample exactly at the threshold is dropped.
    pub fn accepts(&self, sample: &PitchSample) -> bool {
        sample.confidence > self.threshold
            && sample.frequency_hz.is_finite()
            && sample.frequency_hz > 0.0
    }

    /// Returns the sample's frequency if it passes the gate.
    pub fn pass(&self, sample: &PitchSample) -> Option<f32> {
        self.accepts(sample).then_some(sample.frequency_hz)
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_exclusive() {
        let gate = ConfidenceGate::default();
        assert!(!gate.accepts(&PitchSample::new(440.0, 0.85)));
        assert!(gate.accepts(&PitchSample::new(440.0, 0.851)));
        assert_eq!(gate.pass(&PitchSample::new(440.0, 0.9)), Some(440.0));
    }

    #[test]
    fn non_pitch_frequencies_are_dropped() {
        let gate = ConfidenceGate::default();
        for frequency in [0.0, -10.0, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert_eq!(gate.pass(&PitchSample::new(frequency, 0.99)), None, "{frequency} Hz");
        }
    }

    #[test]
    fn nan_confidence_is_dropped() {
        assert!(!ConfidenceGate::default().accepts(&PitchSample::new(440.0, f32::NAN)));
    }

    #[test]
    fn custom_threshold() {
        let gate = ConfidenceGate::new(0.5).unwrap();
        assert!(gate.accepts(&PitchSample::new(220.0, 0.6)));
        assert!(ConfidenceGate::new(1.5).is_err());
        assert!(ConfidenceGate::new(-0.1).is_err());
        assert!(ConfidenceGate::new(f32::NAN).is_err());
    }
}
