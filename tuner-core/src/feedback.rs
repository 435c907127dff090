//! # Tuning Feedback Module
//!
//! Turns a cent deviation into display-agnostic feedback: a tuning band,
//! the single active line of an 11-line indicator scale, and a blend
//! fraction for front ends that fade between band colors.

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deviations below this many cents count as in tune.
pub const PERFECT_THRESHOLD_CENTS: f32 = 5.0;

/// Deviations below this many cents (and at least the perfect threshold)
/// count as slightly off.
pub const SLIGHTLY_OFF_THRESHOLD_CENTS: f32 = 25.0;

/// Cent deviations are clamped to +/- this value before classification.
pub const DISPLAY_RANGE_CENTS: f32 = 50.0;

/// Spacing between indicator lines.
pub const INDICATOR_STEP_CENTS: i32 = 10;

/// Number of lines on the indicator scale (-50, -40, ..., +50).
pub const INDICATOR_LINE_COUNT: usize = 11;

/// Discrete tuning quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TuningBand {
    Perfect,
    SlightlyOff,
    VeryOff,
}

impl fmt::Display for TuningBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TuningBand::Perfect => "in tune",
            TuningBand::SlightlyOff => "slightly off",
            TuningBand::VeryOff => "very off",
        };
        f.write_str(label)
    }
}

/// Band boundaries in cents. Lower bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedbackThresholds {
    perfect_cents: f32,
    slightly_off_cents: f32,
}

impl FeedbackThresholds {
    /// # Returns
    /// * `Err` - Unless `0 < perfect_cents < slightly_off_cents <= 50`
    pub fn new(perfect_cents: f32, slightly_off_cents: f32) -> Result<Self> {
        let thresholds = Self {
            perfect_cents,
            slightly_off_cents,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn perfect_cents(&self) -> f32 {
        self.perfect_cents
    }

    pub fn slightly_off_cents(&self) -> f32 {
        self.slightly_off_cents
    }

    /// Re-checks the ordering, for values that arrived through deserialization.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.perfect_cents > 0.0
                && self.perfect_cents < self.slightly_off_cents
                && self.slightly_off_cents <= DISPLAY_RANGE_CENTS,
            "feedback thresholds must satisfy 0 < perfect < slightly off <= {DISPLAY_RANGE_CENTS}, got {} / {}",
            self.perfect_cents,
            self.slightly_off_cents
        );
        Ok(())
    }
}

impl Default for FeedbackThresholds {
    fn default() -> Self {
        Self {
            perfect_cents: PERFECT_THRESHOLD_CENTS,
            slightly_off_cents: SLIGHTLY_OFF_THRESHOLD_CENTS,
        }
    }
}

/// Classification of one cent deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningFeedback {
    pub band: TuningBand,
    /// The deviation clamped to the display range
    pub cents: f32,
}

/// One line of the indicator scale, identified by its cent value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndicatorLine(i32);

impl IndicatorLine {
    pub const CENTER: IndicatorLine = IndicatorLine(0);

    /// Selects the line for a deviation.
    ///
    /// The deviation is clamped to [-50, 50] and then truncated toward zero
    /// to a multiple of 10, so -15 cents lights the -10 line. NaN selects
    /// the center line.
    pub fn from_cents(cents: f32) -> Self {
        if cents.is_nan() {
            return Self::CENTER;
        }
        let step = INDICATOR_STEP_CENTS as f32;
        Self((clamp_cents(cents) / step).trunc() as i32 * INDICATOR_STEP_CENTS)
    }

    /// All lines from -50 to +50.
    pub fn all() -> impl Iterator<Item = IndicatorLine> {
        (0..INDICATOR_LINE_COUNT).map(Self::at_position)
    }

    fn at_position(position: usize) -> Self {
        Self(position as i32 * INDICATOR_STEP_CENTS - DISPLAY_RANGE_CENTS as i32)
    }

    pub fn cents(self) -> i32 {
        self.0
    }

    /// Zero-based position on the scale, left (-50) to right (+50).
    pub fn position(self) -> usize {
        ((self.0 + DISPLAY_RANGE_CENTS as i32) / INDICATOR_STEP_CENTS) as usize
    }
}

/// Display state of one indicator line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineState {
    Inactive,
    Active(TuningBand),
}

/// Interpolation between two band colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandBlend {
    pub from: TuningBand,
    pub to: TuningBand,
    /// 0.0 is fully `from`, 1.0 is fully `to`
    pub fraction: f32,
}

/// Maps cent deviations to [`TuningFeedback`] using one set of thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TuningFeedbackClassifier {
    thresholds: FeedbackThresholds,
}

impl TuningFeedbackClassifier {
    pub fn new(thresholds: FeedbackThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> FeedbackThresholds {
        self.thresholds
    }

    pub fn classify(&self, cents: f32) -> TuningFeedback {
        TuningFeedback {
            band: self.band(cents),
            cents: clamp_cents(cents),
        }
    }

    /// Band of a deviation. NaN falls through to `VeryOff`.
    pub fn band(&self, cents: f32) -> TuningBand {
        let magnitude = clamp_cents(cents).abs();
        if magnitude < self.thresholds.perfect_cents {
            TuningBand::Perfect
        } else if magnitude < self.thresholds.slightly_off_cents {
            TuningBand::SlightlyOff
        } else {
            TuningBand::VeryOff
        }
    }

    /// Full indicator scale for one deviation.
    ///
    /// Every line is reset on each call; only the line selected by
    /// [`IndicatorLine::from_cents`] is active, colored by its own cent value.
    /// NaN lights the center line as `VeryOff`, agreeing with [`Self::band`].
    pub fn indicator_lines(&self, cents: f32) -> [LineState; INDICATOR_LINE_COUNT] {
        let mut lines = [LineState::Inactive; INDICATOR_LINE_COUNT];
        let active = IndicatorLine::from_cents(cents);
        let band = if cents.is_nan() {
            TuningBand::VeryOff
        } else {
            self.band(active.cents() as f32)
        };
        lines[active.position()] = LineState::Active(band);
        lines
    }

    /// Color interpolation for a deviation. NaN is fully `VeryOff`.
    pub fn blend(&self, cents: f32) -> BandBlend {
        if cents.is_nan() {
            return BandBlend {
                from: TuningBand::SlightlyOff,
                to: TuningBand::VeryOff,
                fraction: 1.0,
            };
        }
        let magnitude = clamp_cents(cents).abs();
        let perfect = self.thresholds.perfect_cents;
        let slightly_off = self.thresholds.slightly_off_cents;

        if magnitude < perfect {
            BandBlend {
                from: TuningBand::Perfect,
                to: TuningBand::Perfect,
                fraction: 0.0,
            }
        } else if magnitude < slightly_off {
            BandBlend {
                from: TuningBand::Perfect,
                to: TuningBand::SlightlyOff,
                fraction: (magnitude - perfect) / (slightly_off - perfect),
            }
        } else {
            let span = DISPLAY_RANGE_CENTS - slightly_off;
            let fraction = if span > 0.0 {
                ((magnitude - slightly_off) / span).clamp(0.0, 1.0)
            } else {
                1.0
            };
            BandBlend {
                from: TuningBand::SlightlyOff,
                to: TuningBand::VeryOff,
                fraction,
            }
        }
    }
}

/// Clamps a deviation to [-50, 50].
pub fn clamp_cents(cents: f32) -> f32 {
    cents.clamp(-DISPLAY_RANGE_CENTS, DISPLAY_RANGE_CENTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bands() {
        let classifier = TuningFeedbackClassifier::default();
        assert_eq!(classifier.band(0.0), TuningBand::Perfect);
        assert_eq!(classifier.band(4.9), TuningBand::Perfect);
        assert_eq!(classifier.band(-4.99), TuningBand::Perfect);
        assert_eq!(classifier.band(5.0), TuningBand::SlightlyOff);
        assert_eq!(classifier.band(-5.0), TuningBand::SlightlyOff);
        assert_eq!(classifier.band(24.9), TuningBand::SlightlyOff);
        assert_eq!(classifier.band(25.0), TuningBand::VeryOff);
        assert_eq!(classifier.band(-49.0), TuningBand::VeryOff);
    }

    #[test]
    fn out_of_range_cents_are_clamped() {
        let feedback = TuningFeedbackClassifier::default().classify(120.0);
        assert_eq!(feedback.band, TuningBand::VeryOff);
        assert_eq!(feedback.cents, 50.0);

        let feedback = TuningFeedbackClassifier::default().classify(-75.0);
        assert_eq!(feedback.cents, -50.0);
    }

    #[test]
    fn nan_is_very_off() {
        assert_eq!(TuningFeedbackClassifier::default().band(f32::NAN), TuningBand::VeryOff);
    }

    #[test]
    fn custom_thresholds_move_the_boundary() {
        let classifier = TuningFeedbackClassifier::new(FeedbackThresholds::new(5.0, 30.0).unwrap());
        assert_eq!(classifier.band(27.0), TuningBand::SlightlyOff);
        assert_eq!(classifier.band(30.0), TuningBand::VeryOff);
        assert_eq!(TuningFeedbackClassifier::default().band(27.0), TuningBand::VeryOff);
    }

    #[test]
    fn thresholds_are_validated() {
        assert!(FeedbackThresholds::new(10.0, 5.0).is_err());
        assert!(FeedbackThresholds::new(5.0, 5.0).is_err());
        assert!(FeedbackThresholds::new(0.0, 25.0).is_err());
        assert!(FeedbackThresholds::new(5.0, 60.0).is_err());
        assert!(FeedbackThresholds::new(f32::NAN, 25.0).is_err());
        assert!(FeedbackThresholds::default().validate().is_ok());
    }

    #[test]
    fn indicator_line_truncates_toward_zero() {
        let cases = [
            (0.0, 0),
            (9.9, 0),
            (-9.9, 0),
            (10.0, 10),
            (-15.0, -10),
            (47.0, 40),
            (50.0, 50),
            (75.0, 50),
            (-99.0, -50),
        ];
        for (cents, expected) in cases {
            assert_eq!(IndicatorLine::from_cents(cents).cents(), expected, "{cents} cents");
        }
    }

    #[test]
    fn indicator_positions_span_the_scale() {
        let lines: Vec<i32> = IndicatorLine::all().map(IndicatorLine::cents).collect();
        assert_eq!(lines, vec![-50, -40, -30, -20, -10, 0, 10, 20, 30, 40, 50]);
        assert_eq!(IndicatorLine::from_cents(-50.0).position(), 0);
        assert_eq!(IndicatorLine::CENTER.position(), 5);
        assert_eq!(IndicatorLine::from_cents(50.0).position(), 10);
    }

    #[test]
    fn exactly_one_line_is_active() {
        let classifier = TuningFeedbackClassifier::default();
        for cents in [-62.0, -33.0, -4.0, 0.0, 12.5, 28.0, 49.9] {
            let lines = classifier.indicator_lines(cents);
            let active = lines.iter().filter(|l| **l != LineState::Inactive).count();
            assert_eq!(active, 1, "{cents} cents");
        }

        let lines = classifier.indicator_lines(-33.0);
        assert_eq!(lines[2], LineState::Active(TuningBand::VeryOff));
        let lines = classifier.indicator_lines(12.5);
        assert_eq!(lines[6], LineState::Active(TuningBand::SlightlyOff));
        let lines = classifier.indicator_lines(-4.0);
        assert_eq!(lines[5], LineState::Active(TuningBand::Perfect));
    }

    #[test]
    fn blend_fractions() {
        let classifier = TuningFeedbackClassifier::default();

        let blend = classifier.blend(3.0);
        assert_eq!((blend.from, blend.to, blend.fraction), (TuningBand::Perfect, TuningBand::Perfect, 0.0));

        let blend = classifier.blend(-15.0);
        assert_eq!((blend.from, blend.to), (TuningBand::Perfect, TuningBand::SlightlyOff));
        assert!((blend.fraction - 0.5).abs() < 1e-6);

        let blend = classifier.blend(37.5);
        assert_eq!((blend.from, blend.to), (TuningBand::SlightlyOff, TuningBand::VeryOff));
        assert!((blend.fraction - 0.5).abs() < 1e-6);

        assert_eq!(classifier.blend(80.0).fraction, 1.0);
    }

    #[test]
    fn huge_deviations_pin_the_outer_lines() {
        assert_eq!(IndicatorLine::from_cents(1.0e10).cents(), 50);
        assert_eq!(IndicatorLine::from_cents(-1.0e10).cents(), -50);
        assert_eq!(IndicatorLine::from_cents(f32::INFINITY).cents(), 50);
        assert_eq!(IndicatorLine::from_cents(f32::NEG_INFINITY).cents(), -50);
        assert_eq!(IndicatorLine::from_cents(f32::MAX).position(), 10);

        let lines = TuningFeedbackClassifier::default().indicator_lines(1.0e10);
        assert_eq!(lines[10], LineState::Active(TuningBand::VeryOff));
        assert_eq!(lines.iter().filter(|l| **l != LineState::Inactive).count(), 1);
    }

    #[test]
    fn nan_lights_the_center_line_as_very_off() {
        let classifier = TuningFeedbackClassifier::default();
        assert_eq!(IndicatorLine::from_cents(f32::NAN), IndicatorLine::CENTER);

        let lines = classifier.indicator_lines(f32::NAN);
        assert_eq!(lines[5], LineState::Active(TuningBand::VeryOff));
        assert_eq!(lines.iter().filter(|l| **l != LineState::Inactive).count(), 1);

        let blend = classifier.blend(f32::NAN);
        assert_eq!((blend.from, blend.to, blend.fraction), (TuningBand::SlightlyOff, TuningBand::VeryOff, 1.0));
    }
}
