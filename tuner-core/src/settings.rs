//! # Tuner Settings
//!
//! User-facing configuration: reference pitch, detection algorithm and
//! feedback thresholds. Settings are plain values; changing one produces a
//! new value, which callers hand to the [`crate::processor::AudioProcessor`].
//!
//! Settings are persisted as JSON.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::{
    algorithm::PitchDetectionAlgorithm,
    feedback::FeedbackThresholds,
    gating::DEFAULT_CONFIDENCE_THRESHOLD,
    tuning::{DEFAULT_REFERENCE_FREQUENCY_HZ, TuningReference},
};

/// Lowest reference pitch a user may select.
pub const MIN_REFERENCE_FREQUENCY_HZ: f32 = 400.0;

/// Highest reference pitch a user may select.
pub const MAX_REFERENCE_FREQUENCY_HZ: f32 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerSettings {
    reference_frequency_hz: f32,
    algorithm: PitchDetectionAlgorithm,
    confidence_threshold: f32,
    feedback: FeedbackThresholds,
}

impl Default for TunerSettings {
    fn default() -> Self {
        Self {
            reference_frequency_hz: DEFAULT_REFERENCE_FREQUENCY_HZ,
            algorithm: PitchDetectionAlgorithm::default(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            feedback: FeedbackThresholds::default(),
        }
    }
}

impl TunerSettings {
    pub fn reference_frequency_hz(&self) -> f32 {
        self.reference_frequency_hz
    }

    pub fn algorithm(&self) -> PitchDetectionAlgorithm {
        self.algorithm
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn feedback(&self) -> FeedbackThresholds {
        self.feedback
    }

    pub fn tuning_reference(&self) -> Result<TuningReference> {
        TuningReference::new(self.reference_frequency_hz)
    }

    /// Returns a copy with a new reference pitch.
    ///
    /// # Returns
    /// * `Err` - If `frequency_hz` lies outside [400, 500] Hz
    pub fn with_reference_frequency(self, frequency_hz: f32) -> Result<Self> {
        check_reference_frequency(frequency_hz)?;
        Ok(Self {
            reference_frequency_hz: frequency_hz,
            ..self
        })
    }

    pub fn with_algorithm(self, algorithm: PitchDetectionAlgorithm) -> Self {
        Self { algorithm, ..self }
    }

    pub fn with_confidence_threshold(self, threshold: f32) -> Result<Self> {
        let settings = Self {
            confidence_threshold: threshold,
            ..self
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_feedback(self, feedback: FeedbackThresholds) -> Self {
        Self { feedback, ..self }
    }

    /// Checks every field against its allowed range.
    pub fn validate(&self) -> Result<()> {
        check_reference_frequency(self.reference_frequency_hz)?;
        ensure!(
            (0.0..=1.0).contains(&self.confidence_threshold),
            "confidence threshold must be within [0, 1], got {}",
            self.confidence_threshold
        );
        self.feedback.validate()
    }

    /// Loads settings from a JSON file.
    ///
    /// Missing fields take their default values. The loaded settings are
    /// validated before they are returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)
            .with_context(|| format!("failed to open settings file {}", path.display()))?;
        let mut data = String::new();
        file.read_to_string(&mut data)?;
        let settings: TunerSettings = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Saves the settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json_string = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)
            .with_context(|| format!("failed to create settings file {}", path.display()))?;
        file.write_all(json_string.as_bytes())?;
        Ok(())
    }
}

fn check_reference_frequency(frequency_hz: f32) -> Result<()> {
    ensure!(
        (MIN_REFERENCE_FREQUENCY_HZ..=MAX_REFERENCE_FREQUENCY_HZ).contains(&frequency_hz),
        "reference frequency must be between {MIN_REFERENCE_FREQUENCY_HZ} and {MAX_REFERENCE_FREQUENCY_HZ} Hz, got {frequency_hz}"
    );
    Ok(())
}
