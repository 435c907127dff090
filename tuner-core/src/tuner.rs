//! The per-sample pipeline: gate, convert, classify.

use anyhow::Result;

use crate::{
    feedback::{INDICATOR_LINE_COUNT, IndicatorLine, LineState, TuningFeedback, TuningFeedbackClassifier},
    gating::{ConfidenceGate, PitchSample},
    settings::TunerSettings,
    tuning::{Note, PitchConverter},
};

/// Everything a front end needs to display one accepted sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunerReading {
    pub sample: PitchSample,
    pub note: Note,
    pub feedback: TuningFeedback,
    pub indicator_line: IndicatorLine,
    pub indicator: [LineState; INDICATOR_LINE_COUNT],
}

/// Immutable pipeline built from one [`TunerSettings`] value.
///
/// A settings change builds a new `Tuner`; there is nothing to lock.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tuner {
    gate: ConfidenceGate,
    converter: PitchConverter,
    classifier: TuningFeedbackClassifier,
}

impl Tuner {
    pub fn new(gate: ConfidenceGate, converter: PitchConverter, classifier: TuningFeedbackClassifier) -> Self {
        Self {
            gate,
            converter,
            classifier,
        }
    }

    pub fn from_settings(settings: &TunerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            gate: ConfidenceGate::new(settings.confidence_threshold())?,
            converter: PitchConverter::new(settings.tuning_reference()?),
            classifier: TuningFeedbackClassifier::new(settings.feedback()),
        })
    }

    pub fn converter(&self) -> &PitchConverter {
        &self.converter
    }

    pub fn classifier(&self) -> &TuningFeedbackClassifier {
        &self.classifier
    }

    /// Runs one detector sample through the pipeline.
    ///
    /// # Returns
    /// * `Some(reading)` - The sample passed the gate and mapped to a note
    /// * `None` - Low confidence or not a pitch
    pub fn process(&self, sample: PitchSample) -> Option<TunerReading> {
        let frequency_hz = self.gate.pass(&sample)?;
        let note = self.converter.hz_to_note(frequency_hz)?;
        Some(TunerReading {
            sample,
            note,
            feedback: self.classifier.classify(note.cents_off),
            indicator_line: IndicatorLine::from_cents(note.cents_off),
            indicator: self.classifier.indicator_lines(note.cents_off),
        })
    }
}
