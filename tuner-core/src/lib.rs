// tuner-core/src/lib.rs

//! The core logic for the chromatic tuner.
//! This crate is responsible for audio capture, pitch detection, note
//! conversion and tuning feedback. It is completely headless
//! and contains no GUI code.
//!
//! The conversion and feedback path ([`tuning`], [`gating`], [`feedback`],
//! [`tuner`]) is pure and can be called from any thread.

pub mod algorithm;
pub mod audio;
pub mod feedback;
pub mod fft;
pub mod gating;
pub mod pitch;
pub mod processor;
pub mod settings;
pub mod tuner;
pub mod tuning;

pub use algorithm::PitchDetectionAlgorithm;
pub use feedback::{FeedbackThresholds, IndicatorLine, LineState, TuningBand, TuningFeedback, TuningFeedbackClassifier};
pub use gating::{ConfidenceGate, PitchSample};
pub use processor::AudioProcessor;
pub use settings::TunerSettings;
pub use tuner::{Tuner, TunerReading};
pub use tuning::{Note, PitchClass, PitchConverter, TuningReference};
