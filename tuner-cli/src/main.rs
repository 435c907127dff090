//! # tuner-cli - Chromatic Tuner for the Terminal
//!
//! Headless front end for `tuner-core`: listens to the default microphone
//! and prints one line per detected note.
//!
//! ## Architecture
//! - **Main Thread**: argument parsing, settings, printing readings
//! - **Audio Thread**: capture and analysis, owned by [`AudioProcessor`]
//! - **Communication**: crossbeam channel carrying [`TunerReading`]s

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{after, never, select};
use log::info;
use std::path::PathBuf;
use std::time::Duration;
use tuner_core::{AudioProcessor, LineState, PitchDetectionAlgorithm, TunerReading, TunerSettings, TuningBand};

/// Chromatic instrument tuner
#[derive(Parser, Debug)]
#[command(name = "tuner-cli")]
#[command(about = "Listens to the microphone and shows the nearest note and its cent deviation")]
struct Args {
    /// Reference pitch for A4 in Hz (400-500)
    #[arg(short, long)]
    reference: Option<f32>,

    /// Pitch detection algorithm: mcleod, yin, fft-yin or amdf
    #[arg(short, long, value_parser = parse_algorithm)]
    algorithm: Option<PitchDetectionAlgorithm>,

    /// Settings file to load (JSON); missing files fall back to defaults
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long, requires = "settings")]
    save: bool,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_algorithm(s: &str) -> Result<PitchDetectionAlgorithm, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_level.as_str())).init();

    let settings = resolve_settings(&args)?;
    if args.save {
        if let Some(path) = &args.settings {
            settings.save(path)?;
            info!("Settings saved to {}", path.display());
        }
    }

    info!(
        "Tuning to A4 = {} Hz using {}",
        settings.reference_frequency_hz(),
        settings.algorithm()
    );

    let (readings_tx, readings_rx) = crossbeam_channel::unbounded();
    let mut processor = AudioProcessor::new(settings, readings_tx);
    processor.start()?;

    let deadline = args
        .seconds
        .map(|s| after(Duration::from_secs(s)))
        .unwrap_or_else(never);

    loop {
        select! {
            recv(readings_rx) -> msg => match msg {
                Ok(reading) => println!("{}", format_reading(&reading)),
                Err(_) => break,
            },
            recv(deadline) -> _ => {
                info!("Time limit reached");
                break;
            },
        }
    }

    processor.stop();
    Ok(())
}

/// Settings file first, then command-line overrides.
fn resolve_settings(args: &Args) -> Result<TunerSettings> {
    let mut settings = match &args.settings {
        Some(path) if path.exists() => TunerSettings::load(path)?,
        Some(path) => {
            info!("No settings at {}, using defaults", path.display());
            TunerSettings::default()
        }
        None => TunerSettings::default(),
    };

    if let Some(reference) = args.reference {
        settings = settings
            .with_reference_frequency(reference)
            .context("invalid --reference")?;
    }
    if let Some(algorithm) = args.algorithm {
        settings = settings.with_algorithm(algorithm);
    }
    Ok(settings)
}

fn line_symbol(state: LineState) -> char {
    match state {
        LineState::Inactive => '.',
        LineState::Active(TuningBand::Perfect) => '=',
        LineState::Active(TuningBand::SlightlyOff) => '+',
        LineState::Active(TuningBand::VeryOff) => '#',
    }
}

/// One display line, e.g. `A4    +3.2 cents  [.....=.....]  in tune`.
fn format_reading(reading: &TunerReading) -> String {
    let scale: String = reading.indicator.iter().copied().map(line_symbol).collect();
    format!(
        "{:<5} {:>+6.1} cents  [{}]  {}",
        reading.note.to_string(),
        reading.note.cents_off,
        scale,
        reading.feedback.band
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuner_core::{PitchSample, Tuner};

    #[test]
    fn formats_an_in_tune_reading() {
        let reading = Tuner::default().process(PitchSample::new(440.0, 0.9)).unwrap();
        assert_eq!(format_reading(&reading), "A4      +0.0 cents  [.....=.....]  in tune");
    }

    #[test]
    fn formats_a_flat_reading() {
        let reading = Tuner::default().process(PitchSample::new(430.0, 0.9)).unwrap();
        let line = format_reading(&reading);
        assert!(line.starts_with("A4"));
        assert!(line.contains("[..#........]"), "{line}");
        assert!(line.ends_with("very off"));
    }

    #[test]
    fn command_line_overrides_defaults() {
        let args = Args::parse_from(["tuner-cli", "--reference", "442", "--algorithm", "yin"]);
        let settings = resolve_settings(&args).unwrap();
        assert_eq!(settings.reference_frequency_hz(), 442.0);
        assert_eq!(settings.algorithm(), PitchDetectionAlgorithm::Yin);
    }

    #[test]
    fn out_of_range_reference_is_rejected() {
        let args = Args::parse_from(["tuner-cli", "--reference", "380"]);
        assert!(resolve_settings(&args).is_err());
    }

    #[test]
    fn save_requires_a_settings_path() {
        assert!(Args::try_parse_from(["tuner-cli", "--save"]).is_err());
    }
}
