//! # Audio Processor
//!
//! Owns the dedicated analysis thread: microphone capture, pitch detection
//! and the [`Tuner`] pipeline. Readings leave the thread on a crossbeam
//! channel; the receiving side decides how to display them.
//!
//! ## Architecture
//! - **Audio callback**: cuts captured samples into windows (see [`crate::audio`])
//! - **Analysis thread**: detects pitch per window and runs the tuner pipeline
//! - **Control**: settings changes and shutdown arrive as [`WorkerCommand`]s

use anyhow::{Context, Result, anyhow};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, trace, warn};
use std::thread::{self, JoinHandle};

use crate::{
    audio::{self, CaptureConfig},
    pitch::{self, PitchDetector},
    settings::TunerSettings,
    tuner::{Tuner, TunerReading},
};

/// Windows buffered between the audio callback and the analysis thread.
const FRAME_QUEUE_DEPTH: usize = 8;

/// Messages from the owning [`AudioProcessor`] to its analysis thread.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Replace the pipeline, e.g. after the reference pitch changed
    Retune(Tuner),
    Shutdown,
}

/// Analysis thread management structure.
#[derive(Debug)]
struct AudioWorker {
    commands: Sender<WorkerCommand>,
    thread_handle: Option<JoinHandle<()>>,
}

/// Starts, re-tunes and stops microphone analysis.
///
/// Dropping the processor stops the analysis thread.
#[derive(Debug)]
pub struct AudioProcessor {
    settings: TunerSettings,
    capture: CaptureConfig,
    readings: Sender<TunerReading>,
    worker: Option<AudioWorker>,
}

impl AudioProcessor {
    pub fn new(settings: TunerSettings, readings: Sender<TunerReading>) -> Self {
        Self {
            settings,
            capture: CaptureConfig::default(),
            readings,
            worker: None,
        }
    }

    pub fn with_capture_config(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    pub fn settings(&self) -> &TunerSettings {
        &self.settings
    }

    pub fn is_processing(&self) -> bool {
        self.worker
            .as_ref()
            .and_then(|w| w.thread_handle.as_ref())
            .is_some_and(|h| !h.is_finished())
    }

    /// Starts capture and analysis on a dedicated thread.
    ///
    /// Does nothing if the thread is already running. A thread that exited on
    /// its own is reaped and replaced. Returns once the audio stream is
    /// playing, or with the error that prevented it.
    pub fn start(&mut self) -> Result<()> {
        if self.reap_finished_worker() {
            return Ok(());
        }

        let tuner = Tuner::from_settings(&self.settings)?;
        let algorithm = self.settings.algorithm();
        let capture = self.capture;
        capture.validate()?;
        let readings = self.readings.clone();

        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);

        let thread_handle = thread::Builder::new()
            .name("audio-dispatcher".into())
            .spawn(move || {
                info!("Starting audio thread ({algorithm})");
                let (frames_tx, frames_rx) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);

                let (stream, sample_rate) = match audio::start_audio_capture(frames_tx, capture) {
                    Ok(started) => {
                        let _ = ready_tx.send(Ok(()));
                        started
                    }
                    Err(e) => {
                        error!("Error starting audio capture: {e:#}");
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let mut detector = pitch::create_detector(algorithm, sample_rate);
                run_analysis_loop(frames_rx, commands_rx, detector.as_mut(), tuner, readings);

                info!("Stopping stream and exiting audio thread");
                if let Err(e) = stream.pause() {
                    warn!("Error pausing stream: {e}");
                }
                drop(stream);
            })
            .context("failed to spawn audio thread")?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("audio thread exited before capture started")));

        match started {
            Ok(()) => {
                self.worker = Some(AudioWorker {
                    commands: commands_tx,
                    thread_handle: Some(thread_handle),
                });
                Ok(())
            }
            Err(e) => {
                if thread_handle.join().is_err() {
                    error!("Audio thread panicked during startup");
                }
                Err(e.context("failed to start audio processing"))
            }
        }
    }

    /// Drops a worker whose thread has already exited.
    ///
    /// Returns `true` if a live worker remains.
    fn reap_finished_worker(&mut self) -> bool {
        if self.worker.is_none() {
            return false;
        }
        if self.is_processing() {
            return true;
        }
        debug!("Audio thread exited on its own, reaping it");
        self.stop();
        false
    }

    /// Signals the analysis thread to stop and waits for it.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            info!("Shutting down audio worker");
            let _ = worker.commands.send(WorkerCommand::Shutdown);
            if let Some(handle) = worker.thread_handle.take() {
                if handle.join().is_err() {
                    error!("Audio thread panicked");
                }
            }
        }
    }

    /// Applies new settings.
    ///
    /// A running thread receives a fresh [`Tuner`]; a change of detection
    /// algorithm restarts capture so the new detector takes over.
    pub fn update_settings(&mut self, settings: TunerSettings) -> Result<()> {
        let tuner = Tuner::from_settings(&settings)?;
        let algorithm_changed = settings.algorithm() != self.settings.algorithm();
        self.settings = settings;

        let Some(worker) = &self.worker else {
            return Ok(());
        };

        if algorithm_changed {
            info!("Detection algorithm changed to {}, restarting", settings.algorithm());
            self.stop();
            return self.start();
        }

        if worker.commands.send(WorkerCommand::Retune(tuner)).is_err() {
            warn!("Audio thread is gone, settings will apply on next start");
            self.stop();
        }
        Ok(())
    }
}

impl Drop for AudioProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs detection and the tuner pipeline until told to stop.
///
/// The loop exits on [`WorkerCommand::Shutdown`], when the command or frame
/// channel disconnects, or when nobody listens for readings anymore.
/// Commands queued before a frame are applied before that frame is analyzed.
pub fn run_analysis_loop(
    frames: Receiver<Vec<f32>>,
    commands: Receiver<WorkerCommand>,
    detector: &mut dyn PitchDetector,
    mut tuner: Tuner,
    readings: Sender<TunerReading>,
) {
    loop {
        crossbeam_channel::select! {
            recv(frames) -> msg => match msg {
                Ok(frame) => {
                    for command in commands.try_iter() {
                        if !apply_command(command, &mut tuner) {
                            return;
                        }
                    }
                    let Some(sample) = detector.detect(&frame) else {
                        continue;
                    };
                    trace!("Detected {:.2} Hz (confidence {:.3})", sample.frequency_hz, sample.confidence);
                    if let Some(reading) = tuner.process(sample) {
                        if readings.send(reading).is_err() {
                            info!("Reading receiver dropped");
                            break;
                        }
                    }
                }
                Err(_) => {
                    info!("Audio channel closed");
                    break;
                }
            },
            recv(commands) -> msg => match msg {
                Ok(command) => {
                    if !apply_command(command, &mut tuner) {
                        break;
                    }
                }
                Err(_) => {
                    info!("Control channel closed");
                    break;
                }
            },
        }
    }
}

/// Returns `false` when the loop should stop.
fn apply_command(command: WorkerCommand, tuner: &mut Tuner) -> bool {
    match command {
        WorkerCommand::Retune(new_tuner) => {
            debug!("Applying new tuning: A4 = {} Hz", new_tuner.converter().reference().frequency_hz());
            *tuner = new_tuner;
            true
        }
        WorkerCommand::Shutdown => {
            info!("Received shutdown signal");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::PitchDetectionAlgorithm;
    use crate::audio::{SAMPLE_RATE, WINDOW_SIZE};
    use crate::feedback::TuningBand;
    use std::time::Duration;

    fn sine(frequency: f32) -> Vec<f32> {
        (0..WINDOW_SIZE)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32).sin())
            .collect()
    }

    fn spawn_loop(
        tuner: Tuner,
    ) -> (
        Sender<Vec<f32>>,
        Sender<WorkerCommand>,
        Receiver<TunerReading>,
        JoinHandle<()>,
    ) {
        let (frames_tx, frames_rx) = crossbeam_channel::unbounded();
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let (readings_tx, readings_rx) = crossbeam_channel::unbounded();
        let handle = thread::spawn(move || {
            let mut detector = pitch::create_detector(PitchDetectionAlgorithm::Yin, SAMPLE_RATE);
            run_analysis_loop(frames_rx, commands_rx, detector.as_mut(), tuner, readings_tx);
        });
        (frames_tx, commands_tx, readings_rx, handle)
    }

    #[test]
    fn frames_become_readings() {
        let (frames, commands, readings, handle) = spawn_loop(Tuner::default());

        frames.send(vec![0.0; WINDOW_SIZE]).unwrap();
        frames.send(sine(440.0)).unwrap();
        drop(frames);
        handle.join().unwrap();

        let collected: Vec<TunerReading> = readings.try_iter().collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].note.to_string(), "A4");
        assert_eq!(collected[0].feedback.band, TuningBand::Perfect);
        drop(commands);
    }

    #[test]
    fn retune_applies_to_later_frames() {
        let (frames, commands, readings, handle) = spawn_loop(Tuner::default());

        frames.send(sine(440.0)).unwrap();
        let first = readings.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(first.note.cents_off.abs() < 5.0);

        let settings = TunerSettings::default().with_reference_frequency(432.0).unwrap();
        commands
            .send(WorkerCommand::Retune(Tuner::from_settings(&settings).unwrap()))
            .unwrap();
        frames.send(sine(440.0)).unwrap();
        let second = readings.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(second.note.to_string(), "A4");
        assert!((second.note.cents_off - 31.8).abs() < 5.0);

        commands.send(WorkerCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn loop_ends_when_readings_are_unwanted() {
        let (frames, _commands, readings, handle) = spawn_loop(Tuner::default());
        drop(readings);
        frames.send(sine(440.0)).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn settings_update_without_a_running_thread() {
        let (readings_tx, _readings_rx) = crossbeam_channel::unbounded();
        let mut processor = AudioProcessor::new(TunerSettings::default(), readings_tx);
        assert!(!processor.is_processing());

        let settings = TunerSettings::default()
            .with_reference_frequency(415.0)
            .unwrap()
            .with_algorithm(PitchDetectionAlgorithm::Amdf);
        processor.update_settings(settings).unwrap();
        assert_eq!(processor.settings(), &settings);
        assert!(!processor.is_processing());

        processor.stop();
    }

    fn attach_worker(processor: &mut AudioProcessor, body: impl FnOnce(Receiver<WorkerCommand>) + Send + 'static) {
        let (commands_tx, commands_rx) = crossbeam_channel::unbounded();
        let handle = thread::spawn(move || body(commands_rx));
        processor.worker = Some(AudioWorker {
            commands: commands_tx,
            thread_handle: Some(handle),
        });
    }

    #[test]
    fn exited_worker_is_reaped() {
        let (readings_tx, _readings_rx) = crossbeam_channel::unbounded();
        let capture = CaptureConfig {
            overlap: WINDOW_SIZE,
            ..CaptureConfig::default()
        };
        let mut processor = AudioProcessor::new(TunerSettings::default(), readings_tx).with_capture_config(capture);
        attach_worker(&mut processor, |_commands| {});

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while processor.is_processing() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!processor.is_processing());

        // The dead worker must not make start() a no-op; it gets as far as
        // validating the capture config.
        assert!(processor.start().is_err());
        assert!(processor.worker.is_none());
        assert!(!processor.reap_finished_worker());
    }

    #[test]
    fn running_worker_is_kept() {
        let (readings_tx, _readings_rx) = crossbeam_channel::unbounded();
        let mut processor = AudioProcessor::new(TunerSettings::default(), readings_tx);
        attach_worker(&mut processor, |commands| {
            let _ = commands.recv();
        });

        assert!(processor.reap_finished_worker());
        assert!(processor.worker.is_some());
        assert!(processor.start().is_ok());
        assert!(processor.is_processing());

        processor.stop();
        assert!(!processor.is_processing());
        assert!(processor.worker.is_none());
    }

    #[test]
    fn invalid_capture_config_fails_before_opening_a_device() {
        let (readings_tx, _readings_rx) = crossbeam_channel::unbounded();
        let capture = CaptureConfig {
            overlap: WINDOW_SIZE,
            ..CaptureConfig::default()
        };
        let mut processor = AudioProcessor::new(TunerSettings::default(), readings_tx).with_capture_config(capture);
        assert!(processor.start().is_err());
        assert!(!processor.is_processing());
    }
}
