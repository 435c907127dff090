//! # Audio Capture Module
//!
//! This module handles real-time microphone capture using CPAL (Cross-Platform Audio Library).
//! Captured samples are downmixed to mono and cut into overlapping analysis
//! windows, which are streamed to the analysis thread.
//!
//! ## Features
//! - Default input device selection
//! - Mono or multi-channel f32 input, downmixed to mono
//! - Overlapping analysis windows (4096 samples, hop of 1024 by default)

use anyhow::{Result, anyhow, ensure};
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use log::{debug, error, info};

/// Requested capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44100;

/// Samples per analysis window.
pub const WINDOW_SIZE: usize = 4096;

/// Samples shared by consecutive analysis windows.
pub const OVERLAP: usize = 3072;

/// Capture parameters owned by the audio layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub window_size: usize,
    pub overlap: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            window_size: WINDOW_SIZE,
            overlap: OVERLAP,
        }
    }
}

impl CaptureConfig {
    /// Samples between the starts of consecutive windows.
    pub fn hop_size(&self) -> usize {
        self.window_size - self.overlap
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.sample_rate > 0, "sample rate must be positive");
        ensure!(self.window_size > 0, "window size must be positive");
        ensure!(
            self.overlap < self.window_size,
            "overlap ({}) must be smaller than the window size ({})",
            self.overlap,
            self.window_size
        );
        Ok(())
    }
}

/// Accumulates incoming samples and emits overlapping windows.
#[derive(Debug)]
pub struct FrameAssembler {
    window_size: usize,
    hop_size: usize,
    buffer: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            window_size: config.window_size,
            hop_size: config.hop_size().max(1),
            buffer: Vec::with_capacity(config.window_size * 2),
        }
    }

    /// Appends samples and calls `emit` for every complete window.
    pub fn push(&mut self, data: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        self.buffer.extend_from_slice(data);

        // While we have enough data for a full window, hand it out and
        // advance by one hop.
        while self.buffer.len() >= self.window_size {
            emit(self.buffer[..self.window_size].to_vec());
            self.buffer.drain(..self.hop_size);
        }
    }

    /// Samples waiting for the next window.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Averages interleaved multi-channel samples into mono.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 input configuration, preferring mono and the requested rate
/// 3. Sets up a callback that streams analysis windows into `sender`
///
/// Windows are dropped when the channel is full, so a slow analysis thread
/// never stalls the audio callback.
///
/// # Arguments
/// * `sender` - Channel sender for streaming windows to the analysis thread
/// * `capture` - Requested sample rate, window and overlap
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Audio stream handle and the actual sample rate
/// * `Err(e)` - Error if audio setup fails
pub fn start_audio_capture(sender: Sender<Vec<f32>>, capture: CaptureConfig) -> Result<(cpal::Stream, u32)> {
    capture.validate()?;

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, capture.sample_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = capture.sample_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(sample_rate));
    let channels = usize::from(config.channels());
    let config: cpal::StreamConfig = config.into();

    info!("Selected sample rate: {} Hz, {} channel(s)", sample_rate, channels);

    let err_fn = |err| error!("An error occurred on the audio stream: {}", err);

    let mut assembler = FrameAssembler::new(&capture);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let mono = downmix(data, channels);
            assembler.push(&mono, |window| {
                // Send the window, ignoring errors if the channel is full.
                if sender.try_send(window).is_err() {
                    debug!("Analysis channel full, dropping window");
                }
            });
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Finds the best supported audio configuration for the target sample rate.
///
/// Only 32-bit float configurations qualify. Among those, fewer channels win,
/// then the range closest to `target_rate`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let rate_diff = if (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate) {
                0
            } else {
                let min_diff = c.min_sample_rate().0.abs_diff(target_rate);
                let max_diff = c.max_sample_rate().0.abs_diff(target_rate);
                min_diff.min(max_diff)
            };
            (c.channels(), rate_diff)
        })
}
