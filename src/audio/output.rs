//! Real-time output stream driving the mixer
//!
//! The cpal stream is not `Send`, so it lives on a dedicated thread that
//! owns it until [`AudioOutput::stop`]. The mixer moves into the stream
//! callback; the callback itself never logs, locks or allocates.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::output_device;
use crate::audio::mixer::Mixer;
use crate::config::AudioConfig;
use crate::constants::DEFAULT_SAMPLE_RATE;
use crate::error::AudioError;

/// Running output stream
pub struct AudioOutput {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Receiver<AudioError>,
    frames_rendered: Arc<AtomicU64>,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Open the configured device and start pulling from `mixer`.
    ///
    /// Blocks until the stream is playing or failed to open.
    pub fn start(config: &AudioConfig, mut mixer: Mixer) -> Result<Self, AudioError> {
        let device = output_device(config.device.as_deref())?;
        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;
        if default_config.sample_format() != cpal::SampleFormat::F32 {
            let supports_f32 = device
                .supported_output_configs()
                .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?
                .any(|c| c.sample_format() == cpal::SampleFormat::F32);
            if !supports_f32 {
                return Err(AudioError::UnsupportedFormat(format!(
                    "{:?} only, f32 output required",
                    default_config.sample_format()
                )));
            }
            tracing::debug!(
                "Device default format is {:?}, requesting f32",
                default_config.sample_format()
            );
        }

        let stream_config = StreamConfig {
            channels: config.channels.unwrap_or(default_config.channels()),
            sample_rate: cpal::SampleRate(config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)),
            buffer_size: match config.buffer_size {
                Some(size) => cpal::BufferSize::Fixed(size),
                None => cpal::BufferSize::Default,
            },
        };
        let channels = stream_config.channels;
        let sample_rate = stream_config.sample_rate.0;

        let running = Arc::new(AtomicBool::new(true));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);

        let running_for_loop = running.clone();
        let frames = frames_rendered.clone();
        let handle = thread::Builder::new()
            .name("haptics-audio-out".to_string())
            .spawn(move || {
                let stream = device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        mixer.fill_buffer(data, channels as usize, sample_rate);
                        let rendered = data.len() / channels.max(1) as usize;
                        frames.fetch_add(rendered as u64, Ordering::Relaxed);
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Stream is dropped here, stopping playback
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        let ready = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(AudioError::StreamError("output thread exited".to_string())));
        if let Err(e) = ready {
            running.store(false, Ordering::SeqCst);
            let _ = handle.join();
            return Err(e);
        }

        tracing::info!(
            "Audio output started: {} channels at {} Hz",
            channels,
            sample_rate
        );

        Ok(Self {
            running,
            thread_handle: Some(handle),
            error_rx,
            frames_rendered,
            sample_rate,
            channels,
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::info!("Audio output stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Next error reported by the stream callback, if any
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.try_recv().ok()
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
