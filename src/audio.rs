use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoDevice,
    #[error("unsupported sample format {0:?}")]
    UnsupportedFormat(SampleFormat),
    #[error("failed to query device config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

/// Where rendered buffers go. The sink plays at most one buffer at a time:
/// submitting replaces whatever was in flight, starting over at its first
/// sample.
pub trait AudioSink {
    fn sample_rate(&self) -> u32;

    /// Largest sample magnitude the sink accepts.
    fn peak_amplitude(&self) -> i16 {
        i16::MAX
    }

    /// Swap in `samples` as the new in-flight buffer and start playing it.
    fn submit(&mut self, samples: &[i16]);

    /// Drop the in-flight buffer, leaving the sink silent.
    fn stop(&mut self);
}

/// Owns the audio host's device and stream configuration. Opened once at
/// startup and asked for sinks; everything torn down when dropped.
pub struct AudioContext {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
}

impl AudioContext {
    pub fn open() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        log::info!("using audio host: {}", host.id().name());

        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        if let Ok(name) = device.name() {
            log::info!("using output device: {}", name);
        }

        let config = device.default_output_config()?;
        let sample_format = config.sample_format();
        let config = cpal::StreamConfig::from(config);
        log::info!("output config: {:?} at {} Hz", sample_format, config.sample_rate.0);

        Ok(Self {
            device,
            config,
            sample_format,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Build and start an output stream, returning the sink that feeds it.
    pub fn open_sink(&self) -> Result<CpalSink, AudioError> {
        let shared = Arc::new(Mutex::new(Playback::default()));

        let stream = match self.sample_format {
            SampleFormat::F32 => create_stream::<f32>(&self.device, &self.config, Arc::clone(&shared)),
            SampleFormat::I16 => create_stream::<i16>(&self.device, &self.config, Arc::clone(&shared)),
            SampleFormat::U16 => create_stream::<u16>(&self.device, &self.config, Arc::clone(&shared)),
            other => return Err(AudioError::UnsupportedFormat(other)),
        }?;

        stream.play()?;

        Ok(CpalSink {
            shared,
            sample_rate: self.config.sample_rate.0,
            _stream: stream,
        })
    }
}

#[derive(Default)]
struct Playback {
    buffer: Vec<i16>,
    position: usize,
}

/// Sink backed by a live cpal output stream. The callback walks the shared
/// buffer once and then holds silence; playback stops when the sink drops.
pub struct CpalSink {
    shared: Arc<Mutex<Playback>>,
    sample_rate: u32,
    _stream: Stream,
}

impl AudioSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn submit(&mut self, samples: &[i16]) {
        if let Ok(mut playback) = self.shared.lock() {
            playback.buffer = samples.to_vec();
            playback.position = 0;
        }
    }

    fn stop(&mut self) {
        if let Ok(mut playback) = self.shared.lock() {
            playback.buffer.clear();
            playback.position = 0;
        }
    }
}

fn create_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Mutex<Playback>>,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let err_fn = |err| log::error!("an error occurred on the audio stream: {}", err);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let mut playback = match shared.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            for frame in data.chunks_mut(channels) {
                let value = if playback.position < playback.buffer.len() {
                    let sample = playback.buffer[playback.position];
                    playback.position += 1;
                    sample as f32 / i16::MAX as f32
                } else {
                    0.0
                };
                let value_t = T::from_sample(value);
                for sample in frame.iter_mut() {
                    *sample = value_t;
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
