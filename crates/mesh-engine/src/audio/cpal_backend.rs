//! Device driver over CPAL
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────────────────┐
//! │ control threads  │─push──►│ CommandSender lanes          │
//! └──────────────────┘        └──────────────┬───────────────┘
//!                                            │ drain once per quantum
//!                             ┌──────────────▼───────────────┐
//!                             │ CPAL output callback         │
//!                             │  QuantumAdapter ─► VoiceEngine│
//!                             └──────────────────────────────┘
//! ```
//!
//! The callback owns the engine for as long as the stream runs. The mutex
//! around it is only contended while the driver is being stopped; the
//! callback uses `try_lock` and outputs silence rather than wait.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::adapter::QuantumAdapter;
use super::config::AudioConfig;
use super::error::{AudioError, AudioResult};
use crate::engine::VoiceEngine;

struct CallbackState {
    engine: VoiceEngine,
    adapter: QuantumAdapter,
}

/// Running output stream. Drop to stop audio, or [`stop`](Self::stop) to
/// get the engine back.
pub struct CpalDriver {
    stream: Stream,
    state: Arc<Mutex<CallbackState>>,
    device_name: String,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalDriver {
    /// Open the configured device and start rendering `engine` into it
    pub fn start(engine: VoiceEngine, config: &AudioConfig) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = match &config.device {
            Some(name) => find_device(&host, name)?,
            None => host
                .default_output_device()
                .ok_or(AudioError::NoDefaultDevice)?,
        };
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let sample_rate = engine.config().sample_rate;
        let quantum = engine.config().quantum_frames;
        let buffer_size = config.buffer_frames(quantum) as u32;
        let channels = output_channels(&device, sample_rate)?;

        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: CpalBufferSize::Fixed(buffer_size),
        };

        log::info!(
            "Using audio device: {} ({} channels, {}Hz, {} frames, ~{:.1}ms)",
            device_name,
            channels,
            sample_rate,
            buffer_size,
            buffer_size as f32 / sample_rate as f32 * 1000.0
        );

        let state = Arc::new(Mutex::new(CallbackState {
            engine,
            adapter: QuantumAdapter::new(buffer_size as usize),
        }));
        let stream = build_output_stream(&device, &stream_config, Arc::clone(&state))?;
        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            stream,
            state,
            device_name,
            sample_rate,
            buffer_size,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Audio latency in milliseconds (one-way, output only)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Close the stream and take the engine back
    pub fn stop(self) -> Option<VoiceEngine> {
        let Self { stream, state, .. } = self;
        if let Err(e) = stream.pause() {
            log::warn!("Failed to pause output stream: {}", e);
        }
        drop(stream);
        let state = Arc::try_unwrap(state).ok()?.into_inner().ok()?;
        Some(state.engine)
    }
}

fn find_device(host: &cpal::Host, name: &str) -> AudioResult<cpal::Device> {
    let mut devices = host
        .output_devices()
        .map_err(|e| AudioError::Unsupported(e.to_string()))?
        .peekable();
    if devices.peek().is_none() {
        return Err(AudioError::NoDevices);
    }
    devices
        .find(|device| device.name().map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Channel count of an f32 output config that supports the engine rate
fn output_channels(device: &cpal::Device, sample_rate: u32) -> AudioResult<u16> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::Unsupported(e.to_string()))?
        .collect();

    supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| sample_rate >= c.min_sample_rate().0 && sample_rate <= c.max_sample_rate().0)
        .map(|c| c.channels())
        .max_by_key(|channels| (*channels >= 2, std::cmp::Reverse(*channels)))
        .ok_or_else(|| {
            AudioError::Unsupported(format!("no f32 output configuration at {}Hz", sample_rate))
        })
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<Mutex<CallbackState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| match state.try_lock() {
                Ok(mut guard) => {
                    let CallbackState { engine, adapter } = &mut *guard;
                    adapter.fill(engine, data, channels);
                }
                Err(_) => data.fill(0.0),
            },
            move |err| {
                log::error!("Output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::Stream(e.to_string()))
}

/// Names of available output devices on the default host
pub fn output_device_names() -> Vec<String> {
    let host = cpal::default_host();
    match host.output_devices() {
        Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
        Err(e) => {
            log::warn!("Failed to enumerate output devices: {}", e);
            Vec::new()
        }
    }
}
