//! Drivers that own the processing thread
//!
//! A driver takes the [`VoiceEngine`] by value and calls
//! [`VoiceEngine::process`] once per quantum from a single thread:
//!
//! - **Headless**: a `mesh-processing` thread paced by the wall clock
//! - **Device** (feature `device-output`): a CPAL output stream callback
//!
//! Both hand the engine back when stopped, so a host can restart with a new
//! device or buffer size without losing units or transport state.
//!
//! ```ignore
//! use mesh_engine::audio::{start_audio, AudioConfig};
//!
//! let (engine, handles) = VoiceEngine::new(config.engine.clone());
//! let driver = start_audio(engine, &AudioConfig::headless())?;
//! // ... later, to apply a buffer size request:
//! let engine = driver.stop().expect("driver thread panicked");
//! ```

mod adapter;
mod config;
mod error;
mod headless;

#[cfg(feature = "device-output")]
mod cpal_backend;

pub use adapter::QuantumAdapter;
pub use config::{AudioBackend, AudioConfig, MIN_BUFFER_SIZE};
pub use error::{AudioError, AudioResult};
pub use headless::HeadlessDriver;

#[cfg(feature = "device-output")]
pub use cpal_backend::{output_device_names, CpalDriver};

use crate::engine::VoiceEngine;

/// A running driver
pub enum AudioHandle {
    Headless(HeadlessDriver),
    #[cfg(feature = "device-output")]
    Device(CpalDriver),
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioHandle::Headless(h) => h.sample_rate(),
            #[cfg(feature = "device-output")]
            AudioHandle::Device(h) => h.sample_rate(),
        }
    }

    /// Frames per driver callback
    pub fn buffer_size(&self) -> u32 {
        match self {
            AudioHandle::Headless(h) => h.buffer_size() as u32,
            #[cfg(feature = "device-output")]
            AudioHandle::Device(h) => h.buffer_size(),
        }
    }

    /// Stop the driver and take the engine back
    pub fn stop(self) -> Option<VoiceEngine> {
        match self {
            AudioHandle::Headless(h) => h.stop(),
            #[cfg(feature = "device-output")]
            AudioHandle::Device(h) => h.stop(),
        }
    }
}

/// Start the driver selected by `config`
pub fn start_audio(engine: VoiceEngine, config: &AudioConfig) -> AudioResult<AudioHandle> {
    match config.backend {
        AudioBackend::Headless => {
            let frames = config.buffer_frames(engine.config().quantum_frames);
            Ok(AudioHandle::Headless(HeadlessDriver::start(engine, frames)?))
        }
        #[cfg(feature = "device-output")]
        AudioBackend::Device => Ok(AudioHandle::Device(CpalDriver::start(engine, config)?)),
        #[cfg(not(feature = "device-output"))]
        AudioBackend::Device => Err(AudioError::BackendUnavailable("device-output")),
    }
}
