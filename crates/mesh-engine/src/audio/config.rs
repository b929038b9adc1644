//! Driver configuration
//!
//! Selects which driver runs the engine and how large its buffers are.

use serde::{Deserialize, Serialize};

use crate::types::MAX_QUANTUM_FRAMES;

/// Smallest accepted driver buffer (frames)
pub const MIN_BUFFER_SIZE: u32 = 16;

/// Which driver owns the processing thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioBackend {
    /// Dedicated thread against wall-clock deadlines, output discarded
    #[default]
    Headless,
    /// Real output device through cpal
    Device,
}

/// Configuration for the audio driver
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub backend: AudioBackend,

    /// Output device name (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    /// Driver buffer size in frames (None = engine quantum size)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u32>,
}

impl AudioConfig {
    pub fn headless() -> Self {
        Self::default()
    }

    pub fn device() -> Self {
        Self {
            backend: AudioBackend::Device,
            ..Default::default()
        }
    }

    /// Set the output device by name
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = Some(frames);
        self
    }

    /// Buffer size to use, falling back to `quantum` and clamped to what the
    /// engine can render in one go
    pub fn buffer_frames(&self, quantum: usize) -> usize {
        let frames = self.buffer_size.unwrap_or(quantum as u32);
        frames.clamp(MIN_BUFFER_SIZE, MAX_QUANTUM_FRAMES as u32) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_frames_falls_back_to_quantum() {
        assert_eq!(AudioConfig::headless().buffer_frames(256), 256);
        assert_eq!(AudioConfig::headless().with_buffer_frames(64).buffer_frames(256), 64);
        assert_eq!(
            AudioConfig::headless().with_buffer_frames(1 << 20).buffer_frames(256),
            MAX_QUANTUM_FRAMES
        );
    }

    #[test]
    fn test_yaml_backend_names() {
        let config: AudioConfig = serde_yaml::from_str("backend: device\ndevice: hw:1").unwrap();
        assert_eq!(config.backend, AudioBackend::Device);
        assert_eq!(config.device.as_deref(), Some("hw:1"));
        assert_eq!(config.buffer_size, None);
    }
}
