//! Engine sizing configuration
//!
//! Every capacity that bounds work or memory on the processing thread lives
//! here, so nothing on that thread ever has to grow a collection.

use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_QUANTUM_FRAMES, MAX_QUANTUM_FRAMES, SAMPLE_RATE};

/// Configuration for the voice engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Processing sample rate in Hz
    pub sample_rate: u32,
    /// Frames per processing quantum
    pub quantum_frames: usize,
    /// Maximum number of simultaneously live units
    pub max_units: usize,
    /// Capacity of each producer's FIFO lane
    pub command_capacity: usize,
    /// Maximum commands applied per quantum (the rest wait for the next one)
    pub max_commands_per_quantum: usize,
    /// Latest-wins slots per producer lane
    pub coalesce_slots: usize,
    /// Maximum number of attached producer lanes
    pub max_producers: usize,
    /// Publish a snapshot every N quanta (0 = only on DebugDump)
    pub snapshot_interval: u32,
    /// Capacity of the reload request queue to the loader worker
    pub reload_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            quantum_frames: DEFAULT_QUANTUM_FRAMES,
            max_units: 256,
            command_capacity: 1024,
            max_commands_per_quantum: 512,
            coalesce_slots: 128,
            max_producers: 8,
            snapshot_interval: 16,
            reload_queue_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Clamp every field into a workable range
    ///
    /// Called once before the engine is built; logs each adjustment.
    pub fn sanitized(mut self) -> Self {
        let quantum = self.quantum_frames.clamp(16, MAX_QUANTUM_FRAMES);
        if quantum != self.quantum_frames {
            log::warn!(
                "quantum_frames {} out of range, using {}",
                self.quantum_frames,
                quantum
            );
            self.quantum_frames = quantum;
        }
        if self.sample_rate < 8000 {
            log::warn!("sample_rate {} too low, using {}", self.sample_rate, SAMPLE_RATE);
            self.sample_rate = SAMPLE_RATE;
        }
        self.max_units = self.max_units.max(1);
        self.command_capacity = self.command_capacity.max(16);
        self.max_commands_per_quantum = self.max_commands_per_quantum.max(1);
        self.coalesce_slots = self.coalesce_slots.max(1);
        self.max_producers = self.max_producers.max(1);
        self.reload_queue_capacity = self.reload_queue_capacity.max(1);
        self
    }

    /// Duration of one quantum in seconds
    pub fn quantum_seconds(&self) -> f64 {
        self.quantum_frames as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_already_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.clone().sanitized(), config);
    }

    #[test]
    fn test_sanitize_clamps_quantum() {
        let config = EngineConfig {
            quantum_frames: 1 << 20,
            max_units: 0,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(config.quantum_frames, MAX_QUANTUM_FRAMES);
        assert_eq!(config.max_units, 1);
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config: EngineConfig = serde_yaml::from_str("quantum_frames: 480").unwrap();
        assert_eq!(config.quantum_frames, 480);
        assert_eq!(config.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn test_quantum_seconds() {
        let config = EngineConfig {
            sample_rate: 48000,
            quantum_frames: 480,
            ..Default::default()
        };
        assert!((config.quantum_seconds() - 0.01).abs() < 1e-12);
    }
}
