//! Host configuration
//!
//! Stored as YAML in the user's config directory.
//! Default location: ~/.config/mesh/host.yaml

use std::path::PathBuf;

use mesh_engine::audio::AudioConfig;
use mesh_engine::config::{self, EngineConfig};
use serde::{Deserialize, Serialize};

/// Config file name inside the mesh config directory
pub const CONFIG_FILE: &str = "host.yaml";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub engine: EngineConfig,
    pub audio: AudioConfig,
    pub control: ControlConfig,
    pub resources: ResourceConfig,
    pub monitor: MonitorConfig,
}

/// Control surface listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// UDP address for control datagrams (None = no UDP listener)
    pub udp_bind: Option<String>,
    /// Read control lines from stdin
    pub stdin: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            udp_bind: Some("127.0.0.1:9000".to_string()),
            stdin: true,
        }
    }
}

/// Where media files are looked up
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Base directory for relative resource paths
    pub root: Option<PathBuf>,
}

/// Snapshot polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Poll period in milliseconds
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_ms: 50 }
    }
}

/// Default config file path
pub fn default_config_path() -> PathBuf {
    config::default_config_path(CONFIG_FILE)
}
