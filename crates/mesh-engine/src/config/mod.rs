//! Configuration for the voice engine and its hosts
//!
//! - Generic YAML config loading/saving
//! - Standard config file locations
//! - Engine sizing (sample rate, quantum, queue capacities)
//!
//! # Usage
//!
//! ```ignore
//! use mesh_engine::config::{load_config, default_config_path, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path("engine.yaml"));
//! ```

mod engine;
mod io;
mod paths;

pub use engine::EngineConfig;
pub use io::{load_config, read_config, save_config};
pub use paths::{default_config_dir, default_config_path};
