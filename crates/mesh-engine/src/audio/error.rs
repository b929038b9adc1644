//! Driver error types

use thiserror::Error;

/// Why a driver could not start
///
/// Once a driver is running, failures inside the callback are logged and
/// answered with silence; they never surface here.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No output devices found")]
    NoDevices,

    #[error("No default output device")]
    NoDefaultDevice,

    #[error("Output device not found: {0}")]
    DeviceNotFound(String),

    /// The device cannot run at the engine's rate or format
    #[error("Unsupported device configuration: {0}")]
    Unsupported(String),

    /// Backend error while opening or starting the stream
    #[error("Output stream failed: {0}")]
    Stream(String),

    #[error("Failed to spawn processing thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// Backend requested in config is not compiled in
    #[error("Driver not available in this build (feature {0:?})")]
    BackendUnavailable(&'static str),
}

/// Result type for driver operations
pub type AudioResult<T> = Result<T, AudioError>;
