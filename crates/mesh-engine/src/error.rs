//! Error taxonomy for the voice engine
//!
//! None of these ever cross the processing-thread boundary as a failure:
//! the engine logs them and drops the offending command. They exist so that
//! producers, loaders and tests can observe *why* something was dropped.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::UnitId;

/// Malformed or unknown command (rejected before it reaches the engine)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Argument mismatch for {address}: expected {expected}")]
    ArgumentMismatch { address: String, expected: String },

    #[error("Invalid unit id {0} (id 0 is reserved for the engine)")]
    InvalidUnitId(i64),

    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    #[error("Invalid parameter name: {0:?}")]
    InvalidParamName(String),

    #[error("Invalid preset blob: {0}")]
    InvalidPreset(String),

    #[error("Invalid transport range {start}..{end}")]
    InvalidRange { start: i64, end: i64 },
}

/// Lifecycle rule violation (logged, no-op)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Unit {0} is already live")]
    DuplicateId(UnitId),

    #[error("Unit {0} does not exist")]
    UnknownId(UnitId),

    #[error("Live unit table is full ({0} units)")]
    CapacityExceeded(usize),

    #[error("Unit {id} has no parameter {param:?}")]
    UnknownParam { id: UnitId, param: crate::types::ParamName },
}

/// Command addressed to a unit that is mid-destruction (treated as unknown id)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Unit {0} is being destroyed")]
pub struct StateError(pub UnitId);

/// Resource load/reload failure; the unit keeps its previous handle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Failed to read {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Unsupported media format in {path:?}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Resource {0:?} has zero length")]
    ZeroLength(PathBuf),

    #[error("Unit {0} has no resource slot")]
    NoResourceSlot(UnitId),

    #[error("Reload queue is full")]
    QueueFull,
}

/// Preset tree could not be applied (prior configuration left untouched)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresetError {
    #[error("Failed to parse preset: {0}")]
    Parse(String),

    #[error("Preset is for unit type {found:?}, expected {expected:?}")]
    WrongType { expected: String, found: String },

    #[error("Unknown preset key: {0}")]
    UnknownKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Producer-side enqueue failure; the command is handed back
#[derive(Error, Debug)]
pub enum EnqueueError {
    #[error("Command lane is full")]
    Full(crate::engine::Command),

    #[error("Too many producers attached (limit {0})")]
    TooManyProducers(usize),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl EnqueueError {
    /// Recover the rejected command, if there was one
    pub fn into_command(self) -> Option<crate::engine::Command> {
        match self {
            EnqueueError::Full(command) => Some(command),
            _ => None,
        }
    }
}

/// Why the processing thread dropped a command
///
/// Returned by `VoiceEngine::apply` so tests and debug hosts can see the cause;
/// the quantum loop only logs it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplyError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Preset rejected for unit {id}: {source}")]
    Preset { id: UnitId, source: PresetError },
}

/// Result type for commands applied on the processing thread
pub type ApplyResult<T> = Result<T, ApplyError>;

/// Result type for enqueue operations
pub type EnqueueResult<T> = Result<T, EnqueueError>;

/// Result type for preset operations
pub type PresetResult<T> = Result<T, PresetError>;

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, ResourceError>;
