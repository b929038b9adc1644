//! Commands sent from control threads to the processing thread
//!
//! Commands are immutable values. Anything heap-allocated travels inside a
//! `basedrop::Owned`/`Shared` so that whichever thread drops the command,
//! the memory is released on the collector thread, never inside a quantum.
//!
//! ```ignore
//! let unit = registry.build("tone", &UnitSpec::default())?;
//! sender.enqueue(Command::create(id, unit))?;
//! sender.enqueue_latest(Target::Unit(id), ParamName::new("pan").unwrap(), ParamValue::Float(0.3));
//! ```

use std::fmt;
use std::path::PathBuf;

use basedrop::{Owned, Shared};

use super::gc::gc_handle;
use crate::preset::PresetTree;
use crate::types::{Frames, ParamName, ParamValue, Target, UnitId};
use crate::unit::Unit;

/// Transport commands (always FIFO)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    SetLooping(bool),
    SetRange { start: Frames, end: Frames },
    Seek(Frames),
}

/// Global settings addressed to the reserved engine target (id 0)
pub enum EngineSetting {
    /// Output gain, clamped to [0, 2] when applied
    MasterGain(f32),
    /// Request an output device change (acted on by the host)
    Device(Shared<String>),
    /// Request a new driver buffer size in frames (acted on by the host)
    BufferSize(u32),
}

impl fmt::Debug for EngineSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineSetting::MasterGain(g) => f.debug_tuple("MasterGain").field(g).finish(),
            EngineSetting::Device(name) => f.debug_tuple("Device").field(&name.as_str()).finish(),
            EngineSetting::BufferSize(n) => f.debug_tuple("BufferSize").field(n).finish(),
        }
    }
}

/// Commands processed by the engine at quantum boundaries
pub enum Command {
    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────
    /// Insert a unit built by the registry on the producer thread
    Create {
        id: UnitId,
        unit: Owned<Box<dyn Unit>>,
    },
    /// Remove a unit (deferred to the end of the current quantum)
    Destroy { id: UnitId },
    /// Set one parameter on a unit or on the engine
    Update {
        target: Target,
        param: ParamName,
        value: ParamValue,
    },
    /// Replace a unit's full configuration, all or nothing
    LoadPreset {
        id: UnitId,
        preset: Owned<PresetTree>,
    },
    /// Ask a unit to reload its backing media asynchronously
    Reload { id: UnitId, path: Shared<PathBuf> },

    // ─────────────────────────────────────────────────────────────
    // Transport / engine
    // ─────────────────────────────────────────────────────────────
    Transport(TransportCommand),
    Engine(EngineSetting),
    /// Publish a diagnostic snapshot immediately
    DebugDump,
}

impl Command {
    /// Wrap a freshly built unit for transfer to the processing thread
    pub fn create(id: UnitId, unit: Box<dyn Unit>) -> Self {
        Command::Create {
            id,
            unit: Owned::new(&gc_handle(), unit),
        }
    }

    pub fn load_preset(id: UnitId, preset: PresetTree) -> Self {
        Command::LoadPreset {
            id,
            preset: Owned::new(&gc_handle(), preset),
        }
    }

    pub fn reload(id: UnitId, path: impl Into<PathBuf>) -> Self {
        Command::Reload {
            id,
            path: Shared::new(&gc_handle(), path.into()),
        }
    }

    pub fn set_device(name: impl Into<String>) -> Self {
        Command::Engine(EngineSetting::Device(Shared::new(&gc_handle(), name.into())))
    }

    /// Unit addressed by this command, if any
    pub fn unit_id(&self) -> Option<UnitId> {
        match self {
            Command::Create { id, .. }
            | Command::Destroy { id }
            | Command::LoadPreset { id, .. }
            | Command::Reload { id, .. } => Some(*id),
            Command::Update {
                target: Target::Unit(id),
                ..
            } => Some(*id),
            _ => None,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Create { .. } => CommandKind::Create,
            Command::Destroy { .. } => CommandKind::Destroy,
            Command::Update { .. } => CommandKind::Update,
            Command::LoadPreset { .. } => CommandKind::LoadPreset,
            Command::Reload { .. } => CommandKind::Reload,
            Command::Transport(_) => CommandKind::Transport,
            Command::Engine(_) => CommandKind::Engine,
            Command::DebugDump => CommandKind::DebugDump,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create { id, unit } => f
                .debug_struct("Create")
                .field("id", id)
                .field("type", &unit.type_name())
                .finish(),
            Command::Destroy { id } => f.debug_struct("Destroy").field("id", id).finish(),
            Command::Update {
                target,
                param,
                value,
            } => f
                .debug_struct("Update")
                .field("target", target)
                .field("param", param)
                .field("value", value)
                .finish(),
            Command::LoadPreset { id, preset } => f
                .debug_struct("LoadPreset")
                .field("id", id)
                .field("params", &preset.params.len())
                .finish(),
            Command::Reload { id, path } => f
                .debug_struct("Reload")
                .field("id", id)
                .field("path", &**path)
                .finish(),
            Command::Transport(cmd) => f.debug_tuple("Transport").field(cmd).finish(),
            Command::Engine(setting) => f.debug_tuple("Engine").field(setting).finish(),
            Command::DebugDump => f.write_str("DebugDump"),
        }
    }
}

/// Discriminant of a [`Command`], for logging and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Create,
    Destroy,
    Update,
    LoadPreset,
    Reload,
    Transport,
    Engine,
    DebugDump,
}

/// A command stamped with its global enqueue sequence number
///
/// Stamps come from one counter shared by every producer, so sorting by
/// stamp gives a single "later enqueue wins" order for FIFO and coalesced
/// commands alike.
#[derive(Debug)]
pub struct Envelope {
    pub seq: u64,
    pub command: Command,
}
