//! Voice engine - commands, transport, live units and snapshots
//!
//! This module contains the real-time core:
//! - Command channel: wait-free multi-producer queue with latest-wins updates
//! - TransportClock: the single play/pause/stop/loop register
//! - UnitManager: the live-unit collection and its lifecycle
//! - Sync: how units follow the transport and consume reset pulses
//! - Snapshots and atomics: the only read paths for other threads
//! - VoiceEngine: the quantum loop tying everything together

mod atomics;
mod channel;
mod coalesce;
mod command;
mod engine;
mod gc;
mod lifecycle;
mod snapshot;
pub mod sync;
mod transport;

pub use atomics::EngineAtomics;
pub use channel::{command_channel, ChannelConfig, CommandHub, CommandReceiver, CommandSender};
pub use command::{Command, CommandKind, EngineSetting, Envelope, TransportCommand};
pub use engine::*;
pub use gc::gc_handle;
pub use lifecycle::UnitManager;
pub use snapshot::{
    snapshot_channel, EngineSnapshot, SnapshotPublisher, SnapshotReader, SnapshotReason, UnitSummary,
    SNAPSHOT_POOL,
};
pub use sync::{ResetTracker, SyncPolicy, SyncedUnit};
pub use transport::{TransportClock, TransportState, TransportView};
