//! Read-only engine snapshots for non-real-time threads
//!
//! The processing thread is the only writer of the live-unit collection and
//! the transport. Everything else sees copies, produced at quantum
//! boundaries and handed over through a fixed pool of pre-allocated buffers:
//!
//! ```text
//!                 ┌──────────── free ring ◄────────────┐
//!                 ▼                                    │
//!  processing: acquire() ─ fill ─ publish() ──► filled ring ──► reader: poll()
//! ```
//!
//! The reader always keeps the most recent snapshot it has seen and returns
//! older ones to the free ring. When the reader falls behind and every
//! buffer is in flight, the engine skips that snapshot instead of waiting.

use basedrop::Shared;
use serde::{Serialize, Serializer};

use super::sync::SyncPolicy;
use super::transport::TransportView;
use crate::types::{Frames, UnitState};

/// Buffers circulating between publisher and reader
pub const SNAPSHOT_POOL: usize = 4;

/// Why a snapshot was published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnapshotReason {
    Periodic,
    DebugDump,
}

/// Summary of one live unit
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitSummary {
    pub id: u32,
    pub type_name: &'static str,
    pub state: UnitState,
    pub sync: SyncPolicy,
    /// Length of the authoritative resource, if the unit has one
    pub resource_frames: Option<Frames>,
    pub playhead: Option<Frames>,
    /// Playhead as a fraction of the resource; `None` while length is unknown
    pub normalized_position: Option<f64>,
    /// Generation of an in-flight reload
    pub reload_pending: Option<u64>,
}

/// Copy of the engine state at one quantum boundary
#[derive(Clone, Serialize)]
pub struct EngineSnapshot {
    /// Quantum index at which the copy was taken
    pub quantum: u64,
    /// Microseconds since the engine was created
    pub timestamp_us: u64,
    pub reason: SnapshotReason,
    pub transport: TransportView,
    pub master_gain: f32,
    /// Output peak of the last rendered quantum
    pub peak: f32,
    #[serde(serialize_with = "serialize_shared_str")]
    pub pending_device: Option<Shared<String>>,
    pub pending_buffer_size: Option<u32>,
    pub units: Vec<UnitSummary>,
}

impl std::fmt::Debug for EngineSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSnapshot")
            .field("quantum", &self.quantum)
            .field("timestamp_us", &self.timestamp_us)
            .field("reason", &self.reason)
            .field("transport", &self.transport)
            .field("master_gain", &self.master_gain)
            .field("peak", &self.peak)
            .field("pending_device", &self.pending_device.as_deref().map(String::as_str))
            .field("pending_buffer_size", &self.pending_buffer_size)
            .field("units", &self.units)
            .finish()
    }
}

fn serialize_shared_str<S: Serializer>(
    value: &Option<Shared<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(name) => serializer.serialize_some(name.as_str()),
        None => serializer.serialize_none(),
    }
}

impl EngineSnapshot {
    /// Empty snapshot able to describe `max_units` units without growing
    pub fn with_capacity(max_units: usize) -> Self {
        Self {
            quantum: 0,
            timestamp_us: 0,
            reason: SnapshotReason::Periodic,
            transport: super::transport::TransportClock::new().view(),
            master_gain: 1.0,
            peak: 0.0,
            pending_device: None,
            pending_buffer_size: None,
            units: Vec::with_capacity(max_units),
        }
    }

    pub fn unit(&self, id: u32) -> Option<&UnitSummary> {
        self.units.iter().find(|unit| unit.id == id)
    }

    /// Render as pretty JSON (debug dumps)
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Create a publisher/reader pair sharing `pool` pre-allocated snapshots
pub fn snapshot_channel(pool: usize, max_units: usize) -> (SnapshotPublisher, SnapshotReader) {
    let pool = pool.max(2);
    let (mut free_tx, free_rx) = rtrb::RingBuffer::new(pool);
    let (filled_tx, filled_rx) = rtrb::RingBuffer::new(pool);

    for _ in 0..pool {
        let _ = free_tx.push(Box::new(EngineSnapshot::with_capacity(max_units)));
    }

    (
        SnapshotPublisher {
            free: free_rx,
            filled: filled_tx,
        },
        SnapshotReader {
            free: free_tx,
            filled: filled_rx,
            latest: None,
        },
    )
}

/// Processing-thread end
pub struct SnapshotPublisher {
    free: rtrb::Consumer<Box<EngineSnapshot>>,
    filled: rtrb::Producer<Box<EngineSnapshot>>,
}

impl SnapshotPublisher {
    /// Take a free buffer, or `None` if the reader holds all of them
    pub fn acquire(&mut self) -> Option<Box<EngineSnapshot>> {
        self.free.pop().ok()
    }

    /// Hand a filled buffer to the reader
    pub fn publish(&mut self, snapshot: Box<EngineSnapshot>) {
        // Both rings hold the whole pool, so this push cannot fail
        if self.filled.push(snapshot).is_err() {
            log::error!("Snapshot ring overflow");
        }
    }
}

/// Reader end, polled by UI or host threads
pub struct SnapshotReader {
    free: rtrb::Producer<Box<EngineSnapshot>>,
    filled: rtrb::Consumer<Box<EngineSnapshot>>,
    latest: Option<Box<EngineSnapshot>>,
}

impl SnapshotReader {
    /// Visit every snapshot published since the last poll, oldest first
    ///
    /// Returns how many were visited. The newest stays available through
    /// [`latest`](Self::latest).
    pub fn poll(&mut self, mut visit: impl FnMut(&EngineSnapshot)) -> usize {
        let mut count = 0;
        while let Ok(snapshot) = self.filled.pop() {
            visit(&snapshot);
            count += 1;
            if let Some(previous) = self.latest.replace(snapshot) {
                let _ = self.free.push(previous);
            }
        }
        count
    }

    /// Most recent snapshot seen by [`poll`](Self::poll)
    pub fn latest(&self) -> Option<&EngineSnapshot> {
        self.latest.as_deref()
    }

    /// Poll and return the newest snapshot, if any was ever published
    pub fn refresh(&mut self) -> Option<&EngineSnapshot> {
        self.poll(|_| {});
        self.latest()
    }
}
