//! Lock-free engine counters for monitoring threads
//!
//! Written by the processing thread once per quantum, read by anyone. These
//! are the only engine values readable without going through a snapshot;
//! they carry no structure, just counters.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Atomic counters shared between the processing thread and monitors
#[derive(Debug)]
pub struct EngineAtomics {
    /// Quanta processed since start
    pub quanta: AtomicU64,
    /// Quanta that took longer than their real-time budget
    pub overruns: AtomicU64,
    /// Duration of the most recent quantum in microseconds
    pub last_quantum_us: AtomicU64,
    /// Units in the live collection
    pub live_units: AtomicUsize,
    /// Commands applied successfully
    pub commands_applied: AtomicU64,
    /// Commands dropped (unknown id, bad params, lifecycle violations)
    pub commands_dropped: AtomicU64,
    /// Snapshots skipped because the reader held every pooled buffer
    pub snapshots_skipped: AtomicU64,
    /// Transport position at the end of the last quantum
    pub position: AtomicI64,
    /// Transport playing flag
    pub playing: AtomicBool,
}

impl EngineAtomics {
    pub fn new() -> Self {
        Self {
            quanta: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            last_quantum_us: AtomicU64::new(0),
            live_units: AtomicUsize::new(0),
            commands_applied: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            snapshots_skipped: AtomicU64::new(0),
            position: AtomicI64::new(0),
            playing: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn quanta(&self) -> u64 {
        self.quanta.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn live_units(&self) -> usize {
        self.live_units.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn commands_dropped(&self) -> u64 {
        self.commands_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

impl Default for EngineAtomics {
    fn default() -> Self {
        Self::new()
    }
}
