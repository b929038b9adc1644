//! Latest-wins coalescing table for high-rate parameter updates
//!
//! Each producer lane owns one table with a fixed number of slots. The
//! producer is the only writer; the processing thread is the only reader.
//! A slot holds the latest value for one `(target, param)` key and is
//! protected by a seqlock, so neither side ever blocks:
//!
//! ```text
//!  writer: version+1 (odd) ─► fields ─► version+1 (even)
//!  reader: version (even?) ─► fields ─► version unchanged? ─► accept
//! ```
//!
//! The reader marks a slot drained by storing the stamp it took into
//! `consumed`. The writer recycles a slot once `consumed == seq`.

use std::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::types::{ParamName, ParamValue, Target, UnitId, MAX_PARAM_NAME};

/// Reader retries before giving up on a slot for this quantum
const READ_ATTEMPTS: usize = 4;

const NAME_WORDS: usize = MAX_PARAM_NAME / 8;

#[derive(Default)]
struct Slot {
    version: AtomicU64,
    target: AtomicU32,
    name: [AtomicU64; NAME_WORDS],
    name_len: AtomicU8,
    key: AtomicU64,
    value: AtomicU64,
    is_int: AtomicBool,
    /// Stamp of the latest write
    seq: AtomicU64,
    /// Stamp of the latest value the reader took
    consumed: AtomicU64,
}

/// A coalesced update read out of a slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CoalescedUpdate {
    pub seq: u64,
    pub target: Target,
    pub param: ParamName,
    pub value: ParamValue,
}

/// Shared slot storage (one writer, one reader)
pub(crate) struct CoalesceTable {
    slots: Box<[Slot]>,
}

impl CoalesceTable {
    pub fn new(slots: usize) -> Self {
        Self {
            slots: (0..slots.max(1)).map(|_| Slot::default()).collect(),
        }
    }

    /// Whether any slot holds a value the reader has not taken
    pub fn has_pending(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.seq.load(Ordering::Acquire) != s.consumed.load(Ordering::Relaxed))
    }

    /// Take every pending value with a stamp at or below `limit()`
    ///
    /// `limit` reports the stamp of the oldest ordered command still queued
    /// by the same producer, or `None` when there is none. It is asked after
    /// each slot read: the producer queues an ordered command before it
    /// writes any later value, so a value seen here implies its predecessors
    /// are visible to `limit`. Values newer than the limit stay in place for
    /// a later drain. A slot that is mid-write after a few attempts is also
    /// left for later.
    pub fn drain_into(
        &self,
        limit: impl Fn() -> Option<u64>,
        mut f: impl FnMut(CoalescedUpdate),
    ) -> usize {
        let mut taken = 0;
        for slot in self.slots.iter() {
            let seq = slot.seq.load(Ordering::Acquire);
            if seq == slot.consumed.load(Ordering::Relaxed) {
                continue;
            }
            let Some(update) = Self::read_slot(slot) else {
                continue;
            };
            if limit().is_some_and(|limit| update.seq > limit) {
                continue;
            }
            slot.consumed.store(update.seq, Ordering::Release);
            f(update);
            taken += 1;
        }
        taken
    }

    fn read_slot(slot: &Slot) -> Option<CoalescedUpdate> {
        for _ in 0..READ_ATTEMPTS {
            let before = slot.version.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let target = slot.target.load(Ordering::Relaxed);
            let mut words = [0u64; NAME_WORDS];
            for (word, atomic) in words.iter_mut().zip(slot.name.iter()) {
                *word = atomic.load(Ordering::Relaxed);
            }
            let name_len = slot.name_len.load(Ordering::Relaxed);
            let key = slot.key.load(Ordering::Relaxed);
            let value = slot.value.load(Ordering::Relaxed);
            let is_int = slot.is_int.load(Ordering::Relaxed);
            let seq = slot.seq.load(Ordering::Relaxed);

            fence(Ordering::Acquire);
            if slot.version.load(Ordering::Relaxed) == before {
                return Some(CoalescedUpdate {
                    seq,
                    target: Target::from_raw(target),
                    param: ParamName::from_words(words, name_len, key),
                    value: ParamValue::from_bits(value, is_int),
                });
            }
        }
        None
    }
}

/// Producer-side handle: the single writer of a [`CoalesceTable`]
pub(crate) struct CoalesceWriter {
    table: Arc<CoalesceTable>,
    /// Writer-private record of which key each slot holds
    keys: Box<[Option<(u32, u64)>]>,
}

impl CoalesceWriter {
    pub fn new(table: Arc<CoalesceTable>) -> Self {
        let keys = vec![None; table.slots.len()].into_boxed_slice();
        Self { table, keys }
    }

    /// Store the latest value for `(target, param)`
    ///
    /// Returns `false` when every slot holds a different undrained key.
    pub fn write(&mut self, target: Target, param: ParamName, value: ParamValue, seq: u64) -> bool {
        let raw_target = match target {
            Target::Engine => 0,
            Target::Unit(id) => UnitId::get(id),
        };
        let key = (raw_target, param.key());

        let index = match self.keys.iter().position(|k| *k == Some(key)) {
            Some(index) => index,
            None => match self.free_slot() {
                Some(index) => index,
                None => return false,
            },
        };

        let slot = &self.table.slots[index];
        let (words, name_len) = param.to_words();
        let (bits, is_int) = value.to_bits();

        let version = slot.version.load(Ordering::Relaxed);
        slot.version.store(version.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        slot.target.store(raw_target, Ordering::Relaxed);
        for (atomic, word) in slot.name.iter().zip(words.iter()) {
            atomic.store(*word, Ordering::Relaxed);
        }
        slot.name_len.store(name_len, Ordering::Relaxed);
        slot.key.store(param.key(), Ordering::Relaxed);
        slot.value.store(bits, Ordering::Relaxed);
        slot.is_int.store(is_int, Ordering::Relaxed);
        slot.seq.store(seq, Ordering::Relaxed);

        slot.version.store(version.wrapping_add(2), Ordering::Release);
        self.keys[index] = Some(key);
        true
    }

    fn free_slot(&self) -> Option<usize> {
        self.keys.iter().enumerate().position(|(index, key)| {
            if key.is_none() {
                return true;
            }
            let slot = &self.table.slots[index];
            slot.consumed.load(Ordering::Acquire) == slot.seq.load(Ordering::Relaxed)
        })
    }
}
