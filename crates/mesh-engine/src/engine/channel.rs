//! Multi-producer command channel into the processing thread
//!
//! Every producer thread owns a [`CommandSender`] with two private lanes:
//! an SPSC `rtrb` ring for ordered commands and a coalescing table for
//! latest-wins parameter updates. The processing thread owns the single
//! [`CommandReceiver`] and drains all lanes once per quantum.
//!
//! ```text
//!  UI thread ──► CommandSender ─┬─ rtrb ring ──────┐
//!                               └─ coalesce table ─┤
//!  OSC thread ─► CommandSender ─┬─ rtrb ring ──────┼──► CommandReceiver::drain()
//!                               └─ coalesce table ─┘      (sorted by stamp)
//! ```
//!
//! Every enqueue takes a stamp from one shared counter, and `drain` yields
//! commands in stamp order: within a producer that is FIFO, and for a
//! coalesced key the latest enqueue always wins.
//!
//! # Usage
//!
//! ```ignore
//! let (hub, mut receiver) = command_channel(&config);
//! let mut sender = hub.sender()?;
//!
//! // Producer thread (never blocks)
//! sender.enqueue(Command::Transport(TransportCommand::Play))?;
//! sender.enqueue_latest(Target::Unit(id), pan, ParamValue::Float(0.25))?;
//!
//! // Processing thread, once per quantum
//! for envelope in receiver.drain() {
//!     engine.apply(envelope.command);
//! }
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use basedrop::Owned;

use super::coalesce::{CoalesceTable, CoalesceWriter};
use super::command::{Command, Envelope};
use super::gc::gc_handle;
use crate::config::EngineConfig;
use crate::error::{EnqueueError, EnqueueResult};
use crate::types::{ParamName, ParamValue, Target};

/// Sizing for a command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// FIFO capacity per producer lane
    pub capacity: usize,
    /// FIFO commands taken per drain
    pub max_per_drain: usize,
    /// Coalescing slots per producer lane
    pub coalesce_slots: usize,
    /// Maximum attached producers
    pub max_producers: usize,
}

impl From<&EngineConfig> for ChannelConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            capacity: config.command_capacity,
            max_per_drain: config.max_commands_per_quantum,
            coalesce_slots: config.coalesce_slots,
            max_producers: config.max_producers,
        }
    }
}

/// Receiver-side view of one producer
struct Lane {
    commands: rtrb::Consumer<Envelope>,
    table: Arc<CoalesceTable>,
}

impl Lane {
    fn is_finished(&self) -> bool {
        self.commands.is_abandoned() && self.commands.is_empty() && !self.table.has_pending()
    }
}

struct HubInner {
    config: ChannelConfig,
    seq: Arc<AtomicU64>,
    /// Lanes attached but not yet reaped by the receiver
    lanes: Arc<AtomicUsize>,
    attach: Mutex<rtrb::Producer<Owned<Lane>>>,
}

/// Factory for producer handles (cheap to clone, shareable across threads)
#[derive(Clone)]
pub struct CommandHub {
    inner: Arc<HubInner>,
}

/// Create a channel: a hub for making senders and the processing-side receiver
pub fn command_channel(config: impl Into<ChannelConfig>) -> (CommandHub, CommandReceiver) {
    let config = config.into();
    let (attach_tx, attach_rx) = rtrb::RingBuffer::new(config.max_producers.max(1));
    let lanes = Arc::new(AtomicUsize::new(0));

    let hub = CommandHub {
        inner: Arc::new(HubInner {
            config,
            seq: Arc::new(AtomicU64::new(0)),
            lanes: lanes.clone(),
            attach: Mutex::new(attach_tx),
        }),
    };

    let receiver = CommandReceiver {
        attach: attach_rx,
        lanes: Vec::with_capacity(config.max_producers),
        live_lanes: lanes,
        pending: Vec::with_capacity(
            config.max_per_drain + config.coalesce_slots * config.max_producers,
        ),
        max_per_drain: config.max_per_drain,
        next_lane: 0,
    };

    (hub, receiver)
}

impl CommandHub {
    /// Attach a new producer
    ///
    /// Allocates the lane here, on the calling (non-real-time) thread.
    pub fn sender(&self) -> EnqueueResult<CommandSender> {
        let limit = self.inner.config.max_producers;
        let claimed = self
            .inner
            .lanes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < limit).then_some(n + 1));
        if claimed.is_err() {
            return Err(EnqueueError::TooManyProducers(limit));
        }

        let (producer, consumer) = rtrb::RingBuffer::new(self.inner.config.capacity);
        let table = Arc::new(CoalesceTable::new(self.inner.config.coalesce_slots));
        let lane = Owned::new(
            &gc_handle(),
            Lane {
                commands: consumer,
                table: table.clone(),
            },
        );

        let pushed = match self.inner.attach.lock() {
            Ok(mut attach) => attach.push(lane).is_ok(),
            Err(_) => false,
        };
        if !pushed {
            self.inner.lanes.fetch_sub(1, Ordering::AcqRel);
            return Err(EnqueueError::TooManyProducers(limit));
        }

        log::debug!("Attached command producer ({} lanes)", self.producer_count());
        Ok(CommandSender {
            commands: producer,
            coalesce: CoalesceWriter::new(table),
            seq: self.inner.seq.clone(),
        })
    }

    /// Lanes currently attached (including abandoned ones not yet reaped)
    pub fn producer_count(&self) -> usize {
        self.inner.lanes.load(Ordering::Acquire)
    }
}

/// Producer handle owned by one control thread
///
/// All operations are wait-free: a full lane hands the command back instead
/// of blocking.
pub struct CommandSender {
    commands: rtrb::Producer<Envelope>,
    coalesce: CoalesceWriter,
    seq: Arc<AtomicU64>,
}

impl CommandSender {
    #[inline]
    fn stamp(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Append a command to this producer's ordered lane
    pub fn enqueue(&mut self, command: Command) -> EnqueueResult<()> {
        let seq = self.stamp();
        self.commands
            .push(Envelope { seq, command })
            .map_err(lane_full)
    }

    /// Set the latest value for `(target, param)`, replacing any undrained one
    ///
    /// Falls back to the ordered lane when every coalescing slot is taken;
    /// the stamp still makes this value win over older ones.
    pub fn enqueue_latest(
        &mut self,
        target: Target,
        param: ParamName,
        value: ParamValue,
    ) -> EnqueueResult<()> {
        let seq = self.stamp();
        if self.coalesce.write(target, param, value, seq) {
            return Ok(());
        }
        let command = Command::Update {
            target,
            param,
            value,
        };
        self.commands
            .push(Envelope { seq, command })
            .map_err(lane_full)
    }

    /// Free slots in the ordered lane
    pub fn available(&self) -> usize {
        self.commands.slots()
    }
}

fn lane_full(err: rtrb::PushError<Envelope>) -> EnqueueError {
    match err {
        rtrb::PushError::Full(envelope) => EnqueueError::Full(envelope.command),
    }
}

/// Processing-thread end of the channel
pub struct CommandReceiver {
    attach: rtrb::Consumer<Owned<Lane>>,
    lanes: Vec<Owned<Lane>>,
    live_lanes: Arc<AtomicUsize>,
    pending: Vec<Envelope>,
    max_per_drain: usize,
    next_lane: usize,
}

impl CommandReceiver {
    /// Take all pending commands in stamp order (real-time safe)
    ///
    /// At most `max_per_drain` ordered commands are taken, round-robin across
    /// producers; the rest stay queued for the next quantum. Coalesced values
    /// newer than a lane's oldest undrained command are held back with it so
    /// per-producer order is never broken.
    pub fn drain(&mut self) -> std::vec::Drain<'_, Envelope> {
        self.attach_new_lanes();
        self.pending.clear();

        let lane_count = self.lanes.len();
        if lane_count > 0 {
            let start = self.next_lane % lane_count;
            self.next_lane = self.next_lane.wrapping_add(1);

            'fill: loop {
                let mut progressed = false;
                for i in 0..lane_count {
                    if self.pending.len() >= self.max_per_drain {
                        break 'fill;
                    }
                    let lane = &mut self.lanes[(start + i) % lane_count];
                    if let Ok(envelope) = lane.commands.pop() {
                        self.pending.push(envelope);
                        progressed = true;
                    }
                }
                if !progressed {
                    break;
                }
            }

            let pending = &mut self.pending;
            for lane in self.lanes.iter() {
                let head = || lane.commands.peek().ok().map(|envelope| envelope.seq);
                lane.table.drain_into(head, |update| {
                    pending.push(Envelope {
                        seq: update.seq,
                        command: Command::Update {
                            target: update.target,
                            param: update.param,
                            value: update.value,
                        },
                    });
                });
            }

            self.pending.sort_unstable_by_key(|envelope| envelope.seq);
            self.reap_finished_lanes();
        }

        self.pending.drain(..)
    }

    /// Number of attached producer lanes
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    fn attach_new_lanes(&mut self) {
        while self.lanes.len() < self.lanes.capacity() {
            match self.attach.pop() {
                Ok(lane) => self.lanes.push(lane),
                Err(_) => break,
            }
        }
    }

    fn reap_finished_lanes(&mut self) {
        let mut i = 0;
        while i < self.lanes.len() {
            if self.lanes[i].is_finished() {
                // Dropping the Owned lane defers its deallocation to the GC thread
                drop(self.lanes.swap_remove(i));
                self.live_lanes.fetch_sub(1, Ordering::AcqRel);
            } else {
                i += 1;
            }
        }
    }
}
