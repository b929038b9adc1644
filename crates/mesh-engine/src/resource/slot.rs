//! Per-unit resource slot with a two-phase reload protocol
//!
//! ```text
//!  processing thread                         loader thread
//!  ─────────────────                         ─────────────
//!  request(path)
//!    requested += 1 ──── ReloadRequest ────► load(path)
//!                                            complete(result)
//!                                              cell.set(delivery)
//!  poll()                ◄── published ──────  published = generation
//!    generation == requested? swap : discard
//! ```
//!
//! A delivery carries the generation of the request that produced it, so a
//! completion that was superseded by a newer request is discarded instead
//! of applied. The old handle stays authoritative until a matching success
//! is swapped in; a failure leaves it in place.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use basedrop::{Shared, SharedCell};

use super::handle::ResourceHandle;
use super::loader::{ReloadRequest, ReloadRequester};
use crate::engine::gc_handle;
use crate::error::{ResourceError, ResourceResult};
use crate::types::{Frames, UnitId};

/// Result of a reload, as left in the mailbox by the worker
pub(crate) enum Delivery {
    Empty,
    Loaded {
        generation: u64,
        handle: ResourceHandle,
    },
    Failed {
        generation: u64,
        error: ResourceError,
    },
}

/// Shared between a slot and in-flight requests for it
pub(crate) struct ReloadMailbox {
    /// Latest generation requested by the slot
    pub requested: AtomicU64,
    /// Latest generation delivered by the worker
    pub published: AtomicU64,
    pub cell: SharedCell<Delivery>,
}

/// What a poll folded into the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new handle is now authoritative
    Swapped {
        generation: u64,
        previous_len: Option<Frames>,
        new_len: Frames,
    },
    /// The current request failed; the previous handle (if any) remains
    Failed { generation: u64 },
}

/// A unit's authoritative resource plus its reload state
pub struct ResourceSlot {
    current: Option<ResourceHandle>,
    /// Generation of the most recent request
    requested: u64,
    /// Generation of the most recent request resolved (swapped or failed)
    resolved: u64,
    /// Last `published` value seen
    seen: u64,
    mailbox: Shared<ReloadMailbox>,
    empty: Shared<Delivery>,
}

impl Default for ResourceSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSlot {
    /// Create an empty slot (allocates; call off the processing thread)
    pub fn new() -> Self {
        let gc = gc_handle();
        let empty = Shared::new(&gc, Delivery::Empty);
        let mailbox = Shared::new(
            &gc,
            ReloadMailbox {
                requested: AtomicU64::new(0),
                published: AtomicU64::new(0),
                cell: SharedCell::new(empty.clone()),
            },
        );
        Self {
            current: None,
            requested: 0,
            resolved: 0,
            seen: 0,
            mailbox,
            empty,
        }
    }

    /// The authoritative handle
    pub fn current(&self) -> Option<&ResourceHandle> {
        self.current.as_ref()
    }

    pub fn length_frames(&self) -> Option<Frames> {
        self.current.as_ref().map(ResourceHandle::length_frames)
    }

    /// Generation of an outstanding request, if one is in flight
    pub fn pending(&self) -> Option<u64> {
        (self.requested > self.resolved).then_some(self.requested)
    }

    /// Ask the loader for new media (real-time safe)
    ///
    /// Supersedes any request still in flight.
    pub fn request(
        &mut self,
        unit: UnitId,
        path: Shared<PathBuf>,
        requester: &mut ReloadRequester,
    ) -> ResourceResult<u64> {
        let generation = self.requested + 1;
        self.mailbox.requested.store(generation, Ordering::Release);

        let request = ReloadRequest {
            unit,
            generation,
            path,
            mailbox: self.mailbox.clone(),
        };
        match requester.push(request) {
            Ok(()) => {
                self.requested = generation;
                Ok(generation)
            }
            Err(err) => {
                self.mailbox.requested.store(self.requested, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Fold a completed reload into the slot (real-time safe)
    ///
    /// Returns `None` when nothing new arrived or the delivery was stale.
    pub fn poll(&mut self, unit: UnitId) -> Option<ReloadOutcome> {
        let published = self.mailbox.published.load(Ordering::Acquire);
        if published <= self.seen {
            return None;
        }
        self.seen = published;

        // The taken delivery is freed on the collector thread when dropped
        let delivery = self.mailbox.cell.replace(self.empty.clone());
        match &*delivery {
            Delivery::Empty => None,
            Delivery::Loaded { generation, handle } => {
                if *generation != self.requested {
                    log::debug!(
                        "Unit {}: discarding stale reload generation {} (current {})",
                        unit,
                        generation,
                        self.requested
                    );
                    return None;
                }
                let new_len = handle.length_frames();
                let previous = self.current.replace(handle.clone());
                self.resolved = *generation;
                Some(ReloadOutcome::Swapped {
                    generation: *generation,
                    previous_len: previous.as_ref().map(ResourceHandle::length_frames),
                    new_len,
                })
            }
            Delivery::Failed { generation, error } => {
                if *generation != self.requested {
                    return None;
                }
                log::warn!("Unit {}: reload failed, keeping previous resource: {}", unit, error);
                self.resolved = *generation;
                Some(ReloadOutcome::Failed {
                    generation: *generation,
                })
            }
        }
    }
}
