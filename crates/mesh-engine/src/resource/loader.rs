//! Background resource loader
//!
//! The processing thread pushes [`ReloadRequest`]s into a bounded `rtrb`
//! ring; the `resource-loader` thread pops them, performs the blocking load
//! through a [`ResourceStore`] and publishes the result into the requesting
//! slot's mailbox. Nothing here ever blocks the processing thread.
//!
//! ```text
//! Processing Thread                  Loader Thread
//! ─────────────────                  ─────────────
//! ResourceSlot::request ──push──►  ReloadQueue::pop
//!                                    ├ superseded? skip
//!                                    ├ store.load(path)      (blocking I/O)
//!                                    └ request.complete(result)
//! ResourceSlot::poll    ◄─mailbox──
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use basedrop::Shared;

use super::handle::{LoadedMedia, ResourceHandle};
use super::slot::{Delivery, ReloadMailbox};
use super::store::ResourceStore;
use crate::engine::gc_handle;
use crate::error::{ResourceError, ResourceResult};
use crate::types::UnitId;

/// How long the worker sleeps when the queue is empty
const IDLE_WAIT: Duration = Duration::from_millis(5);

/// A reload request travelling from a slot to the worker
pub struct ReloadRequest {
    pub unit: UnitId,
    pub generation: u64,
    pub path: Shared<PathBuf>,
    pub(crate) mailbox: Shared<ReloadMailbox>,
}

impl ReloadRequest {
    /// Whether the slot has asked for something newer since this was sent
    pub fn is_superseded(&self) -> bool {
        self.mailbox.requested.load(Ordering::Acquire) > self.generation
    }

    /// Publish the result of this request into the slot's mailbox
    ///
    /// Returns `false` (and publishes nothing) if the request was superseded.
    pub fn complete(self, result: ResourceResult<LoadedMedia>) -> bool {
        if self.is_superseded() {
            log::debug!(
                "[RESOURCE_LOADER] Dropping superseded result for unit {} generation {}",
                self.unit,
                self.generation
            );
            return false;
        }

        let delivery = match result.and_then(ResourceHandle::new) {
            Ok(handle) => Delivery::Loaded {
                generation: self.generation,
                handle,
            },
            Err(error) => Delivery::Failed {
                generation: self.generation,
                error,
            },
        };

        self.mailbox.cell.set(Shared::new(&gc_handle(), delivery));
        self.mailbox
            .published
            .fetch_max(self.generation, Ordering::AcqRel);
        true
    }
}

/// Create the request queue between the processing thread and the loader
pub fn reload_channel(capacity: usize) -> (ReloadRequester, ReloadQueue) {
    let (producer, consumer) = rtrb::RingBuffer::new(capacity.max(1));
    (
        ReloadRequester { requests: producer },
        ReloadQueue {
            requests: consumer,
        },
    )
}

/// Processing-thread end of the reload queue
pub struct ReloadRequester {
    requests: rtrb::Producer<ReloadRequest>,
}

impl ReloadRequester {
    pub(crate) fn push(&mut self, request: ReloadRequest) -> ResourceResult<()> {
        self.requests
            .push(request)
            .map_err(|_| ResourceError::QueueFull)
    }
}

/// Worker end of the reload queue
pub struct ReloadQueue {
    requests: rtrb::Consumer<ReloadRequest>,
}

impl ReloadQueue {
    pub fn pop(&mut self) -> Option<ReloadRequest> {
        self.requests.pop().ok()
    }

    pub fn len(&self) -> usize {
        self.requests.slots()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Background thread servicing a [`ReloadQueue`]
///
/// Stops and joins the thread when dropped.
pub struct ResourceLoader {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ResourceLoader {
    /// Spawn the loader thread
    pub fn spawn(queue: ReloadQueue, store: Arc<dyn ResourceStore>) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("resource-loader".to_string())
            .spawn(move || loader_thread(queue, store, flag))?;

        log::info!("[RESOURCE_LOADER] Spawned background resource loader thread");

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the worker and wait for it to finish its current load
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("[RESOURCE_LOADER] Loader thread panicked");
            }
        }
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn loader_thread(mut queue: ReloadQueue, store: Arc<dyn ResourceStore>, running: Arc<AtomicBool>) {
    log::info!("[RESOURCE_LOADER] Loader thread started");

    while running.load(Ordering::Acquire) {
        let Some(request) = queue.pop() else {
            thread::park_timeout(IDLE_WAIT);
            continue;
        };

        if request.is_superseded() {
            log::debug!(
                "[RESOURCE_LOADER] Skipping superseded request for unit {} generation {}",
                request.unit,
                request.generation
            );
            continue;
        }

        let start = Instant::now();
        let result = store.load(&request.path);
        match &result {
            Ok(media) => log::info!(
                "[RESOURCE_LOADER] Loaded {:?} for unit {} ({} frames) in {:?}",
                request.path.as_path(),
                request.unit,
                media.frames.len(),
                start.elapsed()
            ),
            Err(e) => log::error!(
                "[RESOURCE_LOADER] Failed to load {:?} for unit {}: {}",
                request.path.as_path(),
                request.unit,
                e
            ),
        }
        request.complete(result);
    }

    log::info!("[RESOURCE_LOADER] Loader thread shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::slot::{ReloadOutcome, ResourceSlot};
    use crate::resource::store::MemoryStore;
    use crate::types::StereoSample;

    #[test]
    fn test_worker_delivers_to_slot() {
        let store = Arc::new(MemoryStore::new(48000));
        store.insert("loop.wav", vec![StereoSample::mono(0.25); 2400]);

        let (mut requester, queue) = reload_channel(4);
        let mut loader = ResourceLoader::spawn(queue, store).unwrap();

        let id = UnitId::new(3).unwrap();
        let mut slot = ResourceSlot::new();
        let path = Shared::new(&gc_handle(), PathBuf::from("loop.wav"));
        slot.request(id, path, &mut requester).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let outcome = loop {
            if let Some(outcome) = slot.poll(id) {
                break outcome;
            }
            assert!(Instant::now() < deadline, "loader never delivered");
            thread::sleep(Duration::from_millis(1));
        };

        assert!(matches!(outcome, ReloadOutcome::Swapped { new_len: 2400, .. }));
        loader.shutdown();
    }

    #[test]
    fn test_worker_reports_missing_resource() {
        let store = Arc::new(MemoryStore::new(48000));
        let (mut requester, queue) = reload_channel(4);
        let _loader = ResourceLoader::spawn(queue, store).unwrap();

        let id = UnitId::new(4).unwrap();
        let mut slot = ResourceSlot::new();
        slot.request(id, Shared::new(&gc_handle(), PathBuf::from("nope.wav")), &mut requester)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = slot.poll(id) {
                assert!(matches!(outcome, ReloadOutcome::Failed { .. }));
                break;
            }
            assert!(Instant::now() < deadline, "loader never delivered");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(slot.current().is_none());
    }
}
