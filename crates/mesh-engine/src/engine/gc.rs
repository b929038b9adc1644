//! Deferred deallocation for the processing thread
//!
//! Anything heap-allocated that may be dropped on the processing thread
//! (removed units, preset trees, superseded resource buffers, device names)
//! is wrapped in `basedrop::Owned`/`Shared`. Dropping those only enqueues a
//! pointer; the memory is released on the `voice-gc` thread below.
//!
//! ```ignore
//! use basedrop::Owned;
//! use mesh_engine::engine::gc_handle;
//!
//! let unit = Owned::new(&gc_handle(), unit);
//! drop(unit); // freed later on the collector thread
//! ```

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Interval between collection passes
const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    let spawned = thread::Builder::new()
        .name("voice-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives and dies on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Voice GC thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        });

    match spawned.ok().and_then(|_| rx.recv().ok()) {
        Some(handle) => handle,
        None => {
            // No collector thread: keep a local collector alive forever so
            // handles stay valid. Deferred drops then simply accumulate.
            log::error!("Failed to start voice GC thread; deferred drops will not be reclaimed");
            let collector = Box::leak(Box::new(Collector::new()));
            collector.handle()
        }
    }
}

/// Get a handle for creating `Owned<T>` / `Shared<T>` allocations
///
/// The first call starts the collector thread.
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::{Owned, Shared};

    #[test]
    fn test_handle_is_reusable() {
        let a = Shared::new(&gc_handle(), vec![1.0f32; 16]);
        let b = a.clone();
        assert_eq!(b.len(), 16);
        drop(a);
        drop(b);

        let owned = Owned::new(&gc_handle(), String::from("voice"));
        assert_eq!(owned.as_str(), "voice");
    }
}
