//! Resource boundary: asynchronous media loading for units
//!
//! - [`ResourceHandle`]: authoritative media reference with non-zero length
//! - [`ResourceSlot`]: a unit's current handle plus reload generations
//! - [`ResourceLoader`]: worker thread performing blocking loads
//! - [`ResourceStore`]: where media comes from (WAV files, memory)

mod handle;
mod loader;
mod slot;
mod store;

pub use handle::{normalized_position, LoadedMedia, ResourceHandle};
pub use loader::{reload_channel, ReloadQueue, ReloadRequest, ReloadRequester, ResourceLoader};
pub use slot::{ReloadOutcome, ResourceSlot};
pub use store::{write_wav, MemoryStore, ResourceStore, WavStore};
