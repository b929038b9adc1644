//! Text control surface for the mesh playback engine
//!
//! This crate provides:
//! - A line tokenizer with typed arguments ([`parse_line`])
//! - Per-address argument signatures and validated [`ControlMessage`]s
//! - A [`Dispatcher`] that builds units and presets on the producer thread
//!   and enqueues engine commands
//! - UDP and line-reader listener threads
//!
//! # Architecture
//!
//! ```text
//! UDP datagram ─┐
//!               ├─► parse_line ─► ControlMessage ─► Dispatcher ─► CommandSender ─► engine
//! stdin line ───┘
//! ```
//!
//! Parameter updates travel through the coalescing lane, so a burst of
//! `update` lines for one parameter reaches the engine as its latest value.

mod dispatch;
mod listen;
mod messages;
mod parse;

pub use dispatch::{DispatchStats, Dispatcher};
pub use listen::{spawn_line_reader, UdpListener};
pub use messages::{signature, ArgKind, ControlMessage, Signature, SIGNATURES};
pub use parse::{parse_line, Arg, RawMessage};

use mesh_engine::error::{EnqueueError, ProtocolError};

/// Error type for control-line handling
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The line was rejected before reaching the engine
    #[error("Rejected: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Enqueue failed: {0}")]
    Enqueue(#[from] EnqueueError),
}

impl ControlError {
    /// True when the line was valid but the engine lane was full
    pub fn is_backpressure(&self) -> bool {
        matches!(self, ControlError::Enqueue(EnqueueError::Full(_)))
    }
}
