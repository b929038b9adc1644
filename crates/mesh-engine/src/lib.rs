//! Mesh Engine - real-time voice engine core
//!
//! A fixed-rate processing thread renders a dynamic set of playback units
//! while control threads create, destroy and steer them through a wait-free
//! command channel. All units follow one transport clock.

pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod preset;
pub mod resource;
pub mod types;
pub mod unit;

pub use types::*;
