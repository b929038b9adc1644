//! Master transport clock
//!
//! The single authoritative play/pause/stop/loop register. Only the
//! processing thread owns a `TransportClock`; units receive a `Copy`
//! [`TransportView`] of it for each quantum and never hold a reference.
//!
//! ```text
//!             play                      pause
//!   Stopped ────────► Playing ◄──────────────────► Paused
//!      ▲                 │         play (restore)     │
//!      │    stop / end   │                            │
//!      └─────────────────┴──────────── stop ──────────┘
//! ```
//!
//! Loop wraps while playing increment `reset_generation` once per wrap.
//! Units with sequencing state compare the generation against the last
//! value they consumed (see [`super::sync`]).

use serde::Serialize;

use crate::error::ProtocolError;
use crate::types::Frames;

/// Derived state of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Read-only copy of the transport register for one quantum
///
/// Captured at the start of the quantum (after commands are applied, before
/// the clock advances), so every unit renders against the same position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransportView {
    pub state: TransportState,
    pub is_playing: bool,
    pub is_looping: bool,
    pub position: Frames,
    pub paused_position: Option<Frames>,
    pub reset_generation: u64,
    pub range_start: Frames,
    pub range_end: Frames,
}

impl TransportView {
    /// Length of the active range in frames
    #[inline]
    pub fn range_len(&self) -> Frames {
        self.range_end - self.range_start
    }

    /// Transport position `offset` frames into the current quantum
    ///
    /// Follows loop wraps. Returns `None` when the transport is not playing or
    /// the offset runs past the end of a non-looping range.
    #[inline]
    pub fn frame_at(&self, offset: usize) -> Option<Frames> {
        if !self.is_playing {
            return None;
        }
        let pos = self.position.saturating_add(offset as Frames);
        if pos < self.range_end {
            return Some(pos);
        }
        if !self.is_looping {
            return None;
        }
        let len = self.range_len();
        Some(self.range_start + (pos - self.range_start) % len)
    }
}

/// The transport register
#[derive(Debug, Clone)]
pub struct TransportClock {
    is_playing: bool,
    is_looping: bool,
    position: Frames,
    paused_position: Option<Frames>,
    reset_generation: u64,
    range_start: Frames,
    range_end: Frames,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClock {
    /// Create a stopped clock over an open-ended range starting at 0
    pub fn new() -> Self {
        Self {
            is_playing: false,
            is_looping: false,
            position: 0,
            paused_position: None,
            reset_generation: 0,
            range_start: 0,
            range_end: Frames::MAX,
        }
    }

    /// Create a stopped clock over a specific range
    pub fn with_range(start: Frames, end: Frames) -> Result<Self, ProtocolError> {
        let mut clock = Self::new();
        clock.set_range(start, end)?;
        Ok(clock)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> TransportState {
        if self.is_playing {
            TransportState::Playing
        } else if self.paused_position.is_some() {
            TransportState::Paused
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn is_looping(&self) -> bool {
        self.is_looping
    }

    pub fn position(&self) -> Frames {
        self.position
    }

    pub fn paused_position(&self) -> Option<Frames> {
        self.paused_position
    }

    pub fn reset_generation(&self) -> u64 {
        self.reset_generation
    }

    pub fn range(&self) -> (Frames, Frames) {
        (self.range_start, self.range_end)
    }

    /// Copy of the register for units and snapshots
    pub fn view(&self) -> TransportView {
        TransportView {
            state: self.state(),
            is_playing: self.is_playing,
            is_looping: self.is_looping,
            position: self.position,
            paused_position: self.paused_position,
            reset_generation: self.reset_generation,
            range_start: self.range_start,
            range_end: self.range_end,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Stopped/Paused → Playing
    ///
    /// A held paused position is restored first, then cleared, and only then
    /// does the clock report playing.
    pub fn play(&mut self) {
        if self.is_playing {
            return;
        }
        match self.paused_position.take() {
            Some(paused) => self.position = paused,
            None => self.position = self.range_start,
        }
        self.is_playing = true;
    }

    /// Playing → Paused (no-op unless playing)
    pub fn pause(&mut self) {
        if !self.is_playing {
            return;
        }
        self.paused_position = Some(self.position);
        self.is_playing = false;
    }

    /// Any state → Stopped at range start
    pub fn stop(&mut self) {
        self.position = self.range_start;
        self.paused_position = None;
        self.is_playing = false;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.is_looping = looping;
    }

    /// Set the playback range (`end` must be greater than `start`)
    ///
    /// Positions outside the new range move to its start.
    pub fn set_range(&mut self, start: Frames, end: Frames) -> Result<(), ProtocolError> {
        if end <= start || start < 0 {
            return Err(ProtocolError::InvalidRange { start, end });
        }
        self.range_start = start;
        self.range_end = end;

        let inside = |pos: Frames| pos >= start && pos < end;
        match self.state() {
            TransportState::Stopped => self.position = start,
            TransportState::Playing => {
                if !inside(self.position) {
                    self.position = start;
                }
            }
            TransportState::Paused => {
                if !inside(self.position) {
                    self.position = start;
                    self.paused_position = Some(start);
                }
            }
        }
        Ok(())
    }

    /// Move the playhead, clamped into the range
    ///
    /// While paused the held position moves too, so the next Play resumes
    /// from the seek point. A stopped clock stays stopped: only the reported
    /// position moves, and Play still starts at the range start.
    pub fn seek(&mut self, frames: Frames) {
        let target = frames.clamp(self.range_start, self.range_end - 1);
        self.position = target;
        if self.paused_position.is_some() {
            self.paused_position = Some(target);
        }
    }

    /// Advance one quantum; returns the number of loop wraps that occurred
    ///
    /// Reaching the range end without looping stops the transport.
    pub fn advance(&mut self, frames: usize) -> u64 {
        if !self.is_playing {
            return 0;
        }
        let next = self.position.saturating_add(frames as Frames);
        if next < self.range_end {
            self.position = next;
            return 0;
        }
        if !self.is_looping {
            self.stop();
            return 0;
        }

        let len = self.range_end - self.range_start;
        let over = next - self.range_start;
        let wraps = (over / len) as u64;
        self.position = self.range_start + over % len;
        self.reset_generation += wraps;
        wraps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUANTUM: usize = 480;

    fn playing_clock() -> TransportClock {
        let mut clock = TransportClock::new();
        clock.play();
        clock
    }

    #[test]
    fn test_initial_state_is_stopped_at_range_start() {
        let clock = TransportClock::with_range(100, 1000).unwrap();
        assert_eq!(clock.state(), TransportState::Stopped);
        assert_eq!(clock.position(), 100);
        assert!(clock.paused_position().is_none());
    }

    #[test]
    fn test_playing_advances_one_quantum_per_tick() {
        let mut clock = playing_clock();
        for _ in 0..10 {
            clock.advance(QUANTUM);
        }
        assert_eq!(clock.position(), 10 * QUANTUM as Frames);
    }

    #[test]
    fn test_pause_resume_restores_exact_position() {
        let mut clock = playing_clock();
        for _ in 0..151 {
            clock.advance(QUANTUM);
        }
        assert_eq!(clock.position(), 72480);

        clock.pause();
        assert_eq!(clock.paused_position(), Some(72480));
        assert!(!clock.is_playing());

        // Paused clock does not move
        clock.advance(QUANTUM);
        assert_eq!(clock.position(), 72480);

        clock.play();
        assert_eq!(clock.position(), 72480);
        assert!(clock.paused_position().is_none());
        assert!(clock.is_playing());
    }

    #[test]
    fn test_stop_resets_and_clears_paused_value() {
        let mut clock = TransportClock::with_range(480, 100_000).unwrap();
        clock.play();
        clock.advance(QUANTUM * 4);
        clock.pause();
        clock.stop();

        assert_eq!(clock.position(), 480);
        assert!(clock.paused_position().is_none());
        assert_eq!(clock.state(), TransportState::Stopped);

        clock.play();
        assert_eq!(clock.position(), 480);
    }

    #[test]
    fn test_paused_position_set_iff_paused() {
        let mut clock = playing_clock();
        clock.advance(QUANTUM);
        assert!(clock.paused_position().is_none());
        clock.pause();
        assert_eq!(clock.state(), TransportState::Paused);
        assert!(clock.paused_position().is_some());
        clock.pause();
        assert_eq!(clock.paused_position(), Some(QUANTUM as Frames));
        clock.play();
        assert!(clock.paused_position().is_none());
    }

    #[test]
    fn test_loop_wrap_increments_generation_once() {
        let mut clock = TransportClock::with_range(0, 1000).unwrap();
        clock.set_looping(true);
        clock.play();

        assert_eq!(clock.advance(QUANTUM), 0);
        assert_eq!(clock.advance(QUANTUM), 0);
        assert_eq!(clock.advance(QUANTUM), 1);
        assert_eq!(clock.position(), 440);
        assert_eq!(clock.reset_generation(), 1);
    }

    #[test]
    fn test_short_range_counts_every_wrap() {
        let mut clock = TransportClock::with_range(0, 100).unwrap();
        clock.set_looping(true);
        clock.play();

        assert_eq!(clock.advance(QUANTUM), 4);
        assert_eq!(clock.position(), 80);
        assert_eq!(clock.reset_generation(), 4);
    }

    #[test]
    fn test_end_without_loop_stops() {
        let mut clock = TransportClock::with_range(0, 1000).unwrap();
        clock.play();
        clock.advance(QUANTUM);
        clock.advance(QUANTUM);
        clock.advance(QUANTUM);

        assert_eq!(clock.state(), TransportState::Stopped);
        assert_eq!(clock.position(), 0);
        assert_eq!(clock.reset_generation(), 0);
    }

    #[test]
    fn test_seek_while_paused_moves_resume_point() {
        let mut clock = playing_clock();
        clock.advance(QUANTUM);
        clock.pause();
        clock.seek(9600);
        assert_eq!(clock.paused_position(), Some(9600));
        clock.play();
        assert_eq!(clock.position(), 9600);
    }

    #[test]
    fn test_seek_while_stopped_stays_stopped() {
        let mut clock = TransportClock::with_range(100, 1000).unwrap();
        clock.seek(500);
        assert_eq!(clock.state(), TransportState::Stopped);
        assert_eq!(clock.position(), 500);
        assert_eq!(clock.paused_position(), None);

        clock.play();
        assert_eq!(clock.position(), 100);
    }

    #[test]
    fn test_seek_clamps_to_range() {
        let mut clock = TransportClock::with_range(100, 200).unwrap();
        clock.play();
        clock.seek(5000);
        assert_eq!(clock.position(), 199);
        clock.seek(-5);
        assert_eq!(clock.position(), 100);
    }

    #[test]
    fn test_set_range_rejects_empty() {
        let mut clock = TransportClock::new();
        assert!(clock.set_range(100, 100).is_err());
        assert!(clock.set_range(200, 100).is_err());
        assert_eq!(clock.range(), (0, Frames::MAX));
    }

    #[test]
    fn test_view_frame_at_follows_wrap() {
        let mut clock = TransportClock::with_range(0, 100).unwrap();
        clock.set_looping(true);
        clock.play();
        clock.seek(90);
        let view = clock.view();
        assert_eq!(view.frame_at(5), Some(95));
        assert_eq!(view.frame_at(15), Some(5));

        clock.set_looping(false);
        assert_eq!(clock.view().frame_at(15), None);
    }
}
