//! Transport-following capability for units
//!
//! A unit follows the transport in one of two ways:
//!
//! - **Position-derived**: its phase is a pure function of the transport
//!   position, recomputed every quantum. No local counters, nothing to reset.
//! - **Reset-on-wrap**: it keeps sequencing state (step index, oscillator
//!   phase, held value) that cannot be derived from position. It consumes the
//!   transport's `reset_generation` through a [`ResetTracker`] and zeroes its
//!   state once per unconsumed generation change.
//!
//! Units with continuous, transport-independent state (delay lines, filters)
//! are `Exempt` and never see a reset.

use serde::Serialize;

use super::transport::TransportView;

/// How a unit follows the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SyncPolicy {
    PositionDerived,
    ResetOnWrap,
    #[default]
    Exempt,
}

/// Last reset generation a unit has consumed
///
/// Generations only ever increase, so comparing against the stored value
/// detects a pending pulse without any timing assumptions, and recording the
/// new value makes a second look at the same generation a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetTracker {
    observed: u64,
}

impl ResetTracker {
    pub fn new(generation: u64) -> Self {
        Self { observed: generation }
    }

    /// Consume any pending pulses; returns how many wraps were pending
    #[inline]
    pub fn consume(&mut self, generation: u64) -> u64 {
        if generation > self.observed {
            let pending = generation - self.observed;
            self.observed = generation;
            pending
        } else {
            0
        }
    }

    /// Adopt a generation without treating it as a pulse (unit joins late)
    #[inline]
    pub fn observe(&mut self, generation: u64) {
        self.observed = self.observed.max(generation);
    }

    #[inline]
    pub fn last_observed(&self) -> u64 {
        self.observed
    }
}

/// Capability implemented by units that follow the transport
pub trait SyncedUnit {
    /// Current sync policy (may change with unit parameters)
    fn sync_policy(&self) -> SyncPolicy;

    /// Re-derive phase from the transport (position-derived units)
    fn follow_position(&mut self, _transport: &TransportView) {}

    /// Tracker for reset-on-wrap units
    fn reset_tracker(&mut self) -> Option<&mut ResetTracker> {
        None
    }

    /// Zero local sequencing state
    fn reset_sequencing(&mut self) {}
}

/// Run one quantum of sync handling for a unit
///
/// Returns the number of wrap pulses consumed. Multiple pending wraps zero
/// the state once, which is identical to zeroing once per wrap.
pub fn drive<U: SyncedUnit + ?Sized>(unit: &mut U, transport: &TransportView) -> u64 {
    match unit.sync_policy() {
        SyncPolicy::PositionDerived => {
            unit.follow_position(transport);
            0
        }
        SyncPolicy::ResetOnWrap => {
            let pending = match unit.reset_tracker() {
                Some(tracker) => tracker.consume(transport.reset_generation),
                None => 0,
            };
            if pending > 0 {
                unit.reset_sequencing();
            }
            pending
        }
        SyncPolicy::Exempt => 0,
    }
}

/// Align a newly inserted unit with the current generation
///
/// Wraps that happened before the unit existed are not pulses for it.
pub fn adopt<U: SyncedUnit + ?Sized>(unit: &mut U, transport: &TransportView) {
    if let Some(tracker) = unit.reset_tracker() {
        tracker.observe(transport.reset_generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::transport::TransportClock;

    /// Counts zero operations; `step` stands in for sequencing state
    struct Counter {
        tracker: ResetTracker,
        step: u32,
        zeroes: u32,
        policy: SyncPolicy,
    }

    impl Counter {
        fn new(policy: SyncPolicy) -> Self {
            Self {
                tracker: ResetTracker::default(),
                step: 0,
                zeroes: 0,
                policy,
            }
        }
    }

    impl SyncedUnit for Counter {
        fn sync_policy(&self) -> SyncPolicy {
            self.policy
        }

        fn reset_tracker(&mut self) -> Option<&mut ResetTracker> {
            Some(&mut self.tracker)
        }

        fn reset_sequencing(&mut self) {
            self.step = 0;
            self.zeroes += 1;
        }
    }

    fn looping_clock(len: i64) -> TransportClock {
        let mut clock = TransportClock::with_range(0, len).unwrap();
        clock.set_looping(true);
        clock.play();
        clock
    }

    #[test]
    fn test_tracker_consumes_each_generation_once() {
        let mut tracker = ResetTracker::default();
        assert_eq!(tracker.consume(0), 0);
        assert_eq!(tracker.consume(1), 1);
        assert_eq!(tracker.consume(1), 0);
        assert_eq!(tracker.consume(4), 3);
        assert_eq!(tracker.last_observed(), 4);
    }

    #[test]
    fn test_one_zero_per_wrap() {
        let mut clock = looping_clock(1000);
        let mut unit = Counter::new(SyncPolicy::ResetOnWrap);

        for _ in 0..25 {
            unit.step += 1;
            drive(&mut unit, &clock.view());
            // Same view seen twice across a boundary race
            drive(&mut unit, &clock.view());
            clock.advance(480);
        }

        assert_eq!(clock.reset_generation(), 12);
        assert_eq!(unit.zeroes, 11);
        drive(&mut unit, &clock.view());
        assert_eq!(unit.zeroes, 12);
        assert_eq!(unit.tracker.last_observed(), 12);
    }

    #[test]
    fn test_multiple_pending_wraps_zero_once() {
        let mut clock = looping_clock(100);
        let mut unit = Counter::new(SyncPolicy::ResetOnWrap);
        unit.step = 7;

        clock.advance(480);
        assert_eq!(drive(&mut unit, &clock.view()), 4);
        assert_eq!(unit.step, 0);
        assert_eq!(unit.zeroes, 1);
    }

    #[test]
    fn test_exempt_never_resets() {
        let mut clock = looping_clock(100);
        let mut unit = Counter::new(SyncPolicy::Exempt);
        clock.advance(480);
        assert_eq!(drive(&mut unit, &clock.view()), 0);
        assert_eq!(unit.zeroes, 0);
    }

    #[test]
    fn test_adopt_skips_earlier_wraps() {
        let mut clock = looping_clock(100);
        clock.advance(480);

        let mut unit = Counter::new(SyncPolicy::ResetOnWrap);
        adopt(&mut unit, &clock.view());
        assert_eq!(drive(&mut unit, &clock.view()), 0);
        assert_eq!(unit.zeroes, 0);
    }
}
