//! Sine tone unit
//!
//! The phase accumulator is sequencing state: a loop reset pulse restarts
//! the oscillator at phase zero so every pass of a loop sounds the same.

use std::f64::consts::TAU;

use super::{ParamSet, ParamSpec, PrepareContext, Unit, UnitSpec};
use crate::engine::{ResetTracker, SyncPolicy, SyncedUnit, TransportView};
use crate::types::{StereoBuffer, StereoSample};

const FREQ: usize = 0;
const GAIN: usize = 1;
const PAN: usize = 2;

static PARAMS: [ParamSpec; 3] = [
    ParamSpec::new("freq", 440.0).with_range(20.0, 20_000.0),
    ParamSpec::new("gain", 0.2).with_range(0.0, 2.0),
    ParamSpec::new("pan", 0.0).with_range(-1.0, 1.0),
];

pub struct ToneUnit {
    params: ParamSet,
    sample_rate: u32,
    tracker: ResetTracker,
    /// Phase in cycles, 0..1
    phase: f64,
}

impl ToneUnit {
    pub const TYPE: &'static str = "tone";

    pub fn new(spec: &UnitSpec) -> Self {
        Self {
            params: ParamSet::new(&PARAMS),
            sample_rate: spec.sample_rate,
            tracker: ResetTracker::default(),
            phase: 0.0,
        }
    }

    pub fn boxed(spec: &UnitSpec) -> Box<dyn Unit> {
        Box::new(Self::new(spec))
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl SyncedUnit for ToneUnit {
    fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy::ResetOnWrap
    }

    fn reset_tracker(&mut self) -> Option<&mut ResetTracker> {
        Some(&mut self.tracker)
    }

    fn reset_sequencing(&mut self) {
        self.phase = 0.0;
    }
}

impl Unit for ToneUnit {
    fn type_name(&self) -> &'static str {
        Self::TYPE
    }

    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamSet {
        &mut self.params
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) {
        self.sample_rate = ctx.sample_rate;
    }

    fn render(&mut self, out: &mut StereoBuffer, transport: &TransportView) {
        if !transport.is_playing {
            return;
        }
        let step = self.params.get(FREQ) / self.sample_rate as f64;
        let pan = self.params.get_f32(PAN);
        let gain = self.params.get_f32(GAIN);

        for sample in out.iter_mut() {
            let value = (self.phase * TAU).sin() as f32;
            *sample = StereoSample::mono(value).panned(pan, gain);
            self.phase = (self.phase + step).fract();
        }
    }

    fn as_synced(&mut self) -> Option<&mut dyn SyncedUnit> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{sync, TransportClock};

    #[test]
    fn test_phase_advances_and_resets_on_wrap() {
        let mut tone = ToneUnit::new(&UnitSpec::default());
        let mut clock = TransportClock::with_range(0, 1000).unwrap();
        clock.set_looping(true);
        clock.play();

        let mut out = StereoBuffer::silence(480);
        let view = clock.view();
        sync::drive(&mut tone, &view);
        tone.render(&mut out, &view);
        assert!(tone.phase() > 0.0);
        assert!(out.peak() > 0.1);

        clock.advance(480);
        clock.advance(480);
        clock.advance(480);
        assert_eq!(sync::drive(&mut tone, &clock.view()), 1);
        assert_eq!(tone.phase(), 0.0);
    }

    #[test]
    fn test_silent_when_paused() {
        let mut tone = ToneUnit::new(&UnitSpec::default());
        let clock = TransportClock::new();
        let mut out = StereoBuffer::silence(64);
        tone.render(&mut out, &clock.view());
        assert_eq!(out.peak(), 0.0);
        assert_eq!(tone.phase(), 0.0);
    }
}
