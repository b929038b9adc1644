//! Step gate sequencer with sample-and-hold
//!
//! Each step holds a pseudo-random level for its duration and gates it on
//! for the first half of the step. Step index, position within the step,
//! held level and generator state are sequencing state: they cannot be
//! derived from the transport position, so they are zeroed on every loop
//! reset pulse.

use super::{ParamSet, ParamSpec, PrepareContext, Unit, UnitSpec};
use crate::engine::{ResetTracker, SyncPolicy, SyncedUnit, TransportView};
use crate::types::{StereoBuffer, StereoSample};

const GAIN: usize = 0;
const PAN: usize = 1;
const STEPS: usize = 2;
const RATE: usize = 3;

static PARAMS: [ParamSpec; 4] = [
    ParamSpec::new("gain", 0.5).with_range(0.0, 2.0),
    ParamSpec::new("pan", 0.0).with_range(-1.0, 1.0),
    ParamSpec::new("steps", 8.0).with_range(1.0, 64.0),
    // Steps per second
    ParamSpec::new("rate", 4.0).with_range(0.25, 64.0),
];

const SEED: u32 = 0x9E37_79B9;

pub struct StepperUnit {
    params: ParamSet,
    sample_rate: u32,
    tracker: ResetTracker,
    step: u32,
    step_pos: u32,
    held: f32,
    rng: u32,
}

impl StepperUnit {
    pub const TYPE: &'static str = "stepper";

    pub fn new(spec: &UnitSpec) -> Self {
        let mut unit = Self {
            params: ParamSet::new(&PARAMS),
            sample_rate: spec.sample_rate,
            tracker: ResetTracker::default(),
            step: 0,
            step_pos: 0,
            held: 0.0,
            rng: SEED,
        };
        unit.reset_sequencing();
        unit
    }

    pub fn boxed(spec: &UnitSpec) -> Box<dyn Unit> {
        Box::new(Self::new(spec))
    }

    /// Current step index
    pub fn step(&self) -> u32 {
        self.step
    }

    fn step_len(&self) -> u32 {
        ((self.sample_rate as f64 / self.params.get(RATE)) as u32).max(1)
    }

    fn next_level(&mut self) -> f32 {
        // xorshift32
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 17;
        self.rng ^= self.rng << 5;
        (self.rng >> 8) as f32 / (1u32 << 24) as f32
    }
}

impl SyncedUnit for StepperUnit {
    fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy::ResetOnWrap
    }

    fn reset_tracker(&mut self) -> Option<&mut ResetTracker> {
        Some(&mut self.tracker)
    }

    fn reset_sequencing(&mut self) {
        self.step = 0;
        self.step_pos = 0;
        self.rng = SEED;
        self.held = self.next_level();
    }
}

impl Unit for StepperUnit {
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
        let step_len = self.step_len();
        let steps = self.params.get(STEPS) as u32;
        let pan = self.params.get_f32(PAN);
        let gain = self.params.get_f32(GAIN);

        for sample in out.iter_mut() {
            let gate = if self.step_pos < step_len / 2 { 1.0 } else { 0.0 };
            *sample = StereoSample::mono(self.held * gate).panned(pan, gain);

            self.step_pos += 1;
            if self.step_pos >= step_len {
                self.step_pos = 0;
                self.step = (self.step + 1) % steps.max(1);
                if self.step == 0 {
                    // Pattern repeats every `steps` steps
                    self.rng = SEED;
                }
                self.held = self.next_level();
            }
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
    use crate::types::{ParamName, ParamValue};

    fn stepper() -> StepperUnit {
        let mut unit = StepperUnit::new(&UnitSpec::default());
        // 480 frames per step at 48kHz
        unit.handle_param(&ParamName::new("rate").unwrap(), ParamValue::Float(100.0));
        unit
    }

    #[test]
    fn test_steps_advance_while_playing() {
        let mut unit = stepper();
        let mut clock = TransportClock::new();
        clock.play();
        let mut out = StereoBuffer::silence(480 * 3);
        unit.render(&mut out, &clock.view());
        assert_eq!(unit.step(), 3);
        assert!(out.peak() > 0.0);
    }

    #[test]
    fn test_wrap_resets_step_once() {
        let mut unit = stepper();
        let mut clock = TransportClock::with_range(0, 480 * 5).unwrap();
        clock.set_looping(true);
        clock.play();

        let mut first_pass = Vec::new();
        let mut second_pass = Vec::new();
        for quantum in 0..10 {
            let view = clock.view();
            sync::drive(&mut unit, &view);
            let mut out = StereoBuffer::silence(480);
            unit.render(&mut out, &view);
            if quantum < 5 {
                first_pass.push(out.peak());
            } else {
                second_pass.push(out.peak());
            }
            clock.advance(480);
        }

        // After the wrap the pattern replays from step 0
        assert_eq!(clock.reset_generation(), 2);
        assert_eq!(first_pass, second_pass);
        assert_eq!(unit.tracker.last_observed(), 1);
    }

    #[test]
    fn test_zeroing_is_idempotent() {
        let mut a = stepper();
        let mut b = stepper();
        let mut clock = TransportClock::new();
        clock.play();
        let mut out = StereoBuffer::silence(1000);
        a.render(&mut out, &clock.view());
        b.render(&mut out, &clock.view());

        a.reset_sequencing();
        b.reset_sequencing();
        b.reset_sequencing();
        assert_eq!((a.step, a.step_pos, a.held), (b.step, b.step_pos, b.held));
    }
}
