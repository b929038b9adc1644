//! Feedback delay unit
//!
//! A short sine burst is fed into a stereo feedback delay line every
//! `interval` seconds. Delay-line contents are continuous, transport-free
//! state: the unit is exempt from loop resets and keeps ringing across
//! wraps.
//!
//! Parameters:
//! - time: delay time in ms (10-2000ms)
//! - feedback: amount fed back (0-95%)
//! - mix: dry/wet balance
//! - interval: seconds between bursts

use std::f32::consts::TAU;

use super::{ParamSet, ParamSpec, PrepareContext, Unit, UnitSpec};
use crate::engine::TransportView;
use crate::types::{StereoBuffer, StereoSample};

/// Maximum delay time in seconds
const MAX_DELAY_SECONDS: f64 = 2.0;

/// Burst length in seconds
const BURST_SECONDS: f64 = 0.02;

const TIME: usize = 0;
const FEEDBACK: usize = 1;
const MIX: usize = 2;
const GAIN: usize = 3;
const PAN: usize = 4;
const INTERVAL: usize = 5;
const FREQ: usize = 6;

static PARAMS: [ParamSpec; 7] = [
    ParamSpec::new("time", 250.0).with_range(10.0, 2000.0),
    ParamSpec::new("feedback", 0.4).with_range(0.0, 0.95),
    ParamSpec::new("mix", 0.5),
    ParamSpec::new("gain", 0.5).with_range(0.0, 2.0),
    ParamSpec::new("pan", 0.0).with_range(-1.0, 1.0),
    ParamSpec::new("interval", 1.0).with_range(0.05, 30.0),
    ParamSpec::new("freq", 880.0).with_range(20.0, 20_000.0),
];

/// Stereo delay line
struct DelayLine {
    buffer_l: Vec<f32>,
    buffer_r: Vec<f32>,
    write_pos: usize,
    delay_samples: usize,
}

impl DelayLine {
    fn new(max_samples: usize) -> Self {
        Self {
            buffer_l: vec![0.0; max_samples.max(2)],
            buffer_r: vec![0.0; max_samples.max(2)],
            write_pos: 0,
            delay_samples: 1,
        }
    }

    fn capacity(&self) -> usize {
        self.buffer_l.len()
    }

    fn set_delay_samples(&mut self, samples: usize) {
        self.delay_samples = samples.clamp(1, self.capacity() - 1);
    }

    /// Read, then write input plus feedback, then advance
    #[inline]
    fn process(&mut self, input: StereoSample, feedback: f32) -> StereoSample {
        let cap = self.capacity();
        let read_pos = (self.write_pos + cap - self.delay_samples) % cap;
        let delayed = StereoSample::new(self.buffer_l[read_pos], self.buffer_r[read_pos]);

        self.buffer_l[self.write_pos] = input.left + delayed.left * feedback;
        self.buffer_r[self.write_pos] = input.right + delayed.right * feedback;
        self.write_pos = (self.write_pos + 1) % cap;

        delayed
    }
}

pub struct DelayUnit {
    params: ParamSet,
    sample_rate: u32,
    line: DelayLine,
    /// Frames since the last burst started
    since_burst: u64,
    burst_phase: f32,
}

impl DelayUnit {
    pub const TYPE: &'static str = "delay";

    pub fn new(spec: &UnitSpec) -> Self {
        let max_samples = (spec.sample_rate as f64 * MAX_DELAY_SECONDS) as usize;
        let mut unit = Self {
            params: ParamSet::new(&PARAMS),
            sample_rate: spec.sample_rate,
            line: DelayLine::new(max_samples),
            since_burst: 0,
            burst_phase: 0.0,
        };
        unit.update_delay_time();
        unit
    }

    pub fn boxed(spec: &UnitSpec) -> Box<dyn Unit> {
        Box::new(Self::new(spec))
    }

    fn update_delay_time(&mut self) {
        let samples = self.params.get(TIME) / 1000.0 * self.sample_rate as f64;
        self.line.set_delay_samples(samples as usize);
    }

    #[inline]
    fn next_input(&mut self) -> f32 {
        let interval = (self.params.get(INTERVAL) * self.sample_rate as f64) as u64;
        let burst = (BURST_SECONDS * self.sample_rate as f64) as u64;
        if self.since_burst >= interval.max(1) {
            self.since_burst = 0;
            self.burst_phase = 0.0;
        }
        let value = if self.since_burst < burst {
            (self.burst_phase * TAU).sin()
        } else {
            0.0
        };
        self.burst_phase = (self.burst_phase + self.params.get_f32(FREQ) / self.sample_rate as f32).fract();
        self.since_burst += 1;
        value
    }
}

impl Unit for DelayUnit {
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
        if ctx.sample_rate != self.sample_rate {
            // Buffer stays as sized at construction; only the delay time follows
            self.sample_rate = ctx.sample_rate;
            self.update_delay_time();
        }
    }

    fn param_changed(&mut self, index: usize) {
        if index == TIME {
            self.update_delay_time();
        }
    }

    fn render(&mut self, out: &mut StereoBuffer, transport: &TransportView) {
        // Tail keeps ringing while paused; new bursts only while playing
        let feedback = self.params.get_f32(FEEDBACK);
        let mix = self.params.get_f32(MIX);
        let pan = self.params.get_f32(PAN);
        let gain = self.params.get_f32(GAIN);

        for sample in out.iter_mut() {
            let dry = if transport.is_playing {
                self.next_input()
            } else {
                0.0
            };
            let wet = self.line.process(StereoSample::mono(dry), feedback);
            let mixed = StereoSample::mono(dry) * (1.0 - mix) + wet * mix;
            *sample = mixed.panned(pan, gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TransportClock;
    use crate::types::{ParamName, ParamValue};

    #[test]
    fn test_echo_arrives_after_delay_time() {
        let mut unit = DelayUnit::new(&UnitSpec::default());
        unit.handle_param(&ParamName::new("time").unwrap(), ParamValue::Float(100.0));
        unit.handle_param(&ParamName::new("mix").unwrap(), ParamValue::Float(1.0));
        unit.handle_param(&ParamName::new("interval").unwrap(), ParamValue::Float(10.0));
        assert_eq!(unit.line.delay_samples, 4800);

        let mut clock = TransportClock::new();
        clock.play();
        let mut out = StereoBuffer::silence(4800 + 960);
        unit.render(&mut out, &clock.view());

        let before = out.as_slice()[..4800].iter().map(|s| s.peak()).fold(0.0, f32::max);
        let after = out.as_slice()[4800..].iter().map(|s| s.peak()).fold(0.0, f32::max);
        assert_eq!(before, 0.0);
        assert!(after > 0.1);
    }

    #[test]
    fn test_tail_rings_while_paused() {
        let mut unit = DelayUnit::new(&UnitSpec::default());
        let mut clock = TransportClock::new();
        clock.play();
        let mut out = StereoBuffer::silence(2400);
        unit.render(&mut out, &clock.view());

        clock.pause();
        let mut tail = StereoBuffer::silence(12_000);
        unit.render(&mut tail, &clock.view());
        assert!(tail.peak() > 0.0);
    }

    #[test]
    fn test_not_a_synced_unit() {
        let mut unit = DelayUnit::new(&UnitSpec::default());
        assert!(unit.as_synced().is_none());
    }
}
