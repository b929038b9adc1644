//! Media player unit
//!
//! Two modes, selected by the `sync` parameter:
//!
//! - **Synced** (`sync = 1`): the playhead is a pure function of the
//!   transport position. Nothing to preserve across reloads.
//! - **Free** (`sync = 0`): the unit owns its playhead and runs while the
//!   transport plays. A reload preserves the position: the playhead and the
//!   elapsed frame count are captured *before* the request is sent, and the
//!   new position is only derived once the new resource's length is known.
//!
//! The player never writes the transport.

use std::path::PathBuf;

use basedrop::Shared;

use super::{ParamSet, ParamSpec, PrepareContext, Unit, UnitSpec};
use crate::engine::{gc_handle, SyncPolicy, SyncedUnit, TransportView};
use crate::error::ResourceResult;
use crate::resource::{ReloadOutcome, ReloadRequester, ResourceSlot};
use crate::types::{Frames, StereoBuffer, UnitId};

const GAIN: usize = 0;
const PAN: usize = 1;
const SYNC: usize = 2;
const X: usize = 3;
const Y: usize = 4;
const AMPLITUDE: usize = 5;

static PARAMS: [ParamSpec; 6] = [
    ParamSpec::new("gain", 1.0).with_range(0.0, 2.0),
    ParamSpec::new("pan", 0.0).with_range(-1.0, 1.0),
    ParamSpec::new("sync", 0.0),
    ParamSpec::new("x", 0.0).with_range(-1.0, 1.0),
    ParamSpec::new("y", 0.0),
    ParamSpec::new("amplitude", 1.0).with_range(0.0, 2.0),
];

/// Position captured when a free-mode reload was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PreserveIntent {
    generation: u64,
    playhead: Frames,
    elapsed: u64,
}

pub struct PlayerUnit {
    params: ParamSet,
    slot: ResourceSlot,
    /// Resource requested when the unit is prepared
    initial: Option<Shared<PathBuf>>,
    /// Free-mode playhead (or last derived position in synced mode)
    playhead: Frames,
    /// Frames rendered while the transport was playing
    elapsed: u64,
    intent: Option<PreserveIntent>,
}

impl PlayerUnit {
    pub const TYPE: &'static str = "player";

    pub fn new(spec: &UnitSpec) -> Self {
        Self {
            params: ParamSet::new(&PARAMS),
            slot: ResourceSlot::new(),
            initial: spec
                .resource
                .clone()
                .map(|path| Shared::new(&gc_handle(), path)),
            playhead: 0,
            elapsed: 0,
            intent: None,
        }
    }

    pub fn boxed(spec: &UnitSpec) -> Box<dyn Unit> {
        Box::new(Self::new(spec))
    }

    fn synced(&self) -> bool {
        self.params.get(SYNC) >= 0.5
    }

    /// Effective pan and gain after placement
    fn pan_gain(&self) -> (f32, f32) {
        let pan = (self.params.get(PAN) + self.params.get(X)).clamp(-1.0, 1.0);
        // y is depth: the far edge is half as loud
        let depth = 1.0 - 0.5 * self.params.get(Y);
        let gain = self.params.get(GAIN) * self.params.get(AMPLITUDE) * depth;
        (pan as f32, gain as f32)
    }
}

impl SyncedUnit for PlayerUnit {
    fn sync_policy(&self) -> SyncPolicy {
        if self.synced() {
            SyncPolicy::PositionDerived
        } else {
            SyncPolicy::Exempt
        }
    }

    fn follow_position(&mut self, transport: &TransportView) {
        if let Some(len) = self.slot.length_frames() {
            self.playhead = transport.position.rem_euclid(len);
        }
    }
}

impl Unit for PlayerUnit {
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
        if let Some(path) = self.initial.take() {
            if let Err(e) = self.request_reload(ctx.id, path, ctx.reloads) {
                log::warn!("Unit {}: initial load not queued: {}", ctx.id, e);
            }
        }
    }

    fn render(&mut self, out: &mut StereoBuffer, transport: &TransportView) {
        if !transport.is_playing {
            return;
        }
        let frames = out.len();
        let (pan, gain) = self.pan_gain();

        if let Some(handle) = self.slot.current() {
            if self.synced() {
                for (i, sample) in out.iter_mut().enumerate() {
                    if let Some(pos) = transport.frame_at(i) {
                        *sample = handle.frame(pos).panned(pan, gain);
                    }
                }
            } else {
                let start = self.playhead;
                for (i, sample) in out.iter_mut().enumerate() {
                    *sample = handle.frame(start + i as Frames).panned(pan, gain);
                }
                self.playhead = (start + frames as Frames).rem_euclid(handle.length_frames());
            }
        }
        self.elapsed += frames as u64;
    }

    fn as_synced(&mut self) -> Option<&mut dyn SyncedUnit> {
        Some(self)
    }

    fn resource_slot(&self) -> Option<&ResourceSlot> {
        Some(&self.slot)
    }

    fn request_reload(
        &mut self,
        id: UnitId,
        path: Shared<PathBuf>,
        reloads: &mut ReloadRequester,
    ) -> ResourceResult<u64> {
        // Snapshot the authoritative position before the request goes out
        let playhead = self.playhead;
        let elapsed = self.elapsed;
        let has_resource = self.slot.current().is_some();

        let generation = self.slot.request(id, path, reloads)?;
        self.intent = (has_resource && !self.synced()).then_some(PreserveIntent {
            generation,
            playhead,
            elapsed,
        });
        Ok(generation)
    }

    fn poll_resource(&mut self, id: UnitId) -> Option<ReloadOutcome> {
        let outcome = self.slot.poll(id)?;
        match outcome {
            ReloadOutcome::Swapped {
                generation,
                new_len,
                ..
            } => {
                // new_len is non-zero: the slot never swaps in an empty handle
                self.playhead = match self.intent.take() {
                    Some(intent) if intent.generation == generation => {
                        let since = (self.elapsed - intent.elapsed) as Frames;
                        (intent.playhead + since).rem_euclid(new_len)
                    }
                    _ if self.synced() => self.playhead.rem_euclid(new_len),
                    _ => 0,
                };
                log::info!(
                    "Unit {}: resource swapped ({} frames, playhead {})",
                    id,
                    new_len,
                    self.playhead
                );
            }
            ReloadOutcome::Failed { .. } => {
                self.intent = None;
            }
        }
        Some(outcome)
    }

    fn playhead(&self) -> Option<Frames> {
        self.slot.current().map(|_| self.playhead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TransportClock;
    use crate::resource::{reload_channel, LoadedMedia};
    use crate::types::{ParamName, ParamValue, StereoSample};

    const QUANTUM: usize = 480;

    fn id() -> UnitId {
        UnitId::new(1001).unwrap()
    }

    fn ramp(len: usize) -> ResourceResult<LoadedMedia> {
        let frames = (0..len).map(|i| StereoSample::mono(i as f32)).collect();
        Ok(LoadedMedia::new("ramp.wav", 48000, frames))
    }

    fn path(p: &str) -> Shared<PathBuf> {
        Shared::new(&gc_handle(), PathBuf::from(p))
    }

    fn prepared_player(
        len: usize,
        sync: bool,
    ) -> (PlayerUnit, ReloadRequester, crate::resource::ReloadQueue, TransportClock) {
        let (mut requester, mut queue) = reload_channel(8);
        let mut clock = TransportClock::new();
        let mut unit = PlayerUnit::new(&UnitSpec::default().with_resource("ramp.wav"));
        unit.handle_param(
            &ParamName::new("sync").unwrap(),
            ParamValue::Int(sync as i64),
        );
        unit.prepare(&mut PrepareContext {
            id: id(),
            sample_rate: 48000,
            max_frames: QUANTUM,
            transport: clock.view(),
            reloads: &mut requester,
        });
        queue.pop().unwrap().complete(ramp(len));
        assert!(unit.poll_resource(id()).is_some());
        clock.play();
        (unit, requester, queue, clock)
    }

    fn tick(unit: &mut PlayerUnit, clock: &mut TransportClock) {
        let mut out = StereoBuffer::silence(QUANTUM);
        let view = clock.view();
        crate::engine::sync::drive(unit, &view);
        unit.render(&mut out, &view);
        clock.advance(QUANTUM);
    }

    #[test]
    fn test_free_mode_preserves_position_across_reload() {
        let (mut unit, mut requester, mut queue, mut clock) = prepared_player(100_000, false);
        for _ in 0..10 {
            tick(&mut unit, &mut clock);
        }
        assert_eq!(unit.playhead(), Some(4800));

        unit.request_reload(id(), path("new.wav"), &mut requester)
            .unwrap();
        // Old resource keeps playing while the load is in flight
        tick(&mut unit, &mut clock);
        tick(&mut unit, &mut clock);

        queue.pop().unwrap().complete(ramp(50_000));
        unit.poll_resource(id());
        assert_eq!(unit.playhead(), Some(4800 + 2 * QUANTUM as Frames));
    }

    #[test]
    fn test_free_mode_wraps_into_shorter_resource() {
        let (mut unit, mut requester, mut queue, mut clock) = prepared_player(100_000, false);
        for _ in 0..10 {
            tick(&mut unit, &mut clock);
        }
        unit.request_reload(id(), path("short.wav"), &mut requester)
            .unwrap();
        queue.pop().unwrap().complete(ramp(1000));
        unit.poll_resource(id());
        assert_eq!(unit.playhead(), Some(4800 % 1000));
    }

    #[test]
    fn test_failed_reload_leaves_position_alone() {
        let (mut unit, mut requester, mut queue, mut clock) = prepared_player(100_000, false);
        for _ in 0..3 {
            tick(&mut unit, &mut clock);
        }
        unit.request_reload(id(), path("bad.wav"), &mut requester)
            .unwrap();
        queue.pop().unwrap().complete(ramp(0));
        assert!(matches!(
            unit.poll_resource(id()),
            Some(ReloadOutcome::Failed { .. })
        ));
        assert_eq!(unit.playhead(), Some(1440));
        assert_eq!(unit.slot.length_frames(), Some(100_000));
    }

    #[test]
    fn test_synced_mode_derives_from_transport() {
        let (mut unit, _requester, _queue, mut clock) = prepared_player(1000, true);
        clock.seek(2500);
        let mut out = StereoBuffer::silence(4);
        let view = clock.view();
        crate::engine::sync::drive(&mut unit, &view);
        unit.render(&mut out, &view);

        assert_eq!(unit.playhead(), Some(500));
        // Ramp content equals the frame index; centre pan scales by 1/sqrt(2)
        let expected = 501.0 * std::f32::consts::FRAC_1_SQRT_2;
        assert!((out[1].left - expected).abs() < 1e-2);
    }

    #[test]
    fn test_silent_when_transport_stopped() {
        let (mut unit, _requester, _queue, mut clock) = prepared_player(1000, false);
        clock.stop();
        let mut out = StereoBuffer::silence(QUANTUM);
        unit.render(&mut out, &clock.view());
        assert_eq!(out.peak(), 0.0);
        assert_eq!(unit.playhead(), Some(0));
    }
}
