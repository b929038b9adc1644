//! Main voice engine - ties together commands, transport, units and snapshots
//!
//! One call to [`VoiceEngine::process`] runs one quantum:
//!
//! ```text
//!  1. drain commands ──► apply (lifecycle, transport, settings)
//!  2. fold completed reloads into their units
//!  3. unit states follow the transport, capture the TransportView
//!  4. sync every unit (position follow / reset pulses)
//!  5. render each unit, sum, apply master gain
//!  6. advance transport, reap destroyed units, publish snapshot + counters
//! ```
//!
//! The engine is owned by exactly one thread (a driver). Other threads talk
//! to it through [`EngineHandles`]: a command hub to enqueue, a snapshot
//! reader and lock-free counters to observe, and the reload queue for the
//! resource loader.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use basedrop::Shared;

use super::atomics::EngineAtomics;
use super::channel::{command_channel, CommandHub, CommandReceiver};
use super::command::{Command, EngineSetting, TransportCommand};
use super::lifecycle::UnitManager;
use super::snapshot::{snapshot_channel, SnapshotPublisher, SnapshotReader, SnapshotReason, SNAPSHOT_POOL};
use super::transport::{TransportClock, TransportView};
use crate::config::EngineConfig;
use crate::error::{ApplyError, ApplyResult, LifecycleError, ProtocolError};
use crate::resource::{reload_channel, ReloadQueue};
use crate::types::{param_key, StereoBuffer, Target, MAX_QUANTUM_FRAMES};

/// Master gain range
pub const MIN_MASTER_GAIN: f32 = 0.0;
pub const MAX_MASTER_GAIN: f32 = 2.0;

/// Engine-target parameter aliasing `setMasterGain`
const MASTER_GAIN_KEY: u64 = param_key("masterGain");

/// Everything other threads need to talk to a [`VoiceEngine`]
pub struct EngineHandles {
    /// Hands out one [`CommandSender`](super::CommandSender) per producer thread
    pub commands: CommandHub,
    pub snapshots: SnapshotReader,
    pub atomics: Arc<EngineAtomics>,
    /// Give this to a [`ResourceLoader`](crate::resource::ResourceLoader)
    pub reloads: ReloadQueue,
}

/// State mutated by commands
struct EngineState {
    units: UnitManager,
    transport: TransportClock,
    master_gain: f32,
    pending_device: Option<Shared<String>>,
    pending_buffer_size: Option<u32>,
    dump_requested: bool,
}

impl EngineState {
    fn apply(&mut self, command: Command) -> ApplyResult<()> {
        match command {
            Command::Create { id, unit } => {
                let view = self.transport.view();
                self.units.create(id, unit, &view)?;
            }
            Command::Destroy { id } => self.units.destroy(id)?,
            Command::Update {
                target: Target::Unit(id),
                param,
                value,
            } => self.units.update(id, &param, value)?,
            Command::Update {
                target: Target::Engine,
                param,
                value,
            } => {
                if param.key() != MASTER_GAIN_KEY || param.as_str() != "masterGain" {
                    return Err(ProtocolError::InvalidParamName(param.as_str().to_string()).into());
                }
                self.set_master_gain(value.as_f32());
            }
            Command::LoadPreset { id, preset } => self.units.load_preset(id, &preset)?,
            Command::Reload { id, path } => {
                self.units.reload(id, path)?;
            }
            Command::Transport(cmd) => self.apply_transport(cmd)?,
            Command::Engine(setting) => self.apply_setting(setting),
            Command::DebugDump => self.dump_requested = true,
        }
        Ok(())
    }

    fn apply_transport(&mut self, cmd: TransportCommand) -> ApplyResult<()> {
        match cmd {
            TransportCommand::Play => self.transport.play(),
            TransportCommand::Pause => self.transport.pause(),
            TransportCommand::Stop => self.transport.stop(),
            TransportCommand::SetLooping(looping) => self.transport.set_looping(looping),
            TransportCommand::SetRange { start, end } => self.transport.set_range(start, end)?,
            TransportCommand::Seek(frames) => self.transport.seek(frames),
        }
        Ok(())
    }

    fn apply_setting(&mut self, setting: EngineSetting) {
        match setting {
            EngineSetting::MasterGain(gain) => self.set_master_gain(gain),
            EngineSetting::Device(name) => {
                log::info!("Output device change requested: {}", name.as_str());
                self.pending_device = Some(name);
            }
            EngineSetting::BufferSize(frames) => {
                log::info!("Buffer size change requested: {} frames", frames);
                self.pending_buffer_size = Some(frames);
            }
        }
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = if gain.is_finite() {
            gain.clamp(MIN_MASTER_GAIN, MAX_MASTER_GAIN)
        } else {
            self.master_gain
        };
    }
}

/// The voice engine
///
/// Owns the live-unit collection and the transport. Everything here runs on
/// the processing thread and never blocks or allocates once constructed.
pub struct VoiceEngine {
    config: EngineConfig,
    receiver: CommandReceiver,
    state: EngineState,
    publisher: SnapshotPublisher,
    atomics: Arc<EngineAtomics>,
    /// Transport as seen by units in the current quantum
    view: TransportView,
    quantum: u64,
    since_snapshot: u32,
    peak: f32,
    started: Instant,
    /// Staging quantum for buffers longer than [`MAX_QUANTUM_FRAMES`]
    chunk: StereoBuffer,
}

impl VoiceEngine {
    /// Create an engine and the handles other threads use to reach it
    ///
    /// All pools and queues are sized here from the (sanitized) config.
    pub fn new(config: EngineConfig) -> (Self, EngineHandles) {
        let config = config.sanitized();
        let (commands, receiver) = command_channel(&config);
        let (publisher, snapshots) = snapshot_channel(SNAPSHOT_POOL, config.max_units);
        let (requester, reloads) = reload_channel(config.reload_queue_capacity);
        let atomics = Arc::new(EngineAtomics::new());

        let transport = TransportClock::new();
        let state = EngineState {
            units: UnitManager::new(
                config.max_units,
                config.sample_rate,
                MAX_QUANTUM_FRAMES,
                requester,
            ),
            transport,
            master_gain: 1.0,
            pending_device: None,
            pending_buffer_size: None,
            dump_requested: false,
        };

        log::info!(
            "Voice engine created: {} Hz, {} frame quantum, {} units max",
            config.sample_rate,
            config.quantum_frames,
            config.max_units
        );

        let engine = Self {
            config,
            receiver,
            view: state.transport.view(),
            state,
            publisher,
            atomics: Arc::clone(&atomics),
            quantum: 0,
            since_snapshot: 0,
            peak: 0.0,
            started: Instant::now(),
            chunk: StereoBuffer::with_capacity(MAX_QUANTUM_FRAMES),
        };
        let handles = EngineHandles {
            commands,
            snapshots,
            atomics,
            reloads,
        };
        (engine, handles)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportClock {
        &self.state.transport
    }

    pub fn units(&self) -> &UnitManager {
        &self.state.units
    }

    pub fn units_mut(&mut self) -> &mut UnitManager {
        &mut self.state.units
    }

    pub fn master_gain(&self) -> f32 {
        self.state.master_gain
    }

    /// Quanta processed so far
    pub fn quantum(&self) -> u64 {
        self.quantum
    }

    /// Lock-free counters (clone the Arc once and keep it)
    pub fn atomics(&self) -> Arc<EngineAtomics> {
        Arc::clone(&self.atomics)
    }

    /// Take the pending device and buffer size requests
    ///
    /// Called by the host while it owns a stopped engine, right before
    /// restarting the driver with the new settings.
    pub fn take_output_request(&mut self) -> (Option<String>, Option<u32>) {
        let device = self
            .state
            .pending_device
            .take()
            .map(|name| name.as_str().to_string());
        (device, self.state.pending_buffer_size.take())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply one command immediately
    ///
    /// The quantum loop calls this for every drained command; it is public
    /// so single-threaded hosts and tests can bypass the channel.
    pub fn apply(&mut self, command: Command) -> ApplyResult<()> {
        let kind = command.kind();
        let result = self.state.apply(command);
        record(&self.atomics, kind, &result);
        result
    }

    /// Drain the channel and apply everything in it
    fn apply_pending(&mut self) -> usize {
        let mut applied = 0;
        for envelope in self.receiver.drain() {
            let kind = envelope.command.kind();
            let result = self.state.apply(envelope.command);
            record(&self.atomics, kind, &result);
            applied += 1;
        }
        applied
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Quantum
    // ─────────────────────────────────────────────────────────────────────────

    /// Steps 1-4: commands, reloads, unit states, sync
    ///
    /// Returns the transport view every unit renders against this quantum.
    pub fn begin_quantum(&mut self) -> TransportView {
        self.apply_pending();
        self.state.units.poll_resources();

        self.view = self.state.transport.view();
        self.state.units.update_states(&self.view);
        self.state.units.sync_all(&self.view);
        self.view
    }

    /// Step 5: render all units into `out` (overwritten)
    pub fn render(&mut self, out: &mut StereoBuffer) {
        out.fill_silence();
        self.state.units.render(out, &self.view);
        out.scale(self.state.master_gain);
        self.peak = out.peak();
    }

    /// Step 6: advance the transport by `frames` and publish state
    pub fn end_quantum(&mut self, frames: usize) {
        self.state.transport.advance(frames);
        self.state.units.reap();
        self.quantum += 1;

        let dump = std::mem::take(&mut self.state.dump_requested);
        self.since_snapshot += 1;
        let periodic = self.config.snapshot_interval > 0
            && self.since_snapshot >= self.config.snapshot_interval;
        if dump {
            self.publish_snapshot(SnapshotReason::DebugDump);
        } else if periodic {
            self.publish_snapshot(SnapshotReason::Periodic);
        }

        let atomics = &self.atomics;
        atomics.quanta.store(self.quantum, Ordering::Relaxed);
        atomics
            .live_units
            .store(self.state.units.live_count(), Ordering::Relaxed);
        atomics
            .position
            .store(self.state.transport.position(), Ordering::Relaxed);
        atomics
            .playing
            .store(self.state.transport.is_playing(), Ordering::Relaxed);
    }

    /// Render `out.len()` frames
    ///
    /// A buffer of up to [`MAX_QUANTUM_FRAMES`] is one quantum. Longer buffers
    /// are rendered as consecutive quanta of at most that length. A quantum
    /// that takes longer than its real-time duration is counted as an overrun.
    pub fn process(&mut self, out: &mut StereoBuffer) {
        if out.len() <= MAX_QUANTUM_FRAMES {
            self.process_quantum(out);
            return;
        }

        let mut chunk = std::mem::take(&mut self.chunk);
        let total = out.len();
        let mut offset = 0;
        while offset < total {
            let frames = (total - offset).min(MAX_QUANTUM_FRAMES);
            chunk.set_len_from_capacity(frames);
            self.process_quantum(&mut chunk);
            out.as_mut_slice()[offset..offset + frames].copy_from_slice(chunk.as_slice());
            offset += frames;
        }
        self.chunk = chunk;
    }

    fn process_quantum(&mut self, out: &mut StereoBuffer) {
        let start = Instant::now();
        let frames = out.len();

        self.begin_quantum();
        self.render(out);
        self.end_quantum(frames);

        let elapsed_us = start.elapsed().as_micros() as u64;
        let budget_us = frames as u64 * 1_000_000 / self.config.sample_rate as u64;
        self.atomics
            .last_quantum_us
            .store(elapsed_us, Ordering::Relaxed);
        if elapsed_us > budget_us {
            self.atomics.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn publish_snapshot(&mut self, reason: SnapshotReason) {
        let Some(mut snapshot) = self.publisher.acquire() else {
            self.atomics
                .snapshots_skipped
                .fetch_add(1, Ordering::Relaxed);
            return;
        };
        self.since_snapshot = 0;

        snapshot.quantum = self.quantum;
        snapshot.timestamp_us = self.started.elapsed().as_micros() as u64;
        snapshot.reason = reason;
        snapshot.transport = self.state.transport.view();
        snapshot.master_gain = self.state.master_gain;
        snapshot.peak = self.peak;
        // Replacing the old value drops a Shared, which defers to the collector
        snapshot.pending_device = self.state.pending_device.clone();
        snapshot.pending_buffer_size = self.state.pending_buffer_size;
        self.state.units.summaries(&mut snapshot.units);

        self.publisher.publish(snapshot);
    }
}

/// Count a command result and log drops
///
/// Unknown ids are expected (controllers address units that may already be
/// gone) and only logged at debug level.
fn record(atomics: &EngineAtomics, kind: super::command::CommandKind, result: &ApplyResult<()>) {
    match result {
        Ok(()) => {
            atomics.commands_applied.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            atomics.commands_dropped.fetch_add(1, Ordering::Relaxed);
            match err {
                ApplyError::Lifecycle(LifecycleError::UnknownId(_)) | ApplyError::State(_) => {
                    log::debug!("Dropped {:?} command: {}", kind, err)
                }
                _ => log::warn!("Dropped {:?} command: {}", kind, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CommandSender, TransportState};
    use crate::resource::{MemoryStore, ResourceStore};
    use crate::types::{Frames, ParamName, ParamValue, StereoSample, UnitId, UnitState};
    use crate::unit::{UnitRegistry, UnitSpec};

    const QUANTUM: usize = 480;

    struct Rig {
        engine: VoiceEngine,
        handles: EngineHandles,
        sender: CommandSender,
        store: MemoryStore,
        registry: UnitRegistry,
        out: StereoBuffer,
    }

    impl Rig {
        fn new() -> Self {
            let config = EngineConfig {
                sample_rate: 48000,
                quantum_frames: QUANTUM,
                snapshot_interval: 0,
                ..Default::default()
            };
            let (engine, handles) = VoiceEngine::new(config);
            let sender = handles.commands.sender().unwrap();
            let store = MemoryStore::new(48000);
            store.insert("a.wav", ramp(200_000));
            store.insert("b.wav", ramp(90_000));
            Self {
                engine,
                handles,
                sender,
                store,
                registry: UnitRegistry::with_builtins(),
                out: StereoBuffer::silence(QUANTUM),
            }
        }

        fn send(&mut self, command: Command) {
            self.sender.enqueue(command).unwrap();
        }

        fn create(&mut self, raw: u32, type_name: &str, resource: Option<&str>) {
            let mut spec = UnitSpec::default();
            if let Some(path) = resource {
                spec = spec.with_resource(path);
            }
            let command = self
                .registry
                .create_command(id(raw), type_name, &spec)
                .unwrap();
            self.send(command);
        }

        fn tick(&mut self) {
            self.engine.process(&mut self.out);
        }

        /// Complete every queued reload synchronously
        fn service_reloads(&mut self) -> usize {
            let mut served = 0;
            while let Some(request) = self.handles.reloads.pop() {
                let result = self.store.load(&request.path);
                request.complete(result);
                served += 1;
            }
            served
        }

        fn position(&self) -> Frames {
            self.engine.transport().position()
        }
    }

    fn id(raw: u32) -> UnitId {
        UnitId::new(raw).unwrap()
    }

    fn ramp(len: usize) -> Vec<StereoSample> {
        (0..len)
            .map(|i| StereoSample::mono((i % 100) as f32 / 100.0))
            .collect()
    }

    #[test]
    fn test_create_destroy_counts() {
        let mut rig = Rig::new();
        for raw in 1..=6 {
            rig.create(raw, "tone", None);
        }
        rig.send(Command::Destroy { id: id(2) });
        rig.send(Command::Destroy { id: id(5) });
        rig.tick();

        assert_eq!(rig.engine.units().live_count(), 4);
        assert_eq!(rig.engine.units().len(), 4);
        assert_eq!(rig.handles.atomics.live_units(), 4);
    }

    #[test]
    fn test_commands_for_missing_units_are_noops() {
        let mut rig = Rig::new();
        rig.send(Command::Destroy { id: id(9) });
        rig.send(Command::Update {
            target: Target::Unit(id(9)),
            param: ParamName::new("gain").unwrap(),
            value: ParamValue::Float(0.5),
        });
        rig.tick();
        assert_eq!(rig.handles.atomics.commands_dropped(), 2);
        assert_eq!(rig.engine.quantum(), 1);
    }

    #[test]
    fn test_destroy_cancels_pending_updates() {
        let mut rig = Rig::new();
        rig.create(1, "tone", None);
        rig.tick();

        rig.send(Command::Destroy { id: id(1) });
        rig.sender
            .enqueue_latest(
                Target::Unit(id(1)),
                ParamName::new("freq").unwrap(),
                ParamValue::Float(220.0),
            )
            .unwrap();
        rig.tick();
        assert!(!rig.engine.units().contains(id(1)));
        assert_eq!(rig.handles.atomics.commands_dropped(), 1);
    }

    #[test]
    fn test_latest_value_wins_within_quantum() {
        let mut rig = Rig::new();
        rig.create(1, "tone", None);
        rig.tick();
        let applied = rig.handles.atomics.commands_applied.load(Ordering::Relaxed);

        let pan = ParamName::new("pan").unwrap();
        rig.sender
            .enqueue_latest(Target::Unit(id(1)), pan, ParamValue::Float(-0.5))
            .unwrap();
        rig.sender
            .enqueue_latest(Target::Unit(id(1)), pan, ParamValue::Float(0.75))
            .unwrap();
        rig.tick();

        let unit = rig.engine.units().get(id(1)).unwrap();
        assert_eq!(unit.params().get(2), 0.75);
        assert_eq!(
            rig.handles.atomics.commands_applied.load(Ordering::Relaxed),
            applied + 1
        );
    }

    #[test]
    fn test_pause_resume_restores_position() {
        let mut rig = Rig::new();
        rig.send(Command::Transport(TransportCommand::Play));
        for _ in 0..10 {
            rig.tick();
        }
        assert_eq!(rig.position(), 4800);

        rig.send(Command::Transport(TransportCommand::Pause));
        rig.tick();
        rig.tick();
        assert_eq!(rig.engine.transport().paused_position(), Some(4800));
        assert_eq!(rig.position(), 4800);

        rig.send(Command::Transport(TransportCommand::Play));
        let view = rig.engine.begin_quantum();
        assert_eq!(view.position, 4800);
        assert_eq!(view.paused_position, None);
        assert!(view.is_playing);
    }

    #[test]
    fn test_oversized_buffer_renders_as_consecutive_quanta() {
        let mut rig = Rig::new();
        rig.create(1, "tone", None);
        rig.send(Command::Transport(TransportCommand::Play));

        let mut out = StereoBuffer::silence(10_000);
        rig.engine.process(&mut out);

        assert_eq!(out.len(), 10_000);
        assert_eq!(rig.engine.quantum(), 2);
        assert_eq!(rig.position(), 10_000);
        // The tail after the first quantum was rendered too
        assert!(out.as_slice()[MAX_QUANTUM_FRAMES..].iter().any(|s| s.peak() > 0.0));

        // Regular quanta still work afterwards
        rig.tick();
        assert_eq!(rig.position(), 10_000 + QUANTUM as Frames);
    }

    #[test]
    fn test_stop_then_play_starts_at_range_start() {
        let mut rig = Rig::new();
        rig.send(Command::Transport(TransportCommand::SetRange {
            start: 960,
            end: 48_000,
        }));
        rig.send(Command::Transport(TransportCommand::Play));
        for _ in 0..5 {
            rig.tick();
        }
        rig.send(Command::Transport(TransportCommand::Pause));
        rig.tick();
        rig.send(Command::Transport(TransportCommand::Stop));
        rig.tick();
        assert_eq!(rig.position(), 960);
        assert_eq!(rig.engine.transport().paused_position(), None);

        rig.send(Command::Transport(TransportCommand::Play));
        assert_eq!(rig.engine.begin_quantum().position, 960);
    }

    #[test]
    fn test_one_reset_pulse_per_wrap() {
        let mut rig = Rig::new();
        rig.send(Command::Transport(TransportCommand::SetRange { start: 0, end: 4800 }));
        rig.send(Command::Transport(TransportCommand::SetLooping(true)));
        rig.send(Command::Transport(TransportCommand::Play));
        for _ in 0..35 {
            rig.tick();
        }
        // 35 quanta of 480 = 16800 frames = 3 full passes of 4800
        assert_eq!(rig.engine.transport().reset_generation(), 3);
        assert_eq!(rig.position(), 16800 - 3 * 4800);
    }

    #[test]
    fn test_master_gain_clamped_and_aliased() {
        let mut rig = Rig::new();
        rig.send(Command::Engine(EngineSetting::MasterGain(5.0)));
        rig.tick();
        assert_eq!(rig.engine.master_gain(), MAX_MASTER_GAIN);

        rig.sender
            .enqueue_latest(
                Target::Engine,
                ParamName::new("masterGain").unwrap(),
                ParamValue::Float(0.5),
            )
            .unwrap();
        rig.tick();
        assert_eq!(rig.engine.master_gain(), 0.5);

        let bogus = rig.engine.apply(Command::Update {
            target: Target::Engine,
            param: ParamName::new("tempo").unwrap(),
            value: ParamValue::Float(1.0),
        });
        assert!(matches!(bogus, Err(ApplyError::Protocol(_))));
    }

    #[test]
    fn test_debug_dump_publishes_snapshot() {
        let mut rig = Rig::new();
        rig.create(1, "tone", None);
        rig.create(2, "player", Some("a.wav"));
        rig.send(Command::set_device("hw:2"));
        rig.send(Command::Engine(EngineSetting::BufferSize(128)));
        rig.tick();
        assert!(rig.handles.snapshots.refresh().is_none());

        rig.service_reloads();
        rig.send(Command::DebugDump);
        rig.tick();

        let snapshot = rig.handles.snapshots.refresh().unwrap();
        assert_eq!(snapshot.reason, SnapshotReason::DebugDump);
        assert_eq!(snapshot.units.len(), 2);
        assert_eq!(snapshot.pending_buffer_size, Some(128));
        assert_eq!(snapshot.pending_device.as_deref().map(String::as_str), Some("hw:2"));
        let player = snapshot.unit(2).unwrap();
        assert_eq!(player.resource_frames, Some(200_000));
        assert_eq!(player.normalized_position, Some(0.0));
        assert_eq!(snapshot.transport.state, TransportState::Stopped);

        assert_eq!(
            rig.engine.take_output_request(),
            (Some("hw:2".to_string()), Some(128))
        );
        assert_eq!(rig.engine.take_output_request(), (None, None));
    }

    #[test]
    fn test_periodic_snapshots() {
        let config = EngineConfig {
            snapshot_interval: 4,
            ..Default::default()
        };
        let (mut engine, mut handles) = VoiceEngine::new(config);
        let mut out = StereoBuffer::silence(256);
        for _ in 0..8 {
            engine.process(&mut out);
        }
        let mut quanta = Vec::new();
        handles.snapshots.poll(|s| quanta.push(s.quantum));
        assert_eq!(quanta, vec![4, 8]);
    }

    #[test]
    fn test_unit_states_follow_transport() {
        let mut rig = Rig::new();
        rig.create(1, "stepper", None);
        rig.tick();
        assert_eq!(rig.engine.units().state(id(1)), Some(UnitState::Prepared));

        rig.send(Command::Transport(TransportCommand::Play));
        rig.tick();
        assert_eq!(rig.engine.units().state(id(1)), Some(UnitState::Playing));
        assert!(rig.out.peak() > 0.0);

        rig.send(Command::Transport(TransportCommand::Pause));
        rig.tick();
        assert_eq!(rig.engine.units().state(id(1)), Some(UnitState::Paused));
    }

    #[test]
    fn test_invalid_range_is_dropped() {
        let mut rig = Rig::new();
        let result = rig.engine.apply(Command::Transport(TransportCommand::SetRange {
            start: 100,
            end: 100,
        }));
        assert!(matches!(
            result,
            Err(ApplyError::Protocol(ProtocolError::InvalidRange { .. }))
        ));
        assert_eq!(rig.engine.transport().range(), (0, Frames::MAX));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reload racing a resume
    // ─────────────────────────────────────────────────────────────────────────

    /// Unit 1001 playing, paused at 72480 with a reload requested while paused
    fn paused_with_reload_in_flight() -> Rig {
        let mut rig = Rig::new();
        rig.create(1001, "player", Some("a.wav"));
        rig.tick();
        rig.service_reloads();

        rig.send(Command::Transport(TransportCommand::Play));
        while rig.position() < 72480 {
            rig.tick();
        }
        assert_eq!(rig.position(), 72480);

        rig.send(Command::Transport(TransportCommand::Pause));
        rig.tick();
        assert_eq!(rig.engine.transport().paused_position(), Some(72480));
        assert!(!rig.engine.transport().is_playing());

        rig.send(Command::reload(id(1001), "b.wav"));
        rig.tick();
        rig
    }

    #[test]
    fn test_reload_completing_after_resume_keeps_position() {
        let mut rig = paused_with_reload_in_flight();

        rig.send(Command::Transport(TransportCommand::Play));
        let view = rig.engine.begin_quantum();
        assert_eq!(view.position, 72480);
        assert_eq!(view.paused_position, None);
        assert!(view.is_playing);
        rig.engine.render(&mut rig.out);
        rig.engine.end_quantum(QUANTUM);

        // Reload lands now, with a different length
        assert_eq!(rig.service_reloads(), 1);
        rig.tick();
        assert_eq!(rig.position(), 72480 + 2 * QUANTUM as Frames);

        let frames = rig
            .engine
            .units()
            .get(id(1001))
            .and_then(|unit| unit.resource_slot())
            .and_then(|slot| slot.length_frames());
        assert_eq!(frames, Some(90_000));
    }

    #[test]
    fn test_reload_completing_before_resume_keeps_position() {
        let mut rig = paused_with_reload_in_flight();
        rig.service_reloads();
        rig.tick();

        rig.send(Command::Transport(TransportCommand::Play));
        let view = rig.engine.begin_quantum();
        assert_eq!(view.position, 72480);
        assert_eq!(rig.engine.transport().paused_position(), None);
        assert!(rig.engine.transport().is_playing());
    }

    #[test]
    fn test_failed_reload_keeps_old_resource() {
        let mut rig = paused_with_reload_in_flight();
        rig.store.remove(std::path::Path::new("b.wav"));
        rig.service_reloads();
        rig.send(Command::Transport(TransportCommand::Play));
        rig.tick();

        assert_eq!(rig.position(), 72480 + QUANTUM as Frames);
        let unit = rig.engine.units().get(id(1001)).unwrap();
        assert_eq!(unit.resource_slot().and_then(|s| s.length_frames()), Some(200_000));
        assert!(rig.out.peak() > 0.0);
    }
}
