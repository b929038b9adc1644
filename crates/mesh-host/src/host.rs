//! Running host: driver, loader, control listeners and the monitor loop
//!
//! ```text
//!  stdin / script ─► Dispatcher ─┐
//!  UDP ────────────► Dispatcher ─┼─► CommandHub ─► VoiceEngine (driver thread)
//!                                │                     │
//!  monitor loop ◄── snapshots ◄──┴─────────────────────┘
//!        │
//!        └─ device / buffer size request: stop driver, take engine, restart
//! ```

use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{after, never, tick};

use mesh_control::{spawn_line_reader, DispatchStats, Dispatcher, UdpListener};
use mesh_engine::audio::{start_audio, AudioBackend, AudioHandle};
use mesh_engine::engine::{CommandHub, EngineAtomics, EngineSnapshot, SnapshotReader, SnapshotReason, VoiceEngine};
use mesh_engine::resource::{ResourceLoader, WavStore};
use mesh_engine::unit::UnitRegistry;

use crate::config::HostConfig;

/// What ended [`Host::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// Every line reader reached end of input
    InputClosed,
    DurationElapsed,
}

pub struct Host {
    config: HostConfig,
    audio: Option<AudioHandle>,
    hub: CommandHub,
    registry: UnitRegistry,
    snapshots: SnapshotReader,
    atomics: Arc<EngineAtomics>,
    loader: ResourceLoader,
    udp: Option<UdpListener>,
    readers: Vec<(String, JoinHandle<DispatchStats>)>,
    /// Snapshots up to this quantum predate the last restart
    restarted_at: u64,
    overruns_seen: u64,
}

impl Host {
    /// Build the engine, start the driver, the loader and the UDP listener
    pub fn start(config: HostConfig) -> Result<Self> {
        let (engine, handles) = VoiceEngine::new(config.engine.clone());
        let sample_rate = engine.config().sample_rate;

        let mut store = WavStore::new().with_sample_rate(sample_rate);
        if let Some(root) = &config.resources.root {
            store = store.with_root(root);
        }
        let loader = ResourceLoader::spawn(handles.reloads, Arc::new(store))
            .context("Failed to spawn resource loader")?;

        let audio = start_audio(engine, &config.audio).context("Failed to start audio driver")?;
        log::info!(
            "Audio driver running: {:?}, {} Hz, {} frame buffer",
            config.audio.backend,
            audio.sample_rate(),
            audio.buffer_size()
        );

        let mut host = Self {
            audio: Some(audio),
            hub: handles.commands,
            registry: UnitRegistry::with_builtins(),
            snapshots: handles.snapshots,
            atomics: handles.atomics,
            loader,
            udp: None,
            readers: Vec::new(),
            restarted_at: 0,
            overruns_seen: 0,
            config,
        };

        if let Some(addr) = host.config.control.udp_bind.clone() {
            let dispatcher = host.dispatcher()?;
            let listener = UdpListener::bind(&addr, dispatcher)
                .with_context(|| format!("Failed to bind UDP control on {}", addr))?;
            host.udp = Some(listener);
        }

        Ok(host)
    }

    fn dispatcher(&self) -> Result<Dispatcher> {
        let sender = self.hub.sender().map_err(|e| anyhow::anyhow!("{e}")).context("No producer lane available")?;
        Ok(Dispatcher::new(
            self.registry.clone(),
            sender,
            self.config.engine.sample_rate,
        ))
    }

    /// Feed control lines from `reader` (stdin, a script file)
    pub fn attach_reader<R>(&mut self, name: &str, reader: R) -> Result<()>
    where
        R: BufRead + Send + 'static,
    {
        let dispatcher = self.dispatcher()?;
        let handle = spawn_line_reader(name, reader, dispatcher)
            .with_context(|| format!("Failed to spawn {} reader", name))?;
        self.readers.push((name.to_string(), handle));
        Ok(())
    }

    pub fn atomics(&self) -> &EngineAtomics {
        &self.atomics
    }

    pub fn audio(&self) -> Option<&AudioHandle> {
        self.audio.as_ref()
    }

    /// Monitor until every reader closes or `duration` passes
    ///
    /// Without readers or a duration this runs until the process is killed.
    pub fn run(&mut self, duration: Option<Duration>) -> Result<RunEnd> {
        let ticks = tick(Duration::from_millis(self.config.monitor.interval_ms.max(1)));
        let deadline = duration.map(after).unwrap_or_else(never);
        let wait_for_input = !self.readers.is_empty();

        loop {
            crossbeam::select! {
                recv(ticks) -> _ => {
                    self.poll()?;
                    if wait_for_input && self.readers_finished() {
                        // One more pass so commands from the last lines land
                        std::thread::sleep(Duration::from_millis(self.config.monitor.interval_ms.max(1)));
                        self.poll()?;
                        return Ok(RunEnd::InputClosed);
                    }
                }
                recv(deadline) -> _ => {
                    self.poll()?;
                    return Ok(RunEnd::DurationElapsed);
                }
            }
        }
    }

    fn readers_finished(&self) -> bool {
        self.readers.iter().all(|(_, handle)| handle.is_finished())
    }

    /// One monitor pass: snapshots, overruns, output change requests
    pub fn poll(&mut self) -> Result<()> {
        let restarted_at = self.restarted_at;
        let mut output_request = false;
        self.snapshots.poll(|snapshot| {
            if snapshot.reason == SnapshotReason::DebugDump {
                log_dump(snapshot);
            }
            if snapshot.quantum > restarted_at
                && (snapshot.pending_device.is_some() || snapshot.pending_buffer_size.is_some())
            {
                output_request = true;
            }
        });

        let overruns = self.atomics.overruns();
        if overruns > self.overruns_seen {
            log::warn!(
                "[MONITOR] {} quantum overrun(s), last quantum took {} us",
                overruns - self.overruns_seen,
                self.atomics.last_quantum_us.load(std::sync::atomic::Ordering::Relaxed)
            );
            self.overruns_seen = overruns;
        }

        if output_request {
            self.restart_output()?;
        }
        Ok(())
    }

    /// Stop the driver, apply the engine's pending output request, restart
    fn restart_output(&mut self) -> Result<()> {
        let Some(audio) = self.audio.take() else {
            return Ok(());
        };
        let mut engine = audio
            .stop()
            .context("Processing thread panicked, engine state lost")?;

        let (device, buffer_size) = engine.take_output_request();
        if let Some(name) = device {
            if self.config.audio.backend == AudioBackend::Headless {
                log::info!("[MONITOR] Headless driver ignores device {:?}", name);
            }
            self.config.audio.device = Some(name);
        }
        if let Some(frames) = buffer_size {
            self.config.audio.buffer_size = Some(frames);
        }

        self.restarted_at = engine.quantum();
        let audio = start_audio(engine, &self.config.audio)
            .context("Failed to restart audio driver")?;
        log::info!(
            "[MONITOR] Driver restarted: {} Hz, {} frame buffer",
            audio.sample_rate(),
            audio.buffer_size()
        );
        self.audio = Some(audio);
        Ok(())
    }

    /// Stop listeners, driver and loader; log final counters
    pub fn shutdown(mut self) {
        if let Some(udp) = self.udp.take() {
            let stats = udp.stop();
            log::info!("[CONTROL] UDP: {} accepted, {} rejected", stats.accepted, stats.rejected);
        }
        for (name, handle) in self.readers.drain(..) {
            if handle.is_finished() {
                if let Ok(stats) = handle.join() {
                    log::info!("[CONTROL] {}: {} accepted, {} rejected", name, stats.accepted, stats.rejected);
                }
            }
        }
        if let Some(audio) = self.audio.take() {
            match audio.stop() {
                Some(engine) => log::info!(
                    "Engine stopped after {} quanta ({} live units)",
                    engine.quantum(),
                    engine.units().live_count()
                ),
                None => log::error!("Processing thread panicked"),
            }
        }
        self.loader.shutdown();
        log::info!(
            "Totals: {} overruns, {} commands applied, {} dropped",
            self.atomics.overruns(),
            self.atomics.commands_applied.load(std::sync::atomic::Ordering::Relaxed),
            self.atomics.commands_dropped()
        );
    }
}

fn log_dump(snapshot: &EngineSnapshot) {
    match snapshot.to_json() {
        Ok(json) => log::info!("[DEBUG_DUMP] quantum {}\n{}", snapshot.quantum, json),
        Err(e) => log::warn!("[DEBUG_DUMP] Failed to serialize snapshot: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_engine::audio::AudioConfig;
    use std::io::Cursor;

    fn headless_config() -> HostConfig {
        let mut config = HostConfig::default();
        config.audio = AudioConfig::headless();
        config.control.udp_bind = None;
        config.control.stdin = false;
        config.engine.snapshot_interval = 4;
        config.monitor.interval_ms = 10;
        config
    }

    fn poll_until(host: &mut Host, mut done: impl FnMut(&Host) -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            host.poll().unwrap();
            if done(host) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_script_drives_engine_until_input_closes() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut host = Host::start(headless_config()).unwrap();
        host.attach_reader(
            "script",
            Cursor::new("create 1 tone \"\"\ncreate 2 stepper \"\"\nplay\ndebugDump\n"),
        )
        .unwrap();

        let end = host.run(Some(Duration::from_secs(10))).unwrap();
        assert_eq!(end, RunEnd::InputClosed);

        assert!(poll_until(&mut host, |h| h.atomics().live_units() == 2));
        assert!(poll_until(&mut host, |h| h.atomics().is_playing()));
        host.shutdown();
    }

    #[test]
    fn test_duration_ends_run_without_readers() {
        let mut host = Host::start(headless_config()).unwrap();
        let end = host.run(Some(Duration::from_millis(50))).unwrap();
        assert_eq!(end, RunEnd::DurationElapsed);
        assert!(host.atomics().quanta() > 0);
        host.shutdown();
    }

    #[test]
    fn test_buffer_size_request_restarts_driver() {
        let mut host = Host::start(headless_config()).unwrap();
        assert_eq!(host.audio().unwrap().buffer_size(), 256);

        host.attach_reader("script", Cursor::new("create 5 tone \"\"\nsetBufferSize 512\n"))
            .unwrap();
        assert!(poll_until(&mut host, |h| {
            h.audio().map(|a| a.buffer_size()) == Some(512)
        }));

        // Units survive the restart
        assert!(poll_until(&mut host, |h| h.atomics().live_units() == 1));
        host.shutdown();
    }
}
