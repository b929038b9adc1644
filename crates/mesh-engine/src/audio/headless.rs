//! Headless driver: a dedicated processing thread paced by the wall clock
//!
//! Runs the engine exactly like a device callback would (one fixed-size
//! quantum per period) but discards the output. Used by CI, tests and hosts
//! without an output device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::error::AudioResult;
use crate::engine::VoiceEngine;
use crate::types::StereoBuffer;

/// Periods the thread may fall behind before it stops trying to catch up
const MAX_LAG_PERIODS: u32 = 4;

/// Handle to a running headless processing thread
///
/// Dropping it stops the thread; [`stop`](Self::stop) also hands the engine
/// back so it can be restarted with different settings.
pub struct HeadlessDriver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<VoiceEngine>>,
    buffer_size: usize,
    sample_rate: u32,
}

impl HeadlessDriver {
    /// Move `engine` onto a new `mesh-processing` thread
    pub fn start(mut engine: VoiceEngine, buffer_size: usize) -> AudioResult<Self> {
        let sample_rate = engine.config().sample_rate;
        let period = Duration::from_secs_f64(buffer_size as f64 / sample_rate as f64);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("mesh-processing".to_string())
            .spawn(move || {
                log::info!(
                    "[HEADLESS] Processing thread started ({} frames, {:.2}ms period)",
                    buffer_size,
                    period.as_secs_f64() * 1000.0
                );
                let mut out = StereoBuffer::silence(buffer_size);
                let mut deadline = Instant::now();

                while thread_running.load(Ordering::Acquire) {
                    engine.process(&mut out);

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else if now - deadline > period * MAX_LAG_PERIODS {
                        // Too far behind: drop the backlog instead of bursting
                        deadline = now;
                    }
                }

                log::info!("[HEADLESS] Processing thread stopped");
                engine
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
            buffer_size,
            sample_rate,
        })
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop the thread and take the engine back
    pub fn stop(mut self) -> Option<VoiceEngine> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<VoiceEngine> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(engine) => Some(engine),
            Err(_) => {
                log::error!("[HEADLESS] Processing thread panicked");
                None
            }
        }
    }
}

impl Drop for HeadlessDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{Command, TransportCommand};

    #[test]
    fn test_runs_quanta_in_real_time() {
        let (engine, handles) = VoiceEngine::new(EngineConfig::default());
        let mut sender = handles.commands.sender().unwrap();
        sender
            .enqueue(Command::Transport(TransportCommand::Play))
            .unwrap();

        let driver = HeadlessDriver::start(engine, 256).unwrap();
        thread::sleep(Duration::from_millis(100));
        let engine = driver.stop().unwrap();

        assert!(handles.atomics.quanta() > 0);
        assert!(engine.transport().is_playing());
        assert_eq!(
            engine.transport().position(),
            engine.quantum() as i64 * 256
        );
    }

    #[test]
    fn test_restart_keeps_state() {
        let (engine, _handles) = VoiceEngine::new(EngineConfig::default());
        let driver = HeadlessDriver::start(engine, 128).unwrap();
        thread::sleep(Duration::from_millis(20));
        let engine = driver.stop().unwrap();
        let before = engine.quantum();

        let driver = HeadlessDriver::start(engine, 512).unwrap();
        assert_eq!(driver.buffer_size(), 512);
        thread::sleep(Duration::from_millis(20));
        let engine = driver.stop().unwrap();
        assert!(engine.quantum() > before);
    }
}
