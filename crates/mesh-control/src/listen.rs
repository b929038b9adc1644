//! Listener threads feeding a [`Dispatcher`]
//!
//! - [`UdpListener`]: one control line (or several, newline-separated) per datagram
//! - [`spawn_line_reader`]: any `BufRead`, typically stdin or a script file
//!
//! Each listener owns its dispatcher, and so its own producer lane.

use std::io::{self, BufRead};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::dispatch::{DispatchStats, Dispatcher};
use crate::ControlError;

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 8192;

/// How often the UDP thread checks for shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn handle(dispatcher: &mut Dispatcher, source: &str, line: &str) {
    match dispatcher.handle_line(line) {
        Ok(_) => {}
        Err(err @ ControlError::Enqueue(_)) => {
            log::warn!("[CONTROL] {} dropped {:?}: {}", source, line.trim(), err)
        }
        Err(err) => log::info!("[CONTROL] {} rejected {:?}: {}", source, line.trim(), err),
    }
}

/// UDP control listener
pub struct UdpListener {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<DispatchStats>>,
}

impl UdpListener {
    /// Bind `addr` and start the listener thread
    pub fn bind(addr: &str, mut dispatcher: Dispatcher) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();

        let thread = thread::Builder::new()
            .name("mesh-control-udp".into())
            .spawn(move || {
                let mut buf = vec![0u8; MAX_DATAGRAM];
                while !shutdown_flag.load(Ordering::Relaxed) {
                    let (len, peer) = match socket.recv_from(&mut buf) {
                        Ok(received) => received,
                        Err(e)
                            if matches!(
                                e.kind(),
                                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                            ) =>
                        {
                            continue
                        }
                        Err(e) => {
                            log::error!("[CONTROL] UDP receive failed: {}", e);
                            break;
                        }
                    };
                    match std::str::from_utf8(&buf[..len]) {
                        Ok(text) => {
                            let source = peer.to_string();
                            for line in text.lines() {
                                handle(&mut dispatcher, &source, line);
                            }
                        }
                        Err(_) => log::info!("[CONTROL] {} sent a non-UTF-8 datagram", peer),
                    }
                }
                dispatcher.stats()
            })?;

        log::info!("[CONTROL] Listening for UDP control on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop the thread and return its counters
    pub fn stop(mut self) -> DispatchStats {
        self.shutdown_thread()
    }

    fn shutdown_thread(&mut self) -> DispatchStats {
        self.shutdown.store(true, Ordering::Relaxed);
        self.thread
            .take()
            .and_then(|thread| thread.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for UdpListener {
    fn drop(&mut self) {
        self.shutdown_thread();
    }
}

/// Feed every line of `reader` to `dispatcher` on a new thread
///
/// The thread ends at end of input and returns its counters.
pub fn spawn_line_reader<R>(
    name: &str,
    reader: R,
    mut dispatcher: Dispatcher,
) -> io::Result<JoinHandle<DispatchStats>>
where
    R: BufRead + Send + 'static,
{
    let source = name.to_string();
    thread::Builder::new()
        .name(format!("mesh-control-{}", name))
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => handle(&mut dispatcher, &source, &line),
                    Err(e) => {
                        log::error!("[CONTROL] {} read failed: {}", source, e);
                        break;
                    }
                }
            }
            log::debug!("[CONTROL] {} closed", source);
            dispatcher.stats()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_engine::engine::{command_channel, ChannelConfig, CommandKind};
    use mesh_engine::unit::UnitRegistry;
    use std::io::Cursor;
    use std::time::Instant;

    fn channel() -> (mesh_engine::engine::CommandHub, mesh_engine::engine::CommandReceiver) {
        command_channel(ChannelConfig {
            capacity: 32,
            max_per_drain: 64,
            coalesce_slots: 8,
            max_producers: 4,
        })
    }

    #[test]
    fn test_line_reader_runs_to_end_of_input() {
        let (hub, mut receiver) = channel();
        let dispatcher = Dispatcher::new(UnitRegistry::with_builtins(), hub.sender().unwrap(), 48000);
        let script = Cursor::new("play\nbogus 1\n\nseek 480\n");

        let stats = spawn_line_reader("script", script, dispatcher)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(stats, DispatchStats { accepted: 2, rejected: 1 });

        let kinds: Vec<_> = receiver.drain().map(|env| env.command.kind()).collect();
        assert_eq!(kinds, vec![CommandKind::Transport, CommandKind::Transport]);
    }

    #[test]
    fn test_udp_datagrams_reach_the_channel() {
        let (hub, mut receiver) = channel();
        let dispatcher = Dispatcher::new(UnitRegistry::with_builtins(), hub.sender().unwrap(), 48000);
        let listener = UdpListener::bind("127.0.0.1:0", dispatcher).unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .send_to(b"/play\n/setLooping 1", listener.local_addr())
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut received = 0;
        while received < 2 && Instant::now() < deadline {
            received += receiver.drain().count();
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(received, 2);
        assert_eq!(listener.stop().accepted, 2);
    }
}
