//! Mesh host - runs the playback engine behind a text control surface
//!
//! Starts the engine on the configured driver, a resource loader thread, and
//! control listeners (UDP and stdin), then watches engine snapshots.
//!
//! ## Command line flags
//!
//! - `--config <path>`: config file (default `~/.config/mesh/host.yaml`)
//! - `--headless` / `--device [name]`: driver selection
//! - `--buffer <frames>`: driver buffer size
//! - `--udp <addr>` / `--no-udp`: UDP control listener
//! - `--no-stdin`: ignore stdin
//! - `--script <path>`: run control lines from a file
//! - `--duration <seconds>`: exit after this long
//! - `--list-devices`: print output devices and exit

mod config;
mod host;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use config::HostConfig;
use host::Host;
use mesh_engine::audio::AudioBackend;
use mesh_engine::config::{load_config, read_config};

const USAGE: &str = "usage: mesh-host [--config PATH] [--headless | --device [NAME]] [--buffer FRAMES]
                 [--udp ADDR | --no-udp] [--no-stdin] [--script PATH]
                 [--duration SECONDS] [--list-devices]";

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    backend: Option<AudioBackend>,
    device: Option<String>,
    buffer: Option<u32>,
    udp: Option<String>,
    no_udp: bool,
    no_stdin: bool,
    script: Option<PathBuf>,
    duration: Option<f64>,
    list_devices: bool,
    help: bool,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter().peekable();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{} needs a value", flag))
            };
            match arg.as_str() {
                "--config" => parsed.config = Some(value("--config")?.into()),
                "--headless" => parsed.backend = Some(AudioBackend::Headless),
                "--device" => {
                    parsed.backend = Some(AudioBackend::Device);
                    if args.peek().is_some_and(|next| !next.starts_with("--")) {
                        parsed.device = args.next();
                    }
                }
                "--buffer" => {
                    let frames = value("--buffer")?;
                    parsed.buffer = Some(
                        frames
                            .parse()
                            .with_context(|| format!("Invalid buffer size {:?}", frames))?,
                    );
                }
                "--udp" => parsed.udp = Some(value("--udp")?),
                "--no-udp" => parsed.no_udp = true,
                "--no-stdin" => parsed.no_stdin = true,
                "--script" => parsed.script = Some(value("--script")?.into()),
                "--duration" => {
                    let secs = value("--duration")?;
                    let secs: f64 = secs
                        .parse()
                        .ok()
                        .filter(|s: &f64| s.is_finite() && *s >= 0.0)
                        .with_context(|| format!("Invalid duration {:?}", secs))?;
                    parsed.duration = Some(secs);
                }
                "--list-devices" => parsed.list_devices = true,
                "-h" | "--help" => parsed.help = true,
                other => bail!("Unknown argument {:?}\n{}", other, USAGE),
            }
        }
        Ok(parsed)
    }

    /// Overlay command line choices on the loaded config
    fn apply(&self, config: &mut HostConfig) {
        if let Some(backend) = self.backend {
            config.audio.backend = backend;
        }
        if self.device.is_some() {
            config.audio.device = self.device.clone();
        }
        if self.buffer.is_some() {
            config.audio.buffer_size = self.buffer;
        }
        if self.udp.is_some() {
            config.control.udp_bind = self.udp.clone();
        }
        if self.no_udp {
            config.control.udp_bind = None;
        }
        if self.no_stdin {
            config.control.stdin = false;
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }
    if args.list_devices {
        list_devices();
        return Ok(());
    }

    let mut config: HostConfig = match &args.config {
        // An explicitly named file must load
        Some(path) => read_config(path)?,
        None => load_config(&config::default_config_path()),
    };
    args.apply(&mut config);

    log::info!("mesh-host starting up");
    let mut host = Host::start(config.clone())?;

    if let Some(path) = &args.script {
        let file = File::open(path).with_context(|| format!("Failed to open script {:?}", path))?;
        host.attach_reader("script", BufReader::new(file))?;
    }
    if config.control.stdin {
        host.attach_reader("stdin", BufReader::new(std::io::stdin()))?;
    }

    let end = host.run(args.duration.map(Duration::from_secs_f64))?;
    log::info!("Shutting down ({:?})", end);
    host.shutdown();
    Ok(())
}

#[cfg(feature = "device-output")]
fn list_devices() {
    let names = mesh_engine::audio::output_device_names();
    if names.is_empty() {
        println!("No output devices found");
    }
    for name in names {
        println!("{}", name);
    }
}

#[cfg(not(feature = "device-output"))]
fn list_devices() {
    println!("Built without device output; only the headless driver is available");
}
