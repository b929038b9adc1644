//! Resource stores: where media actually comes from
//!
//! - [`WavStore`]: decodes WAV files from disk with `hound`
//! - [`MemoryStore`]: in-memory media, for tests and generated material

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::handle::LoadedMedia;
use crate::error::{ResourceError, ResourceResult};
use crate::types::StereoSample;

/// Blocking media source used by the loader thread
pub trait ResourceStore: Send + Sync {
    /// Load and decode the media at `path`
    fn load(&self, path: &Path) -> ResourceResult<LoadedMedia>;
}

// ─────────────────────────────────────────────────────────────────────────────
// WAV files
// ─────────────────────────────────────────────────────────────────────────────

/// Loads mono or stereo WAV files (16/24/32-bit integer or 32-bit float)
#[derive(Debug, Clone, Default)]
pub struct WavStore {
    /// Base directory for relative paths
    root: Option<PathBuf>,
    /// Engine rate; files at other rates are played unconverted (with a warning)
    sample_rate: Option<u32>,
}

impl WavStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative paths against `root`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Warn when a file's rate differs from the engine rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ResourceStore for WavStore {
    fn load(&self, path: &Path) -> ResourceResult<LoadedMedia> {
        let full = self.resolve(path);
        let io_err = |e: hound::Error| match e {
            hound::Error::IoError(io) => ResourceError::Io {
                path: full.clone(),
                reason: io.to_string(),
            },
            other => ResourceError::Format {
                path: full.clone(),
                reason: other.to_string(),
            },
        };

        let mut reader = hound::WavReader::open(&full).map_err(io_err)?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 || channels > 2 {
            return Err(ResourceError::Format {
                path: full.clone(),
                reason: format!("{} channels (mono or stereo only)", channels),
            });
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(io_err)?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .map_err(io_err)?
            }
        };

        let frames: Vec<StereoSample> = if channels == 1 {
            samples.iter().map(|&s| StereoSample::mono(s)).collect()
        } else {
            samples
                .chunks_exact(2)
                .map(|pair| StereoSample::new(pair[0], pair[1]))
                .collect()
        };

        if let Some(rate) = self.sample_rate {
            if rate != spec.sample_rate {
                log::warn!(
                    "{:?} is {} Hz, engine runs at {} Hz; playing unconverted",
                    full,
                    spec.sample_rate,
                    rate
                );
            }
        }

        Ok(LoadedMedia::new(full, spec.sample_rate, frames))
    }
}

/// Write stereo frames as a 32-bit float WAV (fixtures, renders)
pub fn write_wav(path: &Path, sample_rate: u32, frames: &[StereoSample]) -> ResourceResult<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let to_err = |e: hound::Error| ResourceError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(to_err)?;
    for frame in frames {
        writer.write_sample(frame.left).map_err(to_err)?;
        writer.write_sample(frame.right).map_err(to_err)?;
    }
    writer.finalize().map_err(to_err)
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Media kept in memory, keyed by path
#[derive(Debug)]
pub struct MemoryStore {
    sample_rate: u32,
    media: Mutex<HashMap<PathBuf, Vec<StereoSample>>>,
}

impl MemoryStore {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            media: Mutex::new(HashMap::new()),
        }
    }

    /// Add or replace media at `path`
    pub fn insert(&self, path: impl Into<PathBuf>, frames: Vec<StereoSample>) {
        if let Ok(mut media) = self.media.lock() {
            media.insert(path.into(), frames);
        }
    }

    pub fn remove(&self, path: &Path) {
        if let Ok(mut media) = self.media.lock() {
            media.remove(path);
        }
    }
}

impl ResourceStore for MemoryStore {
    fn load(&self, path: &Path) -> ResourceResult<LoadedMedia> {
        let media = self.media.lock().map_err(|_| ResourceError::Io {
            path: path.to_path_buf(),
            reason: "store lock poisoned".to_string(),
        })?;
        match media.get(path) {
            Some(frames) => Ok(LoadedMedia::new(path, self.sample_rate, frames.clone())),
            None => Err(ResourceError::Io {
                path: path.to_path_buf(),
                reason: "not found".to_string(),
            }),
        }
    }
}
