//! Resource handles
//!
//! A [`ResourceHandle`] is a cheap, clonable reference to decoded media. It
//! can only be built from media with a non-zero length, so anything holding
//! a handle may divide by its length.

use std::path::{Path, PathBuf};

use basedrop::Shared;

use crate::engine::gc_handle;
use crate::error::{ResourceError, ResourceResult};
use crate::types::{Frames, StereoSample};

/// Decoded media as produced by a [`super::ResourceStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedMedia {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub frames: Vec<StereoSample>,
}

impl LoadedMedia {
    pub fn new(path: impl Into<PathBuf>, sample_rate: u32, frames: Vec<StereoSample>) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            frames,
        }
    }
}

/// Authoritative reference to loaded media with a known, non-zero length
#[derive(Clone)]
pub struct ResourceHandle {
    media: Shared<LoadedMedia>,
}

impl ResourceHandle {
    /// Wrap loaded media; zero-length media is rejected
    pub fn new(media: LoadedMedia) -> ResourceResult<Self> {
        if media.frames.is_empty() {
            return Err(ResourceError::ZeroLength(media.path));
        }
        Ok(Self {
            media: Shared::new(&gc_handle(), media),
        })
    }

    /// Length in frames (always > 0)
    #[inline]
    pub fn length_frames(&self) -> Frames {
        self.media.frames.len() as Frames
    }

    /// Frame at `index`, wrapped into the resource
    #[inline]
    pub fn frame(&self, index: Frames) -> StereoSample {
        let wrapped = index.rem_euclid(self.length_frames()) as usize;
        self.media.frames[wrapped]
    }

    pub fn sample_rate(&self) -> u32 {
        self.media.sample_rate
    }

    pub fn path(&self) -> &Path {
        &self.media.path
    }

    /// Position as a fraction of this resource's length
    #[inline]
    pub fn normalized(&self, position: Frames) -> f64 {
        // Length is non-zero by construction
        position.rem_euclid(self.length_frames()) as f64 / self.length_frames() as f64
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("path", &self.media.path)
            .field("length_frames", &self.length_frames())
            .finish()
    }
}

/// Normalize a position against a length that may not be known yet
///
/// Returns `None` instead of dividing by a zero or negative length.
#[inline]
pub fn normalized_position(position: Frames, length: Frames) -> Option<f64> {
    if length <= 0 {
        return None;
    }
    Some(position.rem_euclid(length) as f64 / length as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(len: usize) -> LoadedMedia {
        LoadedMedia::new("test.wav", 48000, vec![StereoSample::mono(0.5); len])
    }

    #[test]
    fn test_zero_length_is_rejected() {
        assert!(matches!(
            ResourceHandle::new(media(0)),
            Err(ResourceError::ZeroLength(_))
        ));
    }

    #[test]
    fn test_frame_wraps() {
        let mut m = media(4);
        m.frames[1] = StereoSample::new(1.0, -1.0);
        let handle = ResourceHandle::new(m).unwrap();
        assert_eq!(handle.length_frames(), 4);
        assert_eq!(handle.frame(5), StereoSample::new(1.0, -1.0));
        assert_eq!(handle.frame(-3), StereoSample::new(1.0, -1.0));
    }

    #[test]
    fn test_normalized_position_guards_zero() {
        assert_eq!(normalized_position(100, 0), None);
        assert_eq!(normalized_position(100, -5), None);
        assert_eq!(normalized_position(250, 1000), Some(0.25));
        assert_eq!(normalized_position(1250, 1000), Some(0.25));

        let handle = ResourceHandle::new(media(1000)).unwrap();
        assert_eq!(handle.normalized(250), 0.25);
    }
}
