//! Common types for the Mesh voice engine
//!
//! Stereo sample/buffer types shared by every unit, plus the small value
//! types that travel through the command channel (unit ids, parameter names
//! and values). Everything that crosses the channel is `Copy` or explicitly
//! GC-managed so the processing thread never frees heap memory itself.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::{Index, IndexMut};

/// Default sample rate (48kHz - standard professional audio rate)
pub const SAMPLE_RATE: u32 = 48000;

/// Default processing quantum in frames
pub const DEFAULT_QUANTUM_FRAMES: usize = 256;

/// Maximum quantum size to pre-allocate for real-time safety
/// Covers all common device configurations (64 .. 4096)
pub const MAX_QUANTUM_FRAMES: usize = 8192;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Frame position on the transport timeline
pub type Frames = i64;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Apply an equal-power pan (-1.0 = left, 1.0 = right) and gain
    #[inline]
    pub fn panned(&self, pan: Sample, gain: Sample) -> Self {
        let angle = (pan.clamp(-1.0, 1.0) + 1.0) * std::f32::consts::FRAC_PI_4;
        Self {
            left: self.left * angle.cos() * gain,
            right: self.right * angle.sin() * gain,
        }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// Buffers used on the processing thread are created once with
/// [`MAX_QUANTUM_FRAMES`] capacity and then resized in place with
/// [`StereoBuffer::set_len_from_capacity`], which never allocates.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a new buffer with the specified capacity (in stereo samples)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills any newly exposed elements with silence.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Get a zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of a live unit
///
/// Always non-zero: id 0 is reserved for the engine itself (global settings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(NonZeroU32);

impl UnitId {
    /// Create a unit id, returning `None` for the reserved id 0
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Get the raw numeric id
    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target of an addressed command: the engine (id 0) or a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Engine,
    Unit(UnitId),
}

impl Target {
    /// Resolve a raw protocol id
    pub fn from_raw(raw: u32) -> Self {
        match UnitId::new(raw) {
            Some(id) => Target::Unit(id),
            None => Target::Engine,
        }
    }
}

/// Maximum length of a parameter name in bytes
pub const MAX_PARAM_NAME: usize = 32;

/// A parameter name stored inline (no heap allocation)
///
/// Update commands are the highest-frequency traffic through the channel,
/// so they must be plain `Copy` values. The FNV-1a `key` is computed once at
/// construction and used for coalescing and parameter lookup.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ParamName {
    bytes: [u8; MAX_PARAM_NAME],
    len: u8,
    key: u64,
}

impl ParamName {
    /// Create a parameter name, returning `None` if empty or too long
    pub fn new(name: &str) -> Option<Self> {
        if name.is_empty() || name.len() > MAX_PARAM_NAME {
            return None;
        }
        let mut bytes = [0u8; MAX_PARAM_NAME];
        bytes[..name.len()].copy_from_slice(name.as_bytes());
        Some(Self {
            bytes,
            len: name.len() as u8,
            key: param_key(name),
        })
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        // Constructed from a &str, so always valid UTF-8
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    /// Hash key used for coalescing and lookup
    #[inline]
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Name bytes packed into words (for lock-free coalescing slots)
    pub(crate) fn to_words(&self) -> ([u64; MAX_PARAM_NAME / 8], u8) {
        let mut words = [0u64; MAX_PARAM_NAME / 8];
        for (word, chunk) in words.iter_mut().zip(self.bytes.chunks_exact(8)) {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            *word = u64::from_le_bytes(raw);
        }
        (words, self.len)
    }

    /// Unpack from [`ParamName::to_words`]
    pub(crate) fn from_words(words: [u64; MAX_PARAM_NAME / 8], len: u8, key: u64) -> Self {
        let mut bytes = [0u8; MAX_PARAM_NAME];
        for (chunk, word) in bytes.chunks_exact_mut(8).zip(words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Self {
            bytes,
            len: len.min(MAX_PARAM_NAME as u8),
            key,
        }
    }
}

impl fmt::Debug for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParamName({:?})", self.as_str())
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FNV-1a hash of a parameter name
pub const fn param_key(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// A parameter value as sent by controllers (`value: float|int`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
}

impl ParamValue {
    /// Get the value as f64
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Float(v) => v,
            ParamValue::Int(v) => v as f64,
        }
    }

    /// Get the value as f32
    #[inline]
    pub fn as_f32(self) -> f32 {
        self.as_f64() as f32
    }

    /// Interpret the value as a switch (non-zero = on)
    #[inline]
    pub fn as_bool(self) -> bool {
        self.as_f64() != 0.0
    }

    /// Pack into 64 bits (for lock-free coalescing slots)
    pub(crate) fn to_bits(self) -> (u64, bool) {
        match self {
            ParamValue::Float(v) => (v.to_bits(), false),
            ParamValue::Int(v) => (v as u64, true),
        }
    }

    /// Unpack from [`ParamValue::to_bits`]
    pub(crate) fn from_bits(bits: u64, is_int: bool) -> Self {
        if is_int {
            ParamValue::Int(bits as i64)
        } else {
            ParamValue::Float(f64::from_bits(bits))
        }
    }
}

/// Lifecycle state of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub enum UnitState {
    #[default]
    Created,
    Prepared,
    Playing,
    Paused,
    Stopping,
    Destroyed,
}

impl UnitState {
    /// Whether the unit still accepts commands
    pub fn is_addressable(self) -> bool {
        !matches!(self, UnitState::Stopping | UnitState::Destroyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
    }

    #[test]
    fn test_center_pan_is_equal_power() {
        let s = StereoSample::mono(1.0).panned(0.0, 1.0);
        assert!((s.left - s.right).abs() < 1e-6);
        assert!((s.left - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_set_len_from_capacity_does_not_grow_capacity() {
        let mut buffer = StereoBuffer::silence(MAX_QUANTUM_FRAMES);
        let capacity = buffer.as_slice().len();
        buffer.set_len_from_capacity(64);
        assert_eq!(buffer.len(), 64);
        buffer.set_len_from_capacity(capacity);
        assert_eq!(buffer.len(), capacity);
    }

    #[test]
    fn test_unit_id_rejects_zero() {
        assert!(UnitId::new(0).is_none());
        assert_eq!(UnitId::new(1001).map(UnitId::get), Some(1001));
        assert_eq!(Target::from_raw(0), Target::Engine);
    }

    #[test]
    fn test_param_name_limits() {
        assert!(ParamName::new("").is_none());
        assert!(ParamName::new(&"x".repeat(MAX_PARAM_NAME + 1)).is_none());

        let pan = ParamName::new("pan").unwrap();
        assert_eq!(pan.as_str(), "pan");
        assert_eq!(pan.key(), param_key("pan"));
        assert_ne!(pan.key(), param_key("gain"));
    }

    #[test]
    fn test_param_value_bits_roundtrip_preserves_kind() {
        let (bits, is_int) = ParamValue::Int(-3).to_bits();
        assert_eq!(ParamValue::from_bits(bits, is_int), ParamValue::Int(-3));
        let (bits, is_int) = ParamValue::Float(0.25).to_bits();
        assert_eq!(ParamValue::from_bits(bits, is_int), ParamValue::Float(0.25));
    }
}
