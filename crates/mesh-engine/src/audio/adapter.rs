//! Adapts device callbacks of any length to fixed engine quanta
//!
//! Device callbacks rarely ask for exactly one quantum. The adapter renders
//! whole quanta into a buffer and copies out as many frames as each callback
//! wants, carrying the remainder into the next callback.

use crate::engine::VoiceEngine;
use crate::types::{StereoBuffer, MAX_QUANTUM_FRAMES};

pub struct QuantumAdapter {
    buffer: StereoBuffer,
    /// Frames of `buffer` already handed out
    cursor: usize,
}

impl QuantumAdapter {
    pub fn new(quantum: usize) -> Self {
        let quantum = quantum.clamp(1, MAX_QUANTUM_FRAMES);
        Self {
            buffer: StereoBuffer::silence(quantum),
            // Empty: the first callback renders immediately
            cursor: quantum,
        }
    }

    pub fn quantum(&self) -> usize {
        self.buffer.len()
    }

    /// Fill an interleaved device buffer, running the engine as needed
    ///
    /// Channels beyond the first two get silence; a mono device gets the left
    /// channel.
    pub fn fill(&mut self, engine: &mut VoiceEngine, data: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        if channels == 2 {
            self.fill_stereo(engine, data);
            return;
        }
        for frame in data.chunks_mut(channels) {
            self.refill(engine);
            let sample = self.buffer[self.cursor];
            self.cursor += 1;

            frame[0] = sample.left;
            if channels > 1 {
                frame[1] = sample.right;
            }
            for ch in frame.iter_mut().skip(2) {
                *ch = 0.0;
            }
        }
    }

    /// Stereo devices take whole runs straight from the interleaved view
    fn fill_stereo(&mut self, engine: &mut VoiceEngine, data: &mut [f32]) {
        let mut offset = 0;
        while offset + 1 < data.len() {
            self.refill(engine);
            let frames = ((data.len() - offset) / 2).min(self.buffer.len() - self.cursor);
            let src = &self.buffer.as_interleaved()[self.cursor * 2..(self.cursor + frames) * 2];
            data[offset..offset + frames * 2].copy_from_slice(src);
            self.cursor += frames;
            offset += frames * 2;
        }
        data[offset..].fill(0.0);
    }

    fn refill(&mut self, engine: &mut VoiceEngine) {
        if self.cursor >= self.buffer.len() {
            engine.process(&mut self.buffer);
            self.cursor = 0;
        }
    }
}
