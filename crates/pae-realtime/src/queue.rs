//! Accumulator for irregular chunk sizes

use pae_core::{AudioChunk, AudioSample, EqError, EqResult};
use std::collections::VecDeque;

/// Interleaved `f64` frames waiting for a full block
#[derive(Debug, Clone, Default)]
pub struct ChunkQueue {
    samples: VecDeque<f64>,
    /// Channel count of the queued frames (0 while empty)
    channels: usize,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk; its channel count must match what is queued
    pub fn push<S: AudioSample>(&mut self, chunk: &AudioChunk<S>) -> EqResult<()> {
        if self.samples.is_empty() {
            self.channels = chunk.channels();
        } else if chunk.channels() != self.channels {
            return Err(EqError::ChannelLayout(format!(
                "queued audio has {} channels, chunk has {}",
                self.channels,
                chunk.channels()
            )));
        }
        self.samples.extend(chunk.samples().iter().map(|s| s.to_f64()));
        Ok(())
    }

    /// Queued frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Copy of the first `frames` frames, zero-padded; the queue is unchanged
    pub fn peek_block(&self, frames: usize) -> EqResult<AudioChunk<f64>> {
        let channels = self.channels.max(1);
        let wanted = frames * channels;

        let mut block: Vec<f64> = self.samples.iter().take(wanted).copied().collect();
        block.resize(wanted, 0.0);
        AudioChunk::interleaved(block, channels)
    }

    /// Drop up to `frames` frames from the front
    pub fn discard(&mut self, frames: usize) {
        let take = (frames * self.channels.max(1)).min(self.samples.len());
        self.samples.drain(..take);
        if self.samples.is_empty() {
            self.channels = 0;
        }
    }

    /// Pop up to `frames` frames as one block, zero-padded to `frames`
    pub fn pop_block(&mut self, frames: usize) -> EqResult<AudioChunk<f64>> {
        let block = self.peek_block(frames)?;
        self.discard(frames);
        Ok(block)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.channels = 0;
    }
}
