use std::collections::VecDeque;
use std::f32::consts::TAU;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::ScopeError;

/// State change of one TTL line, positioned inside a batch.
#[derive(Clone, Copy, Debug)]
pub struct TtlEdge {
    /// TTL line index, 0..8.
    pub bit: u8,
    /// `true` for a rising edge, `false` for a falling edge.
    pub high: bool,
    /// Sample offset of the edge within the batch.
    pub sample_offset: usize,
}

/// Single batch of multi-channel samples plus any TTL edges that occurred
/// while it was acquired.
#[derive(Clone, Debug, Default)]
pub struct SignalBatch {
    pub sample_rate_hz: f32,
    /// Shape: channels x samples. All channels must carry the same count.
    pub samples: Vec<Vec<f32>>,
    pub ttl_edges: Vec<TtlEdge>,
}

impl SignalBatch {
    pub fn new(sample_rate_hz: f32, samples: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate_hz,
            samples,
            ttl_edges: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.sample_rate_hz <= 0.0 {
            return Err(ScopeError::InvalidSampleRate);
        }
        let len = self.samples_per_channel();
        for channel in &self.samples {
            if channel.len() != len {
                return Err(ScopeError::ChannelMismatch {
                    expected: len,
                    actual: channel.len(),
                });
            }
        }
        Ok(())
    }

    pub fn num_channels(&self) -> usize {
        self.samples.len()
    }

    pub fn samples_per_channel(&self) -> usize {
        self.samples.first().map(|c| c.len()).unwrap_or(0)
    }
}

/// Something that can yield signal batches on demand. `Ok(None)` means the
/// stream has ended.
pub trait SignalSource {
    fn next_batch(&mut self) -> Result<Option<SignalBatch>, ScopeError>;
}

/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<SignalBatch>,
}

impl ManualSource {
    pub fn new(batches: impl IntoIterator<Item = SignalBatch>) -> Self {
        Self {
            queue: batches.into_iter().collect(),
        }
    }
}

impl SignalSource for ManualSource {
    fn next_batch(&mut self) -> Result<Option<SignalBatch>, ScopeError> {
        Ok(self.queue.pop_front())
    }
}

/// Multi-channel sine generator with additive noise and a periodic TTL
/// pulse on line 0. Stands in for an acquisition board during development.
pub struct SyntheticSource {
    channels: usize,
    sample_rate_hz: f32,
    block_size: usize,
    amplitude_uv: f32,
    noise_uv: f32,
    pulse_period: usize,
    pulse_width: usize,
    sample_clock: u64,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(channels: usize, sample_rate_hz: f32, block_size: usize) -> Self {
        Self {
            channels,
            sample_rate_hz,
            block_size,
            amplitude_uv: 100.0,
            noise_uv: 5.0,
            pulse_period: (sample_rate_hz * 0.5) as usize,
            pulse_width: (sample_rate_hz * 0.05) as usize,
            sample_clock: 0,
            rng: StdRng::seed_from_u64(0x5ca1ab1e),
        }
    }

    pub fn with_amplitude(mut self, amplitude_uv: f32, noise_uv: f32) -> Self {
        self.amplitude_uv = amplitude_uv;
        self.noise_uv = noise_uv;
        self
    }

    fn ttl_edges_for_block(&self, start: u64, len: usize) -> Vec<TtlEdge> {
        if self.pulse_period == 0 {
            return Vec::new();
        }
        let mut edges = Vec::new();
        for offset in 0..len {
            let t = (start + offset as u64) as usize % self.pulse_period;
            if t == 0 {
                edges.push(TtlEdge {
                    bit: 0,
                    high: true,
                    sample_offset: offset,
                });
            } else if t == self.pulse_width {
                edges.push(TtlEdge {
                    bit: 0,
                    high: false,
                    sample_offset: offset,
                });
            }
        }
        edges
    }
}

impl SignalSource for SyntheticSource {
    fn next_batch(&mut self) -> Result<Option<SignalBatch>, ScopeError> {
        let start = self.sample_clock;
        let mut samples = Vec::with_capacity(self.channels);
        for chan in 0..self.channels {
            // Each channel gets its own frequency so traces are telling apart.
            let freq = 4.0 + chan as f32 * 1.5;
            let mut channel = Vec::with_capacity(self.block_size);
            for i in 0..self.block_size {
                let t = (start + i as u64) as f32 / self.sample_rate_hz;
                let noise = self.rng.gen_range(-1.0..1.0) * self.noise_uv;
                channel.push((TAU * freq * t).sin() * self.amplitude_uv + noise);
            }
            samples.push(channel);
        }
        let mut batch = SignalBatch::new(self.sample_rate_hz, samples);
        batch.ttl_edges = self.ttl_edges_for_block(start, self.block_size);
        self.sample_clock += self.block_size as u64;
        Ok(Some(batch))
    }
}
