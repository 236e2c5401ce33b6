use std::sync::Arc;

use log::{debug, info};
use ndarray::Array2;
use parking_lot::Mutex;

use crate::error::ScopeError;
use crate::source::SignalBatch;

/// Number of TTL lines folded into the synthetic event channel.
pub const EVENT_BITS: u8 = 8;

/// Full-rate circular sample store, written by the acquisition thread and
/// read by the display thread. Rows are channels; the last row carries the
/// TTL bitmask state latched per sample.
pub struct DisplayBuffer {
    data: Array2<f32>,
    write_index: Vec<usize>,
    num_channels: usize,
    num_samples: usize,
    sample_rate_hz: f32,
    ttl_state: u8,
    trigger_source: Option<u8>,
    latest_trigger: Option<usize>,
}

/// Handle shared between the producer and the display canvas. The mutex
/// guards index bookkeeping and sample data together; both sides hold it
/// only for the duration of one append or one aggregation pass.
pub type SharedDisplayBuffer = Arc<Mutex<DisplayBuffer>>;

impl DisplayBuffer {
    pub fn new() -> Self {
        Self {
            data: Array2::zeros((0, 0)),
            write_index: Vec::new(),
            num_channels: 0,
            num_samples: 0,
            sample_rate_hz: 0.0,
            ttl_state: 0,
            trigger_source: None,
            latest_trigger: None,
        }
    }

    pub fn new_shared() -> SharedDisplayBuffer {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Reallocate for a new topology. Clears all contents and cursors.
    /// Degenerate configurations leave the buffer untouched and report
    /// failure; the surrounding UI retries on the next settings change.
    pub fn resize(&mut self, num_channels: usize, seconds: f32, sample_rate_hz: f32) -> bool {
        let num_samples = (sample_rate_hz * seconds) as usize;
        if num_channels == 0 || num_samples == 0 || sample_rate_hz <= 0.0 {
            debug!(
                "ignoring degenerate display buffer resize: {} channels, {} samples",
                num_channels, num_samples
            );
            return false;
        }
        info!(
            "resizing display buffer: {} channels + events, {} samples at {} Hz",
            num_channels, num_samples, sample_rate_hz
        );
        self.data = Array2::zeros((num_channels + 1, num_samples));
        self.write_index = vec![0; num_channels + 1];
        self.num_channels = num_channels;
        self.num_samples = num_samples;
        self.sample_rate_hz = sample_rate_hz;
        self.ttl_state = 0;
        self.latest_trigger = None;
        true
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_index.iter_mut().for_each(|i| *i = 0);
        self.ttl_state = 0;
        self.latest_trigger = None;
    }

    pub fn is_allocated(&self) -> bool {
        self.num_samples > 0
    }

    /// Data channels, excluding the event row.
    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Row index of the synthetic event channel.
    pub fn event_row(&self) -> usize {
        self.num_channels
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }

    /// Producer-side write cursor for one row.
    pub fn write_index(&self, row: usize) -> usize {
        self.write_index.get(row).copied().unwrap_or(0)
    }

    /// Consumer-side random access by absolute offset, wrapping.
    pub fn read(&self, row: usize, index: usize) -> f32 {
        self.data[(row, index % self.num_samples)]
    }

    /// Append one batch: every data channel plus the event row advance by
    /// the batch length, wrapping at the buffer end. TTL edges latch the
    /// bitmask state from their offset onward, and a rising edge on the
    /// configured trigger line records the trigger position.
    pub fn push_batch(&mut self, batch: &SignalBatch) -> Result<(), ScopeError> {
        batch.validate()?;
        if !self.is_allocated() {
            return Err(ScopeError::BufferUnallocated);
        }
        if batch.sample_rate_hz != self.sample_rate_hz {
            return Err(ScopeError::SampleRateMismatch {
                expected: self.sample_rate_hz,
                actual: batch.sample_rate_hz,
            });
        }
        if batch.num_channels() != self.num_channels {
            return Err(ScopeError::ChannelMismatch {
                expected: self.num_channels,
                actual: batch.num_channels(),
            });
        }

        for (chan, samples) in batch.samples.iter().enumerate() {
            let start = self.write_index[chan];
            for (i, &sample) in samples.iter().enumerate() {
                let idx = (start + i) % self.num_samples;
                self.data[(chan, idx)] = sample;
            }
            self.write_index[chan] = (start + samples.len()) % self.num_samples;
        }

        self.push_event_row(batch);
        Ok(())
    }

    fn push_event_row(&mut self, batch: &SignalBatch) {
        let row = self.event_row();
        let len = batch.samples_per_channel();
        let start = self.write_index[row];
        let mut edges = batch.ttl_edges.clone();
        edges.sort_by_key(|e| e.sample_offset);
        let mut next_edge = 0;

        for i in 0..len {
            while next_edge < edges.len() && edges[next_edge].sample_offset == i {
                let edge = edges[next_edge];
                if edge.bit < EVENT_BITS {
                    if edge.high {
                        self.ttl_state |= 1 << edge.bit;
                        if self.trigger_source == Some(edge.bit) {
                            self.latest_trigger = Some((start + i) % self.num_samples);
                        }
                    } else {
                        self.ttl_state &= !(1 << edge.bit);
                    }
                }
                next_edge += 1;
            }
            let idx = (start + i) % self.num_samples;
            self.data[(row, idx)] = f32::from(self.ttl_state);
        }
        self.write_index[row] = (start + len) % self.num_samples;
    }

    /// Select which TTL line arms the display trigger. `None` returns the
    /// display to free-running wraparound.
    pub fn set_trigger_source(&mut self, bit: Option<u8>) {
        if self.trigger_source != bit {
            info!("trigger source set to {:?}", bit);
        }
        self.trigger_source = bit;
        self.latest_trigger = None;
    }

    pub fn trigger_source(&self) -> Option<u8> {
        self.trigger_source
    }

    /// Ring position of the most recent trigger edge, if one has fired
    /// since the last acknowledgement.
    pub fn latest_trigger(&self) -> Option<usize> {
        self.latest_trigger
    }

    pub fn acknowledge_trigger(&mut self) {
        self.latest_trigger = None;
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::TtlEdge;

    fn batch(rate: f32, channels: usize, samples: &[f32]) -> SignalBatch {
        SignalBatch::new(rate, vec![samples.to_vec(); channels])
    }

    #[test]
    fn degenerate_resize_is_a_noop() {
        let mut buffer = DisplayBuffer::new();
        assert!(!buffer.resize(0, 10.0, 1000.0));
        assert!(!buffer.resize(4, 0.0, 1000.0));
        assert!(!buffer.resize(4, 10.0, 0.0));
        assert!(!buffer.is_allocated());
        assert!(buffer
            .push_batch(&batch(1000.0, 4, &[0.0]))
            .is_err());
    }

    #[test]
    fn writes_wrap_and_advance_the_cursor() {
        let mut buffer = DisplayBuffer::new();
        assert!(buffer.resize(1, 0.1, 1000.0)); // 100 samples
        let ramp: Vec<f32> = (0..150).map(|i| i as f32).collect();
        buffer.push_batch(&batch(1000.0, 1, &ramp)).unwrap();

        assert_eq!(buffer.write_index(0), 50);
        // Newest 100 samples are 50..150; position 50 holds sample 50,
        // which was outside the overwritten head region.
        assert_eq!(buffer.read(0, 50), 50.0);
        assert_eq!(buffer.read(0, 0), 100.0);
        assert_eq!(buffer.read(0, 49), 149.0);
    }

    #[test]
    fn event_row_latches_ttl_state() {
        let mut buffer = DisplayBuffer::new();
        assert!(buffer.resize(1, 0.1, 1000.0));
        let mut b = batch(1000.0, 1, &[0.0; 10]);
        b.ttl_edges = vec![
            TtlEdge { bit: 2, high: true, sample_offset: 3 },
            TtlEdge { bit: 2, high: false, sample_offset: 7 },
        ];
        buffer.push_batch(&b).unwrap();

        let row = buffer.event_row();
        assert_eq!(buffer.read(row, 2), 0.0);
        assert_eq!(buffer.read(row, 3), 4.0);
        assert_eq!(buffer.read(row, 6), 4.0);
        assert_eq!(buffer.read(row, 7), 0.0);

        // State persists into the next batch until a falling edge arrives.
        let mut c = batch(1000.0, 1, &[0.0; 5]);
        c.ttl_edges = vec![TtlEdge { bit: 1, high: true, sample_offset: 0 }];
        buffer.push_batch(&c).unwrap();
        assert_eq!(buffer.read(row, 10), 2.0);
    }

    #[test]
    fn trigger_position_is_recorded_and_acknowledged() {
        let mut buffer = DisplayBuffer::new();
        assert!(buffer.resize(1, 0.1, 1000.0));
        buffer.set_trigger_source(Some(0));
        assert_eq!(buffer.latest_trigger(), None);

        let mut b = batch(1000.0, 1, &[0.0; 20]);
        b.ttl_edges = vec![TtlEdge { bit: 0, high: true, sample_offset: 12 }];
        buffer.push_batch(&b).unwrap();
        assert_eq!(buffer.latest_trigger(), Some(12));

        buffer.acknowledge_trigger();
        assert_eq!(buffer.latest_trigger(), None);

        // Edges on other lines never arm the trigger.
        let mut c = batch(1000.0, 1, &[0.0; 4]);
        c.ttl_edges = vec![TtlEdge { bit: 3, high: true, sample_offset: 0 }];
        buffer.push_batch(&c).unwrap();
        assert_eq!(buffer.latest_trigger(), None);
    }
}
