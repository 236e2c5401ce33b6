use log::trace;

use crate::display::buffer::DisplayBuffer;
use crate::display::screen::ScreenBuffer;
use crate::display::trigger::{PassDecision, TriggerController};

/// Per-pass configuration handed down by the canvas.
pub struct AggregatorParams<'a> {
    /// Seconds of signal mapped across the visible width.
    pub timebase_s: f32,
    /// Currently visible pixel columns.
    pub visible_width: usize,
    /// When paused, cursors keep advancing but no pixels are written.
    pub paused: bool,
    /// Acquisition rate per row (data channels plus the event row).
    pub sample_rates: &'a [f32],
}

/// Outcome of one aggregation pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassSummary {
    /// Union of the newly written pixel columns, `[from, to)`.
    pub dirty: Option<(usize, usize)>,
    /// The pass was skipped while waiting for a trigger.
    pub skipped: bool,
    /// The screen cursors wrapped to pixel 0 at the start of this pass.
    pub wrapped: bool,
}

impl PassSummary {
    fn include(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        self.dirty = match self.dirty {
            None => Some((from, to)),
            Some((a, b)) => Some((a.min(from), b.max(to))),
        };
    }
}

/// Converts newly available display-buffer samples into screen-buffer
/// pixel columns. Owns the consumer-side read cursors.
pub struct Aggregator {
    display_index: Vec<usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            display_index: Vec::new(),
        }
    }

    /// Reset the read cursors for a new topology.
    pub fn configure(&mut self, rows: usize) {
        self.display_index = vec![0; rows];
    }

    /// Re-sync every read cursor to the producer's write cursor, dropping
    /// whatever accumulated while the display was hidden.
    pub fn sync_to_producer(&mut self, display: &DisplayBuffer) {
        for (row, index) in self.display_index.iter_mut().enumerate() {
            *index = display.write_index(row);
        }
    }

    pub fn display_index(&self, row: usize) -> usize {
        self.display_index.get(row).copied().unwrap_or(0)
    }

    /// Run one aggregation pass. The caller holds the display-buffer lock
    /// for the duration of the call.
    pub fn update(
        &mut self,
        display: &mut DisplayBuffer,
        screen: &mut ScreenBuffer,
        trigger: &mut TriggerController,
        params: &AggregatorParams,
    ) -> PassSummary {
        let mut summary = PassSummary::default();
        let visible = params.visible_width.min(screen.width());
        if !display.is_allocated() || visible == 0 {
            return summary;
        }
        let rows = display.num_channels() + 1;
        if self.display_index.len() != rows {
            self.configure(rows);
            self.sync_to_producer(display);
        }

        // Wraparound and trigger gating are decided once per pass on
        // channel 0 so all traces stay time-aligned.
        let ratio0 = Self::ratio(params, 0, visible);
        match trigger.evaluate(display, screen.screen_index(0), visible, ratio0.max(0.0)) {
            PassDecision::Skip => {
                for row in 0..rows {
                    screen.mark_pass_start(row);
                }
                summary.skipped = true;
                return summary;
            }
            PassDecision::Wrap { fast_forward } => {
                for row in 0..rows {
                    screen.set_screen_index(row, 0);
                }
                if let Some(position) = fast_forward {
                    self.display_index.iter_mut().for_each(|i| *i = position);
                }
                summary.wrapped = true;
            }
            PassDecision::Proceed => {}
        }

        let buffer_len = display.num_samples();
        let event_row = display.event_row();

        for row in 0..rows {
            screen.mark_pass_start(row);
            let mut sbi = screen.screen_index(row);
            let mut dbi = self.display_index[row];

            let ratio = Self::ratio(params, row, visible);
            if !ratio.is_finite() || ratio <= 0.0 {
                continue;
            }

            let producer = display.write_index(row);
            let n_samples = (producer + buffer_len - dbi) % buffer_len;
            let mut values_needed = (n_samples as f32 / ratio) as usize;
            values_needed = values_needed.min(visible.saturating_sub(sbi));

            trace!(
                "row {}: {} new samples, {} columns at ratio {:.3}",
                row,
                n_samples,
                values_needed,
                ratio
            );

            let mut subsample_offset = 0.0f32;
            for _ in 0..values_needed {
                if !params.paused {
                    let alpha = subsample_offset;
                    let span = ((alpha + ratio).floor() as usize).max(1);

                    if row == event_row {
                        let mut bits = 0u8;
                        for j in 0..span {
                            bits |= display.read(row, dbi + j) as u8;
                        }
                        let value = f32::from(bits);
                        screen.write_pixel(row, sbi, value, value, value);
                    } else if span > 1 {
                        let mut min = f32::MAX;
                        let mut max = f32::MIN;
                        let mut sum = 0.0;
                        for j in 0..span {
                            let sample = display.read(row, dbi + j);
                            min = min.min(sample);
                            max = max.max(sample);
                            sum += sample;
                        }
                        screen.write_pixel(row, sbi, sum / span as f32, min, max);
                        screen.write_histogram(
                            row,
                            sbi,
                            (0..span).map(|j| display.read(row, dbi + j)),
                        );
                    } else {
                        // Sub-sample span: interpolate between the two
                        // nearest raw samples by the fractional offset.
                        let s0 = display.read(row, dbi);
                        let s1 = display.read(row, dbi + 1);
                        let value = s0 * (1.0 - alpha) + s1 * alpha;
                        screen.write_pixel(row, sbi, value, s0.min(s1), s0.max(s1));
                        screen.write_histogram(row, sbi, std::iter::once(s0));
                    }
                    sbi += 1;
                }

                subsample_offset += ratio;
                while subsample_offset >= 1.0 {
                    dbi = (dbi + 1) % buffer_len;
                    subsample_offset -= 1.0;
                }
            }

            screen.set_screen_index(row, sbi);
            self.display_index[row] = dbi;
            summary.include(screen.last_screen_index(row), sbi);
        }

        summary
    }

    fn ratio(params: &AggregatorParams, row: usize, visible: usize) -> f32 {
        let rate = params.sample_rates.get(row).copied().unwrap_or(0.0);
        rate * params.timebase_s / visible as f32
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
