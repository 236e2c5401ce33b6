use ndarray::Array2;

/// Default cap on raw samples retained per pixel column for the
/// supersampled rendering mode.
pub const DEFAULT_HISTOGRAM_CAPACITY: usize = 100;

/// Downsampled per-pixel aggregate store. Three parallel planes (value,
/// min, max) share indexing: entry `(channel, pixel)` in each plane refers
/// to the same pixel column and the same underlying display-buffer span.
/// The last channel row mirrors the display buffer's event row.
pub struct ScreenBuffer {
    value: Array2<f32>,
    min: Array2<f32>,
    max: Array2<f32>,
    /// Raw sample values per (data channel, pixel), truncated at capacity.
    histogram: Vec<Vec<f32>>,
    /// Raw samples that fell into each pixel column, capped at capacity.
    sample_count: Vec<usize>,
    screen_index: Vec<usize>,
    last_screen_index: Vec<usize>,
    num_channels: usize,
    width: usize,
    histogram_capacity: usize,
}

impl ScreenBuffer {
    /// `num_channels` counts data channels only; one extra row is added
    /// for the event channel.
    pub fn new(num_channels: usize, width: usize) -> Self {
        Self::with_histogram_capacity(num_channels, width, DEFAULT_HISTOGRAM_CAPACITY)
    }

    pub fn with_histogram_capacity(
        num_channels: usize,
        width: usize,
        histogram_capacity: usize,
    ) -> Self {
        let rows = num_channels + 1;
        Self {
            value: Array2::zeros((rows, width)),
            min: Array2::zeros((rows, width)),
            max: Array2::zeros((rows, width)),
            histogram: vec![Vec::new(); num_channels * width],
            sample_count: vec![0; width],
            screen_index: vec![0; rows],
            last_screen_index: vec![0; rows],
            num_channels,
            width,
            histogram_capacity,
        }
    }

    pub fn clear(&mut self) {
        self.value.fill(0.0);
        self.min.fill(0.0);
        self.max.fill(0.0);
        for pixel in &mut self.histogram {
            pixel.clear();
        }
        self.sample_count.iter_mut().for_each(|c| *c = 0);
        self.reset_cursors();
    }

    pub fn reset_cursors(&mut self) {
        self.screen_index.iter_mut().for_each(|i| *i = 0);
        self.last_screen_index.iter_mut().for_each(|i| *i = 0);
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn event_row(&self) -> usize {
        self.num_channels
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn histogram_capacity(&self) -> usize {
        self.histogram_capacity
    }

    pub fn value(&self, channel: usize, pixel: usize) -> f32 {
        self.value[(channel, pixel)]
    }

    pub fn min(&self, channel: usize, pixel: usize) -> f32 {
        self.min[(channel, pixel)]
    }

    pub fn max(&self, channel: usize, pixel: usize) -> f32 {
        self.max[(channel, pixel)]
    }

    pub fn samples_per_pixel(&self, channel: usize, pixel: usize) -> &[f32] {
        &self.histogram[channel * self.width + pixel]
    }

    pub fn sample_count_per_pixel(&self, pixel: usize) -> usize {
        self.sample_count[pixel]
    }

    pub fn screen_index(&self, channel: usize) -> usize {
        self.screen_index[channel]
    }

    pub fn last_screen_index(&self, channel: usize) -> usize {
        self.last_screen_index[channel]
    }

    pub(crate) fn set_screen_index(&mut self, channel: usize, index: usize) {
        self.screen_index[channel] = index;
    }

    pub(crate) fn mark_pass_start(&mut self, channel: usize) {
        self.last_screen_index[channel] = self.screen_index[channel];
    }

    pub(crate) fn write_pixel(
        &mut self,
        channel: usize,
        pixel: usize,
        value: f32,
        min: f32,
        max: f32,
    ) {
        self.value[(channel, pixel)] = value;
        self.min[(channel, pixel)] = min;
        self.max[(channel, pixel)] = max;
    }

    /// Replace the histogram population of one pixel. The capacity bound
    /// truncates silently; the recorded count is capped to match.
    pub(crate) fn write_histogram<I>(&mut self, channel: usize, pixel: usize, samples: I)
    where
        I: IntoIterator<Item = f32>,
    {
        let slot = &mut self.histogram[channel * self.width + pixel];
        slot.clear();
        slot.extend(samples.into_iter().take(self.histogram_capacity));
        self.sample_count[pixel] = slot.len();
    }

    /// Mean of one channel's value plane, sampled every 10th column. Used
    /// for offset-corrected plotting.
    pub fn channel_mean(&self, channel: usize, visible_width: usize) -> f32 {
        let width = visible_width.min(self.width);
        let mut total = 0.0;
        let mut count = 0;
        let mut pixel = 0;
        while pixel < width {
            total += self.value[(channel, pixel)];
            count += 1;
            pixel += 10;
        }
        if count == 0 {
            0.0
        } else {
            total / count as f32
        }
    }

    /// Standard deviation companion to [`channel_mean`], same sampling.
    pub fn channel_std(&self, channel: usize, visible_width: usize) -> f32 {
        let mean = self.channel_mean(channel, visible_width);
        let width = visible_width.min(self.width);
        let mut total = 0.0;
        let mut count = 0;
        let mut pixel = 0;
        while pixel < width {
            let d = self.value[(channel, pixel)] - mean;
            total += d * d;
            count += 1;
            pixel += 10;
        }
        if count == 0 {
            0.0
        } else {
            (total / count as f32).sqrt()
        }
    }
}
