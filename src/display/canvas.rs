use std::io::Cursor;

use image::{ImageFormat, RgbaImage};
use log::info;

use crate::display::aggregator::{Aggregator, AggregatorParams, PassSummary};
use crate::display::buffer::SharedDisplayBuffer;
use crate::display::rasterizer::Rasterizer;
use crate::display::screen::ScreenBuffer;
use crate::display::trigger::TriggerController;
use crate::error::ScopeError;
use crate::settings::{DisplaySettings, DrawMethod};

/// Upper bound on tracked pixel columns, independent of the window width.
pub const MAX_SCREEN_WIDTH: usize = 5000;

/// Consumer-side owner of the whole pipeline: screen buffer, aggregation
/// cursors, trigger state, and the shared offscreen bitmap. Drive it from
/// the UI thread's periodic refresh callback; the producer only ever sees
/// the shared display buffer.
pub struct DisplayCanvas {
    buffer: SharedDisplayBuffer,
    screen: ScreenBuffer,
    aggregator: Aggregator,
    trigger: TriggerController,
    rasterizer: Rasterizer,
    settings: DisplaySettings,
    bitmap: RgbaImage,
    sample_rates: Vec<f32>,
    visible_width: usize,
    animating: bool,
    paused: bool,
    full_redraw: bool,
}

impl DisplayCanvas {
    pub fn new(buffer: SharedDisplayBuffer, settings: DisplaySettings) -> Self {
        let mut canvas = Self {
            buffer,
            screen: ScreenBuffer::new(0, MAX_SCREEN_WIDTH),
            aggregator: Aggregator::new(),
            trigger: TriggerController::new(),
            rasterizer: Rasterizer::new(),
            settings,
            bitmap: RgbaImage::new(0, 0),
            sample_rates: Vec::new(),
            visible_width: 0,
            animating: false,
            paused: false,
            full_redraw: true,
        };
        canvas.reconfigure();
        canvas
    }

    /// Re-read topology from the display buffer and rebuild the
    /// consumer-side state. Call after the buffer was resized or the
    /// settings were replaced wholesale.
    pub fn reconfigure(&mut self) {
        let (channels, rate) = {
            let mut guard = self.buffer.lock();
            guard.set_trigger_source(self.settings.trigger.source);
            (guard.num_channels(), guard.sample_rate_hz())
        };
        self.settings.ensure_channels(channels);
        self.screen = ScreenBuffer::new(channels, MAX_SCREEN_WIDTH);
        self.sample_rates = vec![rate; channels + 1];
        self.aggregator.configure(channels + 1);
        self.trigger.lookback_px = self.settings.trigger.lookback_px;
        self.trigger.max_lookback_fraction = self.settings.trigger.max_lookback_fraction;
        self.trigger.reset(self.settings.trigger.source.is_some());
        self.rebuild_bitmap();
        self.full_redraw = true;
    }

    /// Resize the shared display buffer for a new topology and rebuild.
    /// Degenerate configurations leave the pipeline idle.
    pub fn resize_buffer(&mut self, channels: usize, sample_rate_hz: f32) -> bool {
        let resized = self
            .buffer
            .lock()
            .resize(channels, self.settings.buffer_seconds, sample_rate_hz);
        if resized {
            self.reconfigure();
        }
        resized
    }

    /// The host canvas changed width.
    pub fn resized(&mut self, width_px: usize) {
        self.visible_width = width_px.min(MAX_SCREEN_WIDTH);
        self.rebuild_bitmap();
        self.full_redraw = true;
    }

    fn rebuild_bitmap(&mut self) {
        let height = self.screen.num_channels() * self.settings.channel_spread_px;
        self.bitmap = RgbaImage::from_pixel(
            self.visible_width as u32,
            height as u32,
            self.rasterizer.background,
        );
    }

    /// Start the periodic refresh. Cursors re-sync to the producer so the
    /// display picks up from "now" rather than replaying history.
    pub fn begin_animation(&mut self) {
        info!("beginning animation");
        {
            let guard = self.buffer.lock();
            self.aggregator.sync_to_producer(&guard);
        }
        self.screen.reset_cursors();
        self.trigger.reset(self.settings.trigger.source.is_some());
        self.animating = true;
    }

    pub fn end_animation(&mut self) {
        info!("ending animation");
        self.animating = false;
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// One refresh tick: aggregate whatever the producer appended since
    /// the last tick, then repaint the affected columns. Safe to call at
    /// any rate; a slow caller just gets more columns per pass.
    pub fn refresh(&mut self) -> PassSummary {
        if !self.animating || self.visible_width == 0 || self.bitmap.height() == 0 {
            return PassSummary::default();
        }

        let summary = {
            let params = AggregatorParams {
                timebase_s: self.settings.timebase_s,
                visible_width: self.visible_width,
                paused: self.paused,
                sample_rates: &self.sample_rates,
            };
            let mut guard = self.buffer.lock();
            self.aggregator
                .update(&mut guard, &mut self.screen, &mut self.trigger, &params)
        };

        if self.full_redraw {
            self.rasterizer
                .repaint(&mut self.bitmap, &self.screen, &self.settings, 0, self.visible_width);
            self.full_redraw = false;
        } else if let Some((from, to)) = summary.dirty {
            // Start one column early so interpolated lines join up with
            // the previously drawn region.
            self.rasterizer.repaint(
                &mut self.bitmap,
                &self.screen,
                &self.settings,
                from.saturating_sub(1),
                to,
            );
        }
        summary
    }

    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, ScopeError> {
        let mut out = Vec::new();
        self.bitmap
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(out)
    }

    pub fn settings(&self) -> &DisplaySettings {
        &self.settings
    }

    /// Replace the whole settings bundle (e.g. after loading a session)
    /// and rebuild the pipeline around it.
    pub fn apply_settings(&mut self, settings: DisplaySettings) {
        self.settings = settings;
        self.reconfigure();
    }

    pub fn set_timebase(&mut self, seconds: f32) {
        self.settings.timebase_s = seconds;
        self.full_redraw = true;
    }

    pub fn set_channel_height(&mut self, height_px: usize, spread_px: usize) {
        self.settings.channel_height_px = height_px;
        self.settings.channel_spread_px = spread_px;
        self.rebuild_bitmap();
        self.full_redraw = true;
    }

    pub fn set_overlap_factor(&mut self, factor: f32) {
        self.settings.overlap_factor = factor;
        self.full_redraw = true;
    }

    pub fn set_draw_method(&mut self, method: DrawMethod) {
        self.settings.draw_method = method;
        self.full_redraw = true;
    }

    pub fn set_colour_grouping(&mut self, grouping: usize) {
        self.settings.colour_grouping = grouping.max(1);
        self.full_redraw = true;
    }

    pub fn set_channel_enabled(&mut self, channel: usize, enabled: bool) {
        self.settings.channel_mut(channel).enabled = enabled;
        self.full_redraw = true;
    }

    pub fn set_channel_inverted(&mut self, channel: usize, inverted: bool) {
        self.settings.channel_mut(channel).inverted = inverted;
        self.full_redraw = true;
    }

    pub fn set_channel_range(&mut self, channel: usize, range_uv: f32) {
        self.settings.channel_mut(channel).range_uv = range_uv;
        self.full_redraw = true;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn set_mean_offset_correction(&mut self, enabled: bool) {
        self.settings.mean_offset_correction = enabled;
        self.full_redraw = true;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Arm or disarm the display trigger. Arming resets the sweep so the
    /// first trace starts at the first trigger.
    pub fn set_trigger_source(&mut self, source: Option<u8>) {
        self.settings.trigger.source = source;
        self.buffer.lock().set_trigger_source(source);
        self.trigger.reset(source.is_some());
        self.screen.reset_cursors();
        self.full_redraw = true;
    }

    /// Running mean of one channel's on-screen values, for offset display.
    pub fn channel_mean(&self, channel: usize) -> f32 {
        self.screen.channel_mean(channel, self.visible_width)
    }

    pub fn channel_std(&self, channel: usize) -> f32 {
        self.screen.channel_std(channel, self.visible_width)
    }

    pub fn screen(&self) -> &ScreenBuffer {
        &self.screen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::buffer::DisplayBuffer;
    use crate::display::rasterizer::BACKGROUND;
    use crate::source::SignalBatch;

    fn canvas_with_data(channels: usize, width: usize) -> DisplayCanvas {
        let buffer = DisplayBuffer::new_shared();
        let mut canvas = DisplayCanvas::new(buffer.clone(), DisplaySettings::default());
        assert!(canvas.resize_buffer(channels, 1000.0));
        canvas.resized(width);
        canvas.begin_animation();

        let samples: Vec<f32> = (0..500).map(|i| ((i % 20) as f32 - 10.0) * 10.0).collect();
        buffer
            .lock()
            .push_batch(&SignalBatch::new(1000.0, vec![samples; channels]))
            .unwrap();
        canvas
    }

    #[test]
    fn refresh_paints_new_columns_into_the_bitmap() {
        let mut canvas = canvas_with_data(2, 250);
        let summary = canvas.refresh();
        let (from, to) = summary.dirty.unwrap();
        assert!(to > from);

        let touched = (from..to).any(|x| {
            (0..canvas.bitmap().height())
                .any(|y| *canvas.bitmap().get_pixel(x as u32, y) != BACKGROUND)
        });
        assert!(touched, "no trace pixels were painted");
    }

    #[test]
    fn refresh_before_begin_animation_is_inert() {
        let buffer = DisplayBuffer::new_shared();
        let mut canvas = DisplayCanvas::new(buffer, DisplaySettings::default());
        let summary = canvas.refresh();
        assert_eq!(summary.dirty, None);
    }

    #[test]
    fn degenerate_buffer_keeps_the_pipeline_idle() {
        let buffer = DisplayBuffer::new_shared();
        let mut canvas = DisplayCanvas::new(buffer, DisplaySettings::default());
        assert!(!canvas.resize_buffer(0, 1000.0));
        canvas.resized(100);
        canvas.begin_animation();
        let summary = canvas.refresh();
        assert_eq!(summary.dirty, None);
    }

    #[test]
    fn begin_animation_skips_history_written_while_hidden() {
        let buffer = DisplayBuffer::new_shared();
        let mut canvas = DisplayCanvas::new(buffer.clone(), DisplaySettings::default());
        assert!(canvas.resize_buffer(1, 1000.0));
        canvas.resized(100);

        buffer
            .lock()
            .push_batch(&SignalBatch::new(1000.0, vec![vec![7.0; 400]]))
            .unwrap();

        canvas.begin_animation();
        let summary = canvas.refresh();
        // Everything before begin_animation is old news.
        assert_eq!(summary.dirty, None);
    }

    #[test]
    fn png_export_yields_a_decodable_image() {
        let mut canvas = canvas_with_data(1, 100);
        canvas.refresh();
        let png = canvas.encode_png().unwrap();
        assert!(!png.is_empty());
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.width(), 100);
    }

    #[test]
    fn settings_survive_apply_and_reconfigure() {
        let mut canvas = canvas_with_data(4, 100);
        let mut settings = canvas.settings().clone();
        settings.timebase_s = 2.0;
        settings.trigger.source = Some(1);
        canvas.apply_settings(settings);

        assert_eq!(canvas.settings().timebase_s, 2.0);
        // The trigger source propagated down to the shared buffer.
        assert!(canvas.refresh().skipped);
    }
}
