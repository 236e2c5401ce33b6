use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;

use crate::display::screen::ScreenBuffer;
use crate::settings::{DisplaySettings, DrawMethod};

/// Canvas background, a deep blue that the zero lines and traces key off.
pub const BACKGROUND: Rgba<u8> = Rgba([0, 18, 43, 255]);

const ZERO_LINE: Rgba<u8> = Rgba([50, 50, 50, 255]);
const PLAYHEAD: Rgba<u8> = Rgba([255, 255, 0, 255]);
const CLIP_MARK: Rgba<u8> = Rgba([255, 255, 255, 255]);
const SATURATION_RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const SATURATION_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Default channel palette; adjacent channels cycle through it, and colour
/// grouping makes blocks of channels share an entry.
pub static CHANNEL_COLOURS: Lazy<[Rgba<u8>; 16]> = Lazy::new(|| {
    [
        Rgba([224, 185, 36, 255]),
        Rgba([214, 210, 182, 255]),
        Rgba([243, 119, 33, 255]),
        Rgba([186, 157, 168, 255]),
        Rgba([237, 37, 36, 255]),
        Rgba([179, 122, 79, 255]),
        Rgba([217, 46, 171, 255]),
        Rgba([217, 139, 196, 255]),
        Rgba([101, 31, 255, 255]),
        Rgba([141, 111, 181, 255]),
        Rgba([48, 117, 255, 255]),
        Rgba([184, 198, 224, 255]),
        Rgba([116, 227, 156, 255]),
        Rgba([150, 158, 155, 255]),
        Rgba([82, 173, 0, 255]),
        Rgba([125, 99, 32, 255]),
    ]
});

pub fn colour_for_channel(channel: usize, grouping: usize) -> Rgba<u8> {
    let group = channel / grouping.max(1);
    CHANNEL_COLOURS[group % CHANNEL_COLOURS.len()]
}

fn scale_brightness(colour: Rgba<u8>, factor: f32) -> Rgba<u8> {
    let scale = |v: u8| ((f32::from(v) * factor).clamp(0.0, 255.0)) as u8;
    Rgba([scale(colour[0]), scale(colour[1]), scale(colour[2]), colour[3]])
}

fn scale_saturation(colour: Rgba<u8>, factor: f32) -> Rgba<u8> {
    let luma =
        0.299 * f32::from(colour[0]) + 0.587 * f32::from(colour[1]) + 0.114 * f32::from(colour[2]);
    let pull = |v: u8| ((luma + (f32::from(v) - luma) * factor).clamp(0.0, 255.0)) as u8;
    Rgba([pull(colour[0]), pull(colour[1]), pull(colour[2]), colour[3]])
}

fn blend(a: Rgba<u8>, b: Rgba<u8>, t: f32) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix =
        |x: u8, y: u8| (f32::from(x) + (f32::from(y) - f32::from(x)) * t).round() as u8;
    Rgba([mix(a[0], b[0]), mix(a[1], b[1]), mix(a[2], b[2]), 255])
}

/// Paints newly aggregated pixel columns into the shared offscreen bitmap.
/// Only the requested column range is touched, so per-frame cost is bound
/// by the number of new columns, not the canvas size.
pub struct Rasterizer {
    pub background: Rgba<u8>,
}

impl Rasterizer {
    pub fn new() -> Self {
        Self {
            background: BACKGROUND,
        }
    }

    /// Repaint columns `[from, to)` for every enabled channel, then draw
    /// the playhead one column ahead of the write cursor.
    pub fn repaint(
        &self,
        bitmap: &mut RgbaImage,
        screen: &ScreenBuffer,
        settings: &DisplaySettings,
        from: usize,
        to: usize,
    ) {
        let width = bitmap.width() as usize;
        let height = bitmap.height() as usize;
        if width == 0 || height == 0 {
            return;
        }
        let from = from.min(width);
        let to = to.min(width);

        for x in from..to {
            for y in 0..height {
                bitmap.put_pixel(x as u32, y as u32, self.background);
            }
        }

        for channel in 0..screen.num_channels() {
            if settings.channel(channel).enabled {
                self.paint_channel(bitmap, screen, settings, channel, from, to);
            }
        }

        self.paint_playhead(bitmap, screen);
    }

    /// Vertical band owned by one channel: `(whole_from, whole_to)` is the
    /// full row used for events and saturation, the clip band is derived
    /// from the overlap factor where traces are allowed to spill.
    fn channel_band(
        &self,
        settings: &DisplaySettings,
        height: usize,
        channel: usize,
    ) -> (i64, i64, i64) {
        let spread = settings.channel_spread_px as i64;
        let ch_height = settings.channel_height_px as i64;
        let center = channel as i64 * spread + spread / 2;
        let whole_from = (center - ch_height / 2 + 1).clamp(0, height as i64 - 1);
        let whole_to = (center + ch_height / 2).clamp(0, height as i64 - 1);
        (center, whole_from, whole_to)
    }

    fn paint_channel(
        &self,
        bitmap: &mut RgbaImage,
        screen: &ScreenBuffer,
        settings: &DisplaySettings,
        channel: usize,
        from: usize,
        to: usize,
    ) {
        let height = bitmap.height() as usize;
        let channel_settings = settings.channel(channel);
        let range = channel_settings.range_uv.max(f32::EPSILON);
        let ch_height = settings.channel_height_px as f32;
        let (center, whole_from, whole_to) = self.channel_band(settings, height, channel);

        // Half-height of the band the trace may occupy, from the overlap factor.
        let clip_extent = (ch_height * settings.overlap_factor).abs().max(1.0);

        let line_colour = colour_for_channel(channel, settings.colour_grouping);
        let bright = scale_brightness(line_colour, 2.0);
        let dark = scale_brightness(
            scale_saturation(line_colour, 0.5 * settings.histogram_dimming),
            settings.histogram_dimming,
        );

        let mean_offset = if settings.mean_offset_correction {
            screen.channel_mean(channel, to.max(from))
        } else {
            0.0
        };
        let sign = if channel_settings.inverted { 1.0 } else { -1.0 };
        let event_row = screen.event_row();

        for x in from..to {
            self.paint_zero_line(bitmap, x, center);
            self.paint_event_markers(bitmap, screen, settings, x, event_row, whole_from, whole_to);

            // Pixel offsets relative to the channel baseline, positive down.
            let mut a = (screen.max(channel, x) - mean_offset) / range * ch_height * sign;
            let mut b = (screen.min(channel, x) - mean_offset) / range * ch_height * sign;
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }

            let mut clip_hi = false;
            let mut clip_lo = false;
            if a < -clip_extent {
                a = -clip_extent;
                clip_hi = true;
            }
            if b > clip_extent {
                b = clip_extent;
                clip_lo = true;
            }

            let raw_hi = screen.max(channel, x);
            let raw_lo = screen.min(channel, x);
            let saturated = raw_hi > settings.saturation_threshold_uv
                || raw_lo < -settings.saturation_threshold_uv;

            let y_from = center + a as i64;
            let y_to = center + b as i64;

            match settings.draw_method {
                DrawMethod::MinMax => {
                    self.plot_min_max(bitmap, x, y_from, y_to, line_colour);
                }
                DrawMethod::Supersampled => self.plot_supersampled(
                    bitmap,
                    screen,
                    settings,
                    channel,
                    x,
                    center,
                    y_from,
                    y_to,
                    range,
                    ch_height,
                    sign,
                    mean_offset,
                    line_colour,
                    bright,
                    dark,
                ),
            }

            if settings.show_clip_warnings && (clip_hi || clip_lo) {
                self.paint_clip_marks(bitmap, x, center, clip_extent as i64, clip_hi, clip_lo);
            }
            if settings.show_saturation_warnings && saturated {
                self.paint_saturation_band(bitmap, x, whole_from, whole_to);
            }
        }
    }

    fn paint_zero_line(&self, bitmap: &mut RgbaImage, x: usize, center: i64) {
        if center >= 0 && (center as u32) < bitmap.height() {
            // Never draw over a trace another channel already put here.
            if *bitmap.get_pixel(x as u32, center as u32) == self.background {
                bitmap.put_pixel(x as u32, center as u32, ZERO_LINE);
            }
        }
    }

    fn paint_event_markers(
        &self,
        bitmap: &mut RgbaImage,
        screen: &ScreenBuffer,
        settings: &DisplaySettings,
        x: usize,
        event_row: usize,
        whole_from: i64,
        whole_to: i64,
    ) {
        let bits = screen.value(event_row, x) as u8;
        if bits == 0 {
            return;
        }
        for bit in 0..8u8 {
            if bits & (1 << bit) == 0 || !settings.event_display[bit as usize] {
                continue;
            }
            let colour = CHANNEL_COLOURS[(bit as usize * 2) % CHANNEL_COLOURS.len()];
            for y in whole_from..=whole_to {
                let current = *bitmap.get_pixel(x as u32, y as u32);
                bitmap.put_pixel(x as u32, y as u32, blend(current, colour, 0.3));
            }
        }
    }

    fn plot_min_max(
        &self,
        bitmap: &mut RgbaImage,
        x: usize,
        y_from: i64,
        y_to: i64,
        colour: Rgba<u8>,
    ) {
        let height = bitmap.height() as i64;
        let y_from = y_from.clamp(0, height - 1);
        let y_to = y_to.clamp(0, height - 1);
        for y in y_from..=y_to {
            bitmap.put_pixel(x as u32, y as u32, colour);
        }
    }

    /// Density plot: every pair of neighboring raw samples deposits weight
    /// into the rows it crosses, then each row is shaded between the dark
    /// and bright colour by its relative weight.
    #[allow(clippy::too_many_arguments)]
    fn plot_supersampled(
        &self,
        bitmap: &mut RgbaImage,
        screen: &ScreenBuffer,
        settings: &DisplaySettings,
        channel: usize,
        x: usize,
        center: i64,
        y_from: i64,
        y_to: i64,
        range: f32,
        ch_height: f32,
        sign: f32,
        mean_offset: f32,
        line_colour: Rgba<u8>,
        bright: Rgba<u8>,
        dark: Rgba<u8>,
    ) {
        let height = bitmap.height() as i64;
        let samples = screen.samples_per_pixel(channel, x);
        let count = screen.sample_count_per_pixel(x).min(samples.len());
        let sample_range = (y_to - y_from).max(0) as usize;

        if sample_range == 0 || count < 2 {
            if y_from >= 0 && y_from < height {
                bitmap.put_pixel(x as u32, y_from as u32, line_colour);
            }
            return;
        }

        let to_row = |value: f32| -> i64 {
            let offset = (value - mean_offset) / range * ch_height * sign;
            ((center + offset as i64) - y_from).clamp(0, sample_range as i64)
        };

        let mut row_hist = vec![0.0f32; sample_range + 1];
        for pair in samples[..count].windows(2) {
            let r0 = to_row(pair[0]);
            let r1 = to_row(pair[1]);
            let (lo, hi) = if r0 <= r1 { (r0, r1) } else { (r1, r0) };
            for row in lo..hi {
                row_hist[row as usize] += 1.0;
            }
        }

        for (row, weight) in row_hist.iter().enumerate() {
            let coverage = 15.0 * (weight / count as f32)
                * (2.0 * (0.2 + settings.histogram_brightness));
            let coverage = coverage.clamp(0.0, 1.0);
            let colour = blend(bright, dark, 1.0 - coverage);
            let y = y_from + row as i64;
            if y >= 0 && y < height {
                bitmap.put_pixel(x as u32, y as u32, colour);
            }
        }
    }

    /// Thin white ticks at the clip band edge: the trace ran out of
    /// configured display range, the data itself may still be fine.
    fn paint_clip_marks(
        &self,
        bitmap: &mut RgbaImage,
        x: usize,
        center: i64,
        clip_extent: i64,
        clip_hi: bool,
        clip_lo: bool,
    ) {
        let height = bitmap.height() as i64;
        let mut tick = |edge: i64, inward: i64| {
            for j in 0..=3i64 {
                let y = edge + inward * j;
                if y > 0 && y < height {
                    bitmap.put_pixel(x as u32, y as u32, CLIP_MARK);
                }
            }
        };
        if clip_hi {
            tick(center - clip_extent, 1);
        }
        if clip_lo {
            tick(center + clip_extent, -1);
        }
    }

    /// High-visibility striped band: raw samples exceeded the amplifier
    /// saturation threshold. Distinct from (and louder than) clip marks.
    fn paint_saturation_band(&self, bitmap: &mut RgbaImage, x: usize, from: i64, to: i64) {
        for y in from..=to {
            let colour = if (x as i64 + y) % 50 > 25 {
                SATURATION_WHITE
            } else {
                SATURATION_RED
            };
            bitmap.put_pixel(x as u32, y as u32, colour);
        }
    }

    /// Dashed vertical marker one column ahead of the write cursor.
    fn paint_playhead(&self, bitmap: &mut RgbaImage, screen: &ScreenBuffer) {
        let column = screen.screen_index(0) + 1;
        if column >= bitmap.width() as usize {
            return;
        }
        for y in (0..bitmap.height()).step_by(2) {
            bitmap.put_pixel(column as u32, y, PLAYHEAD);
        }
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ChannelSettings;

    fn test_settings(channels: usize) -> DisplaySettings {
        let mut settings = DisplaySettings::default();
        settings.ensure_channels(channels);
        settings.channel_spread_px = 40;
        settings.channel_height_px = 40;
        settings
    }

    fn screen_with_trace(channels: usize, width: usize) -> ScreenBuffer {
        let mut screen = ScreenBuffer::new(channels, width);
        for chan in 0..channels {
            for px in 0..width {
                screen.write_pixel(chan, px, 0.0, -50.0, 50.0);
            }
        }
        screen
    }

    #[test]
    fn repaint_touches_only_the_requested_columns() {
        let settings = test_settings(1);
        let screen = screen_with_trace(1, 100);
        let mut bitmap = RgbaImage::from_pixel(100, 40, Rgba([9, 9, 9, 255]));

        Rasterizer::new().repaint(&mut bitmap, &screen, &settings, 10, 20);

        // Columns outside [10, 20) keep the sentinel colour (except the
        // playhead column, which tracks the cursor).
        let playhead = screen.screen_index(0) + 1;
        for x in [0usize, 9, 20, 99] {
            if x == playhead {
                continue;
            }
            assert_eq!(
                *bitmap.get_pixel(x as u32, 5),
                Rgba([9, 9, 9, 255]),
                "column {x} was touched"
            );
        }
        assert_ne!(*bitmap.get_pixel(15, 5), Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn min_max_mode_fills_the_span_with_the_channel_colour() {
        let settings = test_settings(1);
        let screen = screen_with_trace(1, 10);
        let mut bitmap = RgbaImage::from_pixel(10, 40, BACKGROUND);

        Rasterizer::new().repaint(&mut bitmap, &screen, &settings, 0, 10);

        // min -50 / max +50 at range 250 over height 40 spans 8 px either
        // side of the baseline at y = 20.
        let colour = colour_for_channel(0, 1);
        assert_eq!(*bitmap.get_pixel(5, 20), colour);
        assert_eq!(*bitmap.get_pixel(5, 13), colour);
        assert_eq!(*bitmap.get_pixel(5, 27), colour);
        assert_eq!(*bitmap.get_pixel(5, 10), BACKGROUND);
    }

    #[test]
    fn disabled_channels_are_not_painted() {
        let mut settings = test_settings(2);
        settings.channels[1] = ChannelSettings {
            enabled: false,
            ..ChannelSettings::default()
        };
        let screen = screen_with_trace(2, 10);
        let mut bitmap = RgbaImage::from_pixel(10, 80, BACKGROUND);

        Rasterizer::new().repaint(&mut bitmap, &screen, &settings, 0, 10);

        assert_ne!(*bitmap.get_pixel(5, 20), BACKGROUND);
        // Channel 1's baseline row stays untouched (no trace, no zero line).
        assert_eq!(*bitmap.get_pixel(5, 60), BACKGROUND);
    }

    #[test]
    fn event_bits_tint_the_channel_band() {
        let settings = test_settings(1);
        let mut screen = ScreenBuffer::new(1, 10);
        let event_row = screen.event_row();
        for px in 0..10 {
            screen.write_pixel(0, px, 0.0, 0.0, 0.0);
        }
        screen.write_pixel(event_row, 4, 1.0, 1.0, 1.0);

        let mut bitmap = RgbaImage::from_pixel(10, 40, BACKGROUND);
        Rasterizer::new().repaint(&mut bitmap, &screen, &settings, 0, 10);

        let plain = *bitmap.get_pixel(3, 10);
        let tinted = *bitmap.get_pixel(4, 10);
        assert_eq!(plain, BACKGROUND);
        assert_ne!(tinted, BACKGROUND);
    }

    #[test]
    fn saturation_band_overrides_the_trace() {
        let mut settings = test_settings(1);
        settings.show_saturation_warnings = true;
        settings.saturation_threshold_uv = 100.0;

        let mut screen = ScreenBuffer::new(1, 10);
        for px in 0..10 {
            screen.write_pixel(0, px, 0.0, -500.0, 500.0);
        }
        let mut bitmap = RgbaImage::from_pixel(10, 40, BACKGROUND);
        Rasterizer::new().repaint(&mut bitmap, &screen, &settings, 0, 10);

        let px = *bitmap.get_pixel(5, 20);
        assert!(px == SATURATION_RED || px == SATURATION_WHITE);
    }

    #[test]
    fn colour_grouping_shares_colours_between_neighbors() {
        assert_eq!(colour_for_channel(0, 4), colour_for_channel(3, 4));
        assert_ne!(colour_for_channel(0, 4), colour_for_channel(4, 4));
        assert_eq!(colour_for_channel(0, 1), colour_for_channel(16, 1));
    }
}
