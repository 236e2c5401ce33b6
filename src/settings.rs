use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ScopeError;

/// How channel traces are painted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawMethod {
    /// Vertical min-to-max segments. Cheap and alias-free when zoomed out.
    MinMax,
    /// Brightness-weighted density plot built from the per-pixel histogram.
    Supersampled,
}

/// Per-channel display state, persisted across sessions.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChannelSettings {
    pub enabled: bool,
    pub inverted: bool,
    /// Vertical range in microvolts; a sample at +range sits one channel
    /// height above the baseline.
    pub range_uv: f32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            inverted: false,
            range_uv: 250.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// TTL line that resets the display's time origin, if any.
    pub source: Option<u8>,
    /// Look-back ahead of the trigger, in pixels.
    pub lookback_px: usize,
    /// Cap on the look-back as a fraction of the display buffer.
    pub max_lookback_fraction: f32,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            source: None,
            lookback_px: 10,
            max_lookback_fraction: 0.25,
        }
    }
}

/// Everything the embedding UI can tweak, in one serializable bundle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Seconds of signal mapped across the visible width.
    pub timebase_s: f32,
    /// Seconds of history held in the display buffer.
    pub buffer_seconds: f32,
    /// Drawable waveform height per channel, px.
    pub channel_height_px: usize,
    /// Vertical distance between adjacent channel baselines, px.
    pub channel_spread_px: usize,
    /// How far traces may reach into neighboring rows; 0.5 confines each
    /// trace to its own row.
    pub overlap_factor: f32,
    /// Adjacent channels in groups of this size share a colour.
    pub colour_grouping: usize,
    pub draw_method: DrawMethod,
    /// Brightness boost for the supersampled mode (histogram parameter A).
    pub histogram_brightness: f32,
    /// Dark-end dimming for the supersampled mode (histogram parameter B).
    pub histogram_dimming: f32,
    pub show_clip_warnings: bool,
    pub show_saturation_warnings: bool,
    /// Raw amplitude beyond which the amplifier is considered saturated, µV.
    pub saturation_threshold_uv: f32,
    /// Subtract each channel's running mean before painting.
    pub mean_offset_correction: bool,
    /// Which TTL lines get painted as event markers.
    pub event_display: [bool; 8],
    pub trigger: TriggerSettings,
    pub channels: Vec<ChannelSettings>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            timebase_s: 1.0,
            buffer_seconds: 10.0,
            channel_height_px: 40,
            channel_spread_px: 40,
            overlap_factor: 0.5,
            colour_grouping: 1,
            draw_method: DrawMethod::MinMax,
            histogram_brightness: 0.5,
            histogram_dimming: 0.5,
            show_clip_warnings: false,
            show_saturation_warnings: false,
            saturation_threshold_uv: 5000.0,
            mean_offset_correction: false,
            event_display: [true; 8],
            trigger: TriggerSettings::default(),
            channels: Vec::new(),
        }
    }
}

impl DisplaySettings {
    /// Settings for one channel, falling back to defaults for channels the
    /// persisted state never saw.
    pub fn channel(&self, index: usize) -> ChannelSettings {
        self.channels.get(index).copied().unwrap_or_default()
    }

    /// Grow the per-channel list to cover `count` channels.
    pub fn ensure_channels(&mut self, count: usize) {
        if self.channels.len() < count {
            self.channels.resize(count, ChannelSettings::default());
        }
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut ChannelSettings {
        self.ensure_channels(index + 1);
        &mut self.channels[index]
    }

    pub fn to_json(&self) -> Result<String, ScopeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ScopeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ScopeError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScopeError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_channel_state() {
        let mut settings = DisplaySettings::default();
        settings.timebase_s = 2.0;
        settings.trigger.source = Some(3);
        settings.channel_mut(5).inverted = true;
        settings.channel_mut(5).range_uv = 500.0;

        let restored = DisplaySettings::from_json(&settings.to_json().unwrap()).unwrap();
        assert_eq!(restored.timebase_s, 2.0);
        assert_eq!(restored.trigger.source, Some(3));
        assert_eq!(restored.channels.len(), 6);
        assert!(restored.channel(5).inverted);
        assert_eq!(restored.channel(5).range_uv, 500.0);
        // Channels past the persisted list fall back to defaults.
        assert!(restored.channel(10).enabled);
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.json");

        let mut settings = DisplaySettings::default();
        settings.draw_method = DrawMethod::Supersampled;
        settings.save(&path).unwrap();

        let restored = DisplaySettings::load(&path).unwrap();
        assert_eq!(restored.draw_method, DrawMethod::Supersampled);
    }
}
