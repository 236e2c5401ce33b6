use std::time::Duration;

use anyhow::{ensure, Context, Result};
use log::info;

use lfpscope::{
    DisplayBuffer, DisplayCanvas, DisplaySettings, DrawMethod, Producer, SyntheticSource,
};

/// Streams a synthetic multichannel signal through the display pipeline
/// for a couple of seconds and writes the final canvas to a PNG.
fn main() -> Result<()> {
    env_logger::init();

    let channels = 16;
    let sample_rate = 1000.0;
    let width_px = 1200;

    let mut settings = DisplaySettings::default();
    settings.draw_method = DrawMethod::MinMax;
    settings.show_clip_warnings = true;

    let buffer = DisplayBuffer::new_shared();
    let mut canvas = DisplayCanvas::new(buffer.clone(), settings);
    ensure!(
        canvas.resize_buffer(channels, sample_rate),
        "display buffer rejected the configuration"
    );
    canvas.resized(width_px);

    let source = SyntheticSource::new(channels, sample_rate, 20);
    let producer = Producer::spawn(source, buffer, Duration::from_millis(20));

    canvas.begin_animation();
    let mut columns = 0usize;
    for _ in 0..150 {
        std::thread::sleep(Duration::from_millis(16));
        let summary = canvas.refresh();
        if let Some((from, to)) = summary.dirty {
            columns += to - from;
        }
    }
    canvas.end_animation();
    producer.stop();
    info!("painted {} pixel columns", columns);

    let png = canvas.encode_png()?;
    std::fs::write("lfpscope.png", &png).context("writing lfpscope.png")?;
    info!("wrote lfpscope.png ({} bytes)", png.len());
    Ok(())
}
