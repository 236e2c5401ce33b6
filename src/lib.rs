//! Real-time display pipeline for multichannel electrophysiology streams.
//!
//! An acquisition thread appends full-rate samples into a circular
//! [`DisplayBuffer`]; a UI-side [`DisplayCanvas`] periodically downsamples
//! whatever is new into per-pixel min/mean/max aggregates and repaints only
//! the affected columns of an offscreen RGBA bitmap. A TTL line can be
//! armed as a trigger so every sweep starts at the same signal feature.
//!
//! ```no_run
//! use std::time::Duration;
//! use lfpscope::{DisplayBuffer, DisplayCanvas, DisplaySettings, Producer, SyntheticSource};
//!
//! let buffer = DisplayBuffer::new_shared();
//! let mut canvas = DisplayCanvas::new(buffer.clone(), DisplaySettings::default());
//! canvas.resize_buffer(16, 30_000.0);
//! canvas.resized(1200);
//!
//! let producer = Producer::spawn(
//!     SyntheticSource::new(16, 30_000.0, 600),
//!     buffer,
//!     Duration::from_millis(20),
//! );
//! canvas.begin_animation();
//! loop {
//!     std::thread::sleep(Duration::from_millis(16));
//!     canvas.refresh();
//!     // hand canvas.bitmap() to the host UI
//! }
//! ```

pub mod display;
pub mod error;
pub mod producer;
pub mod settings;
pub mod source;

pub use display::{
    Aggregator, AggregatorParams, DisplayBuffer, DisplayCanvas, PassDecision, PassSummary,
    Rasterizer, ScreenBuffer, SharedDisplayBuffer, TriggerController, BACKGROUND,
    CHANNEL_COLOURS, DEFAULT_HISTOGRAM_CAPACITY, EVENT_BITS, MAX_SCREEN_WIDTH,
};
pub use error::ScopeError;
pub use producer::Producer;
pub use settings::{ChannelSettings, DisplaySettings, DrawMethod, TriggerSettings};
pub use source::{ManualSource, SignalBatch, SignalSource, SyntheticSource, TtlEdge};
