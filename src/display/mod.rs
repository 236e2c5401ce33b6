pub mod aggregator;
pub mod buffer;
pub mod canvas;
pub mod rasterizer;
pub mod screen;
pub mod trigger;

pub use aggregator::{Aggregator, AggregatorParams, PassSummary};
pub use buffer::{DisplayBuffer, SharedDisplayBuffer, EVENT_BITS};
pub use canvas::{DisplayCanvas, MAX_SCREEN_WIDTH};
pub use rasterizer::{colour_for_channel, Rasterizer, BACKGROUND, CHANNEL_COLOURS};
pub use screen::{ScreenBuffer, DEFAULT_HISTOGRAM_CAPACITY};
pub use trigger::{PassDecision, TriggerController};
