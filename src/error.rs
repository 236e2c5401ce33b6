use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("sample rate must be greater than zero")]
    InvalidSampleRate,
    #[error("sample rate mismatch: expected {expected}, got {actual}")]
    SampleRateMismatch { expected: f32, actual: f32 },
    #[error("channel count mismatch: expected {expected}, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },
    #[error("display buffer not allocated; resize it with a valid configuration first")]
    BufferUnallocated,
    #[error("failed to encode bitmap: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Settings(#[from] serde_json::Error),
}
