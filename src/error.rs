use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid frame: {width}x{height} with {len} bytes")]
    InvalidFrame { width: u32, height: u32, len: usize },
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}
