use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("source already contains placeholder-like text {found:?} at byte {offset}; refusing to mask")]
    TokenCollision { found: String, offset: usize },
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("{} placeholder token(s) left after restoration: {}", .tokens.len(), .tokens.join(", "))]
    Residual { tokens: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("empty response")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Mask(#[from] MaskError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
}
