use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Lookup failed: {0}")]
    LookupFailed(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
