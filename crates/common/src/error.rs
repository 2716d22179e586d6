use thiserror::Error;

/// Unified error type for Igloo crates.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to decode page batch: {0}")]
    PageDecode(#[from] prost::DecodeError),
    #[error("Failed to encode page batch: {0}")]
    PageEncode(#[from] prost::EncodeError),
    #[error("Invalid resource location: {0}")]
    InvalidLocation(#[from] url::ParseError),
    #[error("Location cannot be used as a base URI: {0}")]
    NotABaseLocation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
