//! Custom error type definitions.

use thiserror::Error;

/// Errors that may arise during parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid ad type: valid are 0 to 7, got {0}.")]
    InvalidAdType(u16),

    #[error("Invalid value tag: valid are 0 to 4, got {0}.")]
    InvalidValueTag(u8),

    #[error("Invalid attribute name: must start with a letter or underscore and contain only letters, digits, underscores, and dots, got {0:?}.")]
    InvalidAttrName(String),

    #[error("Invalid query flags: only the constraint and projection bits may be set, got {0:#04x}.")]
    InvalidQueryFlags(u8),

    #[error("Non-UTF-8 string in message.")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Truncated message: an ad frame exceeds the response buffer.")]
    Truncated,

    #[error("IO error.")]
    IoError(#[from] std::io::Error),
}

/// Errors that may arise during encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("String too long: allowed are up to 65535 bytes, got {0}.")]
    StringTooLong(usize),

    #[error("Too many attributes: allowed are up to 65535, got {0}.")]
    TooManyAttrs(usize),

    #[error("Too many ads: allowed are up to 4294967295, got {0}.")]
    TooManyAds(usize),

    #[error("Encoded ad too large: allowed are up to 4294967295 bytes, got {0}.")]
    AdTooLarge(usize),

    #[error("IO error.")]
    IoError(#[from] std::io::Error),
}
