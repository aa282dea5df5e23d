use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid size: {len} bytes is shorter than the {min} byte header")]
    InvalidSize { len: usize, min: usize },

    #[error("Invalid ip header: {0}")]
    InvalidIpHeader(&'static str),
}
pub type DecodeResult<T> = Result<T, DecodeError>;
