use std::net::IpAddr;

use thiserror::Error;

use crate::icmp::DecodeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] DecodeError),

    #[error("buffer size {0} does not fit a signed 32-bit count")]
    ArgumentOutOfRange(u32),

    #[error("invalid operation: {0} is not an IPv4 address")]
    InvalidOperation(IpAddr),

    #[error("transport error: {error}")]
    Transport {
        #[from]
        #[source]
        error: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}
pub type Result<T> = std::result::Result<T, Error>;
