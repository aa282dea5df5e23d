//! ICMPv4 echo over raw sockets: message codec, Internet checksum, a socket
//! transport and round-trip measurement.

pub mod error;
pub mod icmp;
pub mod ip;
pub mod ping;
pub mod transport;

pub use error::{Error, Result};
pub use icmp::{ChecksumPolicy, Code, Header, MessageType, Packet};
#[cfg(unix)]
pub use ping::ping_async;
pub use ping::{ping, Echo};
pub use transport::{Received, Transport};
