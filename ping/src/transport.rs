use std::io::Read;
use std::net::{IpAddr, SocketAddrV4};
use std::time::Duration;

use log::{debug, trace};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::error::{Error, Result};
use crate::icmp::{ChecksumPolicy, Packet};
use crate::ip::Ipv4Header;

pub const DEFAULT_BUFFER_SIZE: u32 = 512;
pub const MIN_BUFFER_SIZE: usize = 32;
pub const MAX_BUFFER_SIZE: usize = 65507;
/// Used when a caller asks for a zero sized buffer.
pub const FALLBACK_BUFFER_SIZE: usize = 64;

/// Resolves a requested receive buffer size to the size actually read with.
pub fn resolve_buffer_size(requested: u32) -> Result<usize> {
    if i32::try_from(requested).is_err() {
        return Err(Error::ArgumentOutOfRange(requested));
    }

    let size = match requested as usize {
        0 => FALLBACK_BUFFER_SIZE,
        size => size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE),
    };
    Ok(size)
}

/// A received message and the TTL of the IP header it arrived in, when the
/// socket delivers one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub packet: Packet,
    pub ttl: Option<u8>,
}

/// Sends and receives ICMPv4 messages over one socket, closed on drop.
///
/// Nothing is locked internally: callers sharing one transport between
/// concurrent sends and receives must synchronize themselves, and replies are
/// not matched to requests.
#[derive(Debug)]
pub struct Transport {
    socket: Socket,
    ip_header: bool,
    policy: ChecksumPolicy,
}

impl Transport {
    /// Opens a raw IPv4/ICMP socket. This usually needs elevated privileges.
    pub fn new() -> Result<Transport> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        debug!("opened raw ICMPv4 socket");

        Ok(Transport {
            socket,
            ip_header: true,
            policy: ChecksumPolicy::default(),
        })
    }

    /// Adopts an open datagram socket whose reads yield bare ICMP messages,
    /// such as an unprivileged ICMP socket on Linux.
    pub fn from_socket(socket: Socket) -> Transport {
        Transport {
            socket,
            ip_header: false,
            policy: ChecksumPolicy::default(),
        }
    }

    /// Whether received datagrams start with an IPv4 header to strip.
    pub fn with_ip_header(mut self, included: bool) -> Transport {
        self.ip_header = included;
        self
    }

    pub fn with_checksum_policy(mut self, policy: ChecksumPolicy) -> Transport {
        self.policy = policy;
        self
    }

    pub fn set_ttl(&self, ttl: u32) -> Result<()> {
        self.socket.set_ttl(ttl)?;
        Ok(())
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket.set_write_timeout(timeout)?;
        Ok(())
    }

    pub fn send(&self, packet: &Packet, destination: IpAddr) -> Result<()> {
        let destination = match destination {
            IpAddr::V4(addr) => addr,
            other => return Err(Error::InvalidOperation(other)),
        };

        let buffer = packet.to_bytes();
        let addr = SockAddr::from(SocketAddrV4::new(destination, 0));
        let sent = self.socket.send_to(&buffer, &addr)?;
        debug!("sent {}/{} bytes to {}: {}", sent, buffer.len(), destination, packet.header());
        Ok(())
    }

    /// Blocks until one datagram arrives and parses it.
    pub fn receive(&self, buffer_size: u32) -> Result<Packet> {
        Ok(self.receive_datagram(buffer_size)?.packet)
    }

    pub fn receive_datagram(&self, buffer_size: u32) -> Result<Received> {
        let mut buffer = vec![0u8; resolve_buffer_size(buffer_size)?];
        let len = (&self.socket).read(&mut buffer)?;
        self.decode(&buffer[..len])
    }

    /// Waits for one datagram without blocking the thread. Cancelling
    /// `cancel` abandons the read and returns [`Error::Cancelled`].
    ///
    /// Must be awaited inside a tokio runtime with IO enabled; the socket is
    /// registered with that runtime's reactor and this panics without one.
    #[cfg(unix)]
    pub async fn receive_async(
        &self,
        buffer_size: u32,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Packet> {
        Ok(self.receive_datagram_async(buffer_size, cancel).await?.packet)
    }

    /// Like [`Transport::receive_async`], keeping the IP header's TTL. Same
    /// tokio runtime requirement.
    #[cfg(unix)]
    pub async fn receive_datagram_async(
        &self,
        buffer_size: u32,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Result<Received> {
        use tokio::io::unix::AsyncFd;

        let mut buffer = vec![0u8; resolve_buffer_size(buffer_size)?];
        let len = {
            let _mode = unix::NonBlocking::enable(&self.socket)?;
            let fd = AsyncFd::new(unix::Registered(&self.socket))?;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("receive cancelled");
                    return Err(Error::Cancelled);
                }
                len = unix::read_datagram(&fd, &mut buffer) => len?,
            }
        };
        self.decode(&buffer[..len])
    }

    fn decode(&self, datagram: &[u8]) -> Result<Received> {
        trace!("received {} bytes", datagram.len());

        let received = if self.ip_header {
            let (ip, icmp) = Ipv4Header::decode(datagram)?;
            trace!("ip header from {} ttl={}", ip.source, ip.ttl);
            Received {
                packet: Packet::parse_with(icmp, self.policy)?,
                ttl: Some(ip.ttl),
            }
        } else {
            Received {
                packet: Packet::parse_with(datagram, self.policy)?,
                ttl: None,
            }
        };
        Ok(received)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        debug!("closing ICMP socket");
    }
}

#[cfg(unix)]
mod unix {
    use std::io::{self, Read};
    use std::os::unix::io::{AsRawFd, RawFd};

    use log::warn;
    use socket2::Socket;
    use tokio::io::unix::AsyncFd;

    /// Borrows the transport's socket for one readiness registration.
    pub(super) struct Registered<'a>(pub(super) &'a Socket);

    impl AsRawFd for Registered<'_> {
        fn as_raw_fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }
    }

    /// Keeps the socket non-blocking while alive; blocking reads resume after.
    pub(super) struct NonBlocking<'a>(&'a Socket);

    impl<'a> NonBlocking<'a> {
        pub(super) fn enable(socket: &'a Socket) -> io::Result<NonBlocking<'a>> {
            socket.set_nonblocking(true)?;
            Ok(NonBlocking(socket))
        }
    }

    impl Drop for NonBlocking<'_> {
        fn drop(&mut self) {
            if let Err(err) = self.0.set_nonblocking(false) {
                warn!("could not restore blocking mode: {}", err);
            }
        }
    }

    pub(super) async fn read_datagram(
        fd: &AsyncFd<Registered<'_>>,
        buffer: &mut [u8],
    ) -> io::Result<usize> {
        loop {
            let mut guard = fd.readable().await?;
            match guard.try_io(|inner| {
                let mut socket = inner.get_ref().0;
                socket.read(buffer)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}
