use std::net::IpAddr;
use std::time::{Duration, Instant};

use log::debug;

use crate::error::Result;
use crate::icmp::{Code, MessageType, Packet, HEADER_SIZE};
use crate::ip::MIN_HEADER_SIZE;
use crate::transport::Transport;

pub const ECHO_PAYLOAD_SIZE: usize = 32;
pub const ECHO_IDENTIFIER: u16 = 1;
pub const ECHO_SEQUENCE_NUMBER: u16 = 1;
/// Room for an IPv4 header, the ICMP header and the echoed payload.
pub const REPLY_BUFFER_SIZE: u32 = (MIN_HEADER_SIZE + HEADER_SIZE + ECHO_PAYLOAD_SIZE) as u32;

/// Bytes `1..=32`, recognizable when echoed back.
pub fn echo_payload() -> Vec<u8> {
    (1..=ECHO_PAYLOAD_SIZE as u8).collect()
}

pub fn echo_request() -> Packet {
    Packet::create(
        MessageType::EchoRequest,
        Code::NoCode,
        ECHO_IDENTIFIER,
        ECHO_SEQUENCE_NUMBER,
        echo_payload(),
    )
}

/// Outcome of one request/reply exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub rtt: Duration,
    pub reply: Packet,
    pub ttl: Option<u8>,
}

/// Sends one echo request and waits for a reply on a socket opened for the
/// call. The first datagram received stops the clock, whatever it contains.
pub fn ping(destination: IpAddr) -> Result<Duration> {
    let transport = Transport::new()?;
    Ok(ping_with(&transport, destination, &echo_request())?.rtt)
}

#[cfg(unix)]
pub async fn ping_async(
    destination: IpAddr,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Duration> {
    let transport = Transport::new()?;
    Ok(ping_with_async(&transport, destination, &echo_request(), cancel).await?.rtt)
}

pub fn ping_with(transport: &Transport, destination: IpAddr, request: &Packet) -> Result<Echo> {
    let timer = Instant::now();
    transport.send(request, destination)?;
    let received = transport.receive_datagram(REPLY_BUFFER_SIZE)?;
    let rtt = timer.elapsed();

    debug!("reply from {} after {:?}: {}", destination, rtt, received.packet.header());
    Ok(Echo {
        rtt,
        reply: received.packet,
        ttl: received.ttl,
    })
}

#[cfg(unix)]
pub async fn ping_with_async(
    transport: &Transport,
    destination: IpAddr,
    request: &Packet,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<Echo> {
    let timer = Instant::now();
    transport.send(request, destination)?;
    let received = transport
        .receive_datagram_async(REPLY_BUFFER_SIZE, cancel)
        .await?;
    let rtt = timer.elapsed();

    debug!("reply from {} after {:?}: {}", destination, rtt, received.packet.header());
    Ok(Echo {
        rtt,
        reply: received.packet,
        ttl: received.ttl,
    })
}
