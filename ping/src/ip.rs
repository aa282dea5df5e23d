// IPv4 header (RFC 791), as delivered in front of ICMP messages read from a
// raw socket.
//  |       0       |       1       |       2       |       3       |
//  |0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7|
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |Version|  IHL  |Type of Service|          Total Length         |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |         Identification        |Flags|      Fragment Offset    |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |  Time to Live |    Protocol   |         Header Checksum       |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                       Source Address                          |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                    Destination Address                        |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                    Options                    |    Padding    |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

use crate::icmp::{DecodeError, DecodeResult};

use std::net::Ipv4Addr;

pub const MIN_HEADER_SIZE: usize = 20;
pub const PROTOCOL_ICMP: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub header_len: usize,
    pub total_len: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Splits a datagram into its header and the bytes it carries.
    ///
    /// Some stacks report a total length that disagrees with what was read,
    /// so the carried bytes are everything after the header.
    pub fn decode(buffer: &[u8]) -> DecodeResult<(Ipv4Header, &[u8])> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(DecodeError::InvalidSize {
                len: buffer.len(),
                min: MIN_HEADER_SIZE,
            });
        }

        if buffer[0] >> 4 != 4 {
            return Err(DecodeError::InvalidIpHeader("not an IPv4 datagram"));
        }

        let header_len = usize::from(buffer[0] & 0x0f) * 4;
        if header_len < MIN_HEADER_SIZE {
            return Err(DecodeError::InvalidIpHeader("header length below 20 bytes"));
        }
        if buffer.len() < header_len {
            return Err(DecodeError::InvalidSize {
                len: buffer.len(),
                min: header_len,
            });
        }

        let header = Ipv4Header {
            header_len,
            total_len: u16::from_be_bytes([buffer[2], buffer[3]]),
            ttl: buffer[8],
            protocol: buffer[9],
            source: Ipv4Addr::new(buffer[12], buffer[13], buffer[14], buffer[15]),
            destination: Ipv4Addr::new(buffer[16], buffer[17], buffer[18], buffer[19]),
        };

        Ok((header, &buffer[header_len..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram(ihl: u8, icmp: &[u8]) -> Vec<u8> {
        let header_len = usize::from(ihl) * 4;
        let total = (header_len + icmp.len()) as u16;
        let mut buffer = vec![0u8; header_len];
        buffer[0] = 0x40 | ihl;
        buffer[2..4].copy_from_slice(&total.to_be_bytes());
        buffer[8] = 57;
        buffer[9] = PROTOCOL_ICMP;
        buffer[12..16].copy_from_slice(&[8, 8, 8, 8]);
        buffer[16..20].copy_from_slice(&[192, 168, 1, 10]);
        buffer.extend_from_slice(icmp);
        buffer
    }

    #[test]
    fn strips_plain_header() {
        let icmp = [0u8, 0, 0xfe, 0xec, 0, 1, 0, 1];
        let bytes = datagram(5, &icmp);
        let (header, data) = Ipv4Header::decode(&bytes).unwrap();
        assert_eq!(header.header_len, 20);
        assert_eq!(header.total_len, 28);
        assert_eq!(header.ttl, 57);
        assert_eq!(header.protocol, PROTOCOL_ICMP);
        assert_eq!(header.source, Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(header.destination, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(data, &icmp[..]);
    }

    #[test]
    fn strips_options() {
        let icmp = [8u8, 0, 0, 0, 0, 0, 0, 0, 9];
        let bytes = datagram(7, &icmp);
        let (header, data) = Ipv4Header::decode(&bytes).unwrap();
        assert_eq!(header.header_len, 28);
        assert_eq!(data, &icmp[..]);
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(
            Ipv4Header::decode(&[0x45; 10]),
            Err(DecodeError::InvalidSize { len: 10, min: MIN_HEADER_SIZE })
        );

        let mut bytes = datagram(5, &[]);
        bytes[0] = 0x65;
        assert_eq!(
            Ipv4Header::decode(&bytes),
            Err(DecodeError::InvalidIpHeader("not an IPv4 datagram"))
        );

        bytes[0] = 0x44;
        assert!(matches!(
            Ipv4Header::decode(&bytes),
            Err(DecodeError::InvalidIpHeader(_))
        ));

        bytes[0] = 0x4f;
        assert_eq!(
            Ipv4Header::decode(&bytes),
            Err(DecodeError::InvalidSize { len: 20, min: 60 })
        );
    }
}
