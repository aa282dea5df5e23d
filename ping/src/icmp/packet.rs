use super::{checksum, Code, DecodeResult, Header, MessageType, HEADER_SIZE};

use log::debug;

/// How a parsed packet's checksum decides [`Packet::is_valid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Echo replies (type 0) are reported valid without comparing the
    /// checksum; every other type is verified.
    #[default]
    TrustEchoReply,
    /// Every message type is verified.
    Strict,
}

/// An ICMP message: header plus owned payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: Header,
    payload: Vec<u8>,
    valid: bool,
}

impl Packet {
    pub fn create_raw(
        raw_type: u8,
        raw_code: u8,
        identifier: u16,
        sequence_number: u16,
        payload: Vec<u8>,
    ) -> Packet {
        let header = Header::from_semantic(raw_type, raw_code, identifier, sequence_number, &payload);
        Packet {
            header,
            payload,
            valid: true,
        }
    }

    pub fn create(
        message_type: MessageType,
        code: Code,
        identifier: u16,
        sequence_number: u16,
        payload: Vec<u8>,
    ) -> Packet {
        Packet::create_raw(
            message_type.into(),
            code.value(),
            identifier,
            sequence_number,
            payload,
        )
    }

    /// Parses wire bytes with [`ChecksumPolicy::TrustEchoReply`].
    ///
    /// A checksum mismatch is not an error, it shows up as
    /// `is_valid() == false`.
    pub fn parse(buffer: &[u8]) -> DecodeResult<Packet> {
        Packet::parse_with(buffer, ChecksumPolicy::default())
    }

    pub fn parse_with(buffer: &[u8], policy: ChecksumPolicy) -> DecodeResult<Packet> {
        let header = Header::decode(buffer)?;
        let payload = buffer[HEADER_SIZE..].to_vec();

        let trusted = policy == ChecksumPolicy::TrustEchoReply
            && header.message_type() == MessageType::EchoReply;
        let valid = trusted || {
            let expected = checksum(
                header.raw_type(),
                header.raw_code(),
                header.identifier(),
                header.sequence_number(),
                &payload,
            );
            if expected != header.checksum() {
                debug!(
                    "checksum mismatch: expected {:#06x}, got {:#06x} ({})",
                    expected,
                    header.checksum(),
                    header
                );
            }
            expected == header.checksum()
        };

        Ok(Packet {
            header,
            payload,
            valid,
        })
    }

    /// Header in network byte order followed by the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.wire_len());
        buffer.extend_from_slice(&self.header.encode());
        buffer.extend_from_slice(&self.payload);
        buffer
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Length on the wire, header included.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::DecodeError;
    use super::*;

    fn echo_payload() -> Vec<u8> {
        (1..=32).collect()
    }

    #[test]
    fn echo_request_round_trip() {
        let request = Packet::create(MessageType::EchoRequest, Code::NoCode, 1, 1, echo_payload());
        assert!(request.is_valid());

        let parsed = Packet::parse(&request.to_bytes()).unwrap();
        assert_eq!(parsed.header().message_type(), MessageType::EchoRequest);
        assert_eq!(parsed.header().identifier(), 1);
        assert_eq!(parsed.header().sequence_number(), 1);
        assert_eq!(parsed.header().checksum(), 0xf6ec);
        assert_eq!(parsed.payload(), &echo_payload()[..]);
        assert!(parsed.is_valid());
        assert_eq!(parsed, request);
    }

    #[test]
    fn round_trip_keeps_fields() {
        let cases: [(u8, u8, u16, u16, Vec<u8>); 5] = [
            (0, 0, 1, 1, echo_payload()),
            (3, 3, 0, 0, vec![0x45, 0, 0, 28]),
            (11, 0, 0xffff, 0x8000, vec![0xff; 17]),
            (13, 0, 42, 7, vec![]),
            (200, 9, 0xbeef, 0xcafe, vec![1]),
        ];
        for (raw_type, raw_code, identifier, sequence_number, payload) in cases {
            let packet = Packet::create_raw(raw_type, raw_code, identifier, sequence_number, payload.clone());
            for policy in [ChecksumPolicy::TrustEchoReply, ChecksumPolicy::Strict] {
                let parsed = Packet::parse_with(&packet.to_bytes(), policy).unwrap();
                assert_eq!(parsed.header(), packet.header());
                assert_eq!(parsed.payload(), &payload[..]);
                assert!(parsed.is_valid());
            }
        }
    }

    #[test]
    fn single_bit_flips_are_detected() {
        let bytes = Packet::create(MessageType::EchoRequest, Code::NoCode, 1, 1, echo_payload()).to_bytes();
        for index in 0..bytes.len() {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[index] ^= 1 << bit;
                if tampered[0] == 0 {
                    // Turned into an echo reply, which skips verification.
                    continue;
                }
                let parsed = Packet::parse(&tampered).unwrap();
                assert!(!parsed.is_valid(), "flip of bit {} in byte {}", bit, index);
            }
        }
    }

    #[test]
    fn echo_reply_skips_verification() {
        let mut bytes = Packet::create(MessageType::EchoReply, Code::NoCode, 1, 1, echo_payload()).to_bytes();
        bytes[2] ^= 0xff;
        assert!(Packet::parse(&bytes).unwrap().is_valid());
        assert!(!Packet::parse_with(&bytes, ChecksumPolicy::Strict).unwrap().is_valid());
    }

    #[test]
    fn minimum_length() {
        for len in 0..HEADER_SIZE {
            assert_eq!(
                Packet::parse(&vec![8u8; len]),
                Err(DecodeError::InvalidSize { len, min: HEADER_SIZE })
            );
        }

        let packet = Packet::parse(&[8, 0, 0, 0, 0, 1, 0, 1]).unwrap();
        assert!(packet.payload().is_empty());
        assert_eq!(packet.wire_len(), HEADER_SIZE);
        // Empty payloads checksum to 0.
        assert!(packet.is_valid());

        let packet = Packet::parse(&[8, 0, 0x12, 0x34, 0, 1, 0, 1]).unwrap();
        assert!(!packet.is_valid());
    }

    #[test]
    fn enum_overload_narrows_to_bytes() {
        let packet = Packet::create(MessageType::DestinationUnreachable, Code::PortUnreachable, 0, 0, vec![1, 2, 3]);
        assert_eq!(packet.header().raw_type(), 3);
        assert_eq!(packet.header().raw_code(), 3);
        assert_eq!(packet.header().code(), Code::PortUnreachable);
        assert_eq!(packet.header().checksum(), 0xf8fa);
    }

    #[test]
    fn serialized_layout() {
        let packet = Packet::create_raw(8, 0, 0x0102, 0x0304, vec![0xaa, 0xbb]);
        let bytes = packet.to_bytes();
        let checksum = packet.header().checksum().to_be_bytes();
        assert_eq!(bytes, vec![8, 0, checksum[0], checksum[1], 1, 2, 3, 4, 0xaa, 0xbb]);
        assert_eq!(packet.into_payload(), vec![0xaa, 0xbb]);
    }
}
