// ICMPv4 header
//  |       0       |       1       |       2       |       3       |
//  |0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7|
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |     Type      |      Code     |           Checksum            |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |           Identifier          |        Sequence Number        |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

use super::{checksum, DecodeError, DecodeResult, HEADER_SIZE};

use std::fmt::{self, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    EchoReply,
    DestinationUnreachable,
    SourceQuench,
    Redirect,
    EchoRequest,
    RouterAdvertisement,
    RouterSolicitation,
    TimeExceeded,
    ParameterProblem,
    Timestamp,
    TimestampReply,
    InformationRequest,
    InformationReply,
    AddressMaskRequest,
    AddressMaskReply,
    Unknown(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        use MessageType::*;
        match value {
            0 => EchoReply,
            3 => DestinationUnreachable,
            4 => SourceQuench,
            5 => Redirect,
            8 => EchoRequest,
            9 => RouterAdvertisement,
            10 => RouterSolicitation,
            11 => TimeExceeded,
            12 => ParameterProblem,
            13 => Timestamp,
            14 => TimestampReply,
            15 => InformationRequest,
            16 => InformationReply,
            17 => AddressMaskRequest,
            18 => AddressMaskReply,
            other => Unknown(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(message_type: MessageType) -> Self {
        use MessageType::*;
        match message_type {
            EchoReply => 0,
            DestinationUnreachable => 3,
            SourceQuench => 4,
            Redirect => 5,
            EchoRequest => 8,
            RouterAdvertisement => 9,
            RouterSolicitation => 10,
            TimeExceeded => 11,
            ParameterProblem => 12,
            Timestamp => 13,
            TimestampReply => 14,
            InformationRequest => 15,
            InformationReply => 16,
            AddressMaskRequest => 17,
            AddressMaskReply => 18,
            Unknown(other) => other,
        }
    }
}

/// Meaning of the code byte. Which variants are reachable depends on the
/// message type, see [`derive_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    NoCode,

    // Destination Unreachable
    NetUnreachable,
    HostUnreachable,
    ProtocolUnreachable,
    PortUnreachable,
    FragmentationNeeded,
    SourceRouteFailed,
    DestinationNetworkUnknown,
    DestinationHostUnknown,
    SourceHostIsolated,
    NetworkAdministrativelyProhibited,
    HostAdministrativelyProhibited,

    // Redirect
    RedirectNetwork,
    RedirectHost,
    RedirectTypeOfServiceNetwork,
    RedirectTypeOfServiceHost,

    // Time Exceeded
    TtlExceededInTransit,
    FragmentReassemblyTimeExceeded,

    // Parameter Problem
    PointerIndicatesError,
    MissingRequiredOption,
}

impl Code {
    /// Codes outside the lookup table share the value of `NoCode`.
    pub const UNKNOWN: Code = Code::NoCode;

    /// The raw code byte this variant is carried as on the wire.
    pub fn value(self) -> u8 {
        use Code::*;
        match self {
            NoCode => 0,
            NetUnreachable => 0,
            HostUnreachable => 1,
            ProtocolUnreachable => 2,
            PortUnreachable => 3,
            FragmentationNeeded => 4,
            SourceRouteFailed => 5,
            DestinationNetworkUnknown => 6,
            DestinationHostUnknown => 7,
            SourceHostIsolated => 8,
            NetworkAdministrativelyProhibited => 9,
            HostAdministrativelyProhibited => 10,
            RedirectNetwork => 0,
            RedirectHost => 1,
            RedirectTypeOfServiceNetwork => 2,
            RedirectTypeOfServiceHost => 3,
            TtlExceededInTransit => 0,
            FragmentReassemblyTimeExceeded => 1,
            PointerIndicatesError => 0,
            MissingRequiredOption => 1,
        }
    }
}

/// Maps a (type, raw code) pair to its named code. Pairs without an entry,
/// including every type that defines no codes, map to [`Code::UNKNOWN`].
pub fn derive_code(message_type: MessageType, raw_code: u8) -> Code {
    use Code::*;
    match (message_type, raw_code) {
        (MessageType::DestinationUnreachable, 0) => NetUnreachable,
        (MessageType::DestinationUnreachable, 1) => HostUnreachable,
        (MessageType::DestinationUnreachable, 2) => ProtocolUnreachable,
        (MessageType::DestinationUnreachable, 3) => PortUnreachable,
        (MessageType::DestinationUnreachable, 4) => FragmentationNeeded,
        (MessageType::DestinationUnreachable, 5) => SourceRouteFailed,
        (MessageType::DestinationUnreachable, 6) => DestinationNetworkUnknown,
        (MessageType::DestinationUnreachable, 7) => DestinationHostUnknown,
        (MessageType::DestinationUnreachable, 8) => SourceHostIsolated,
        (MessageType::DestinationUnreachable, 9) => NetworkAdministrativelyProhibited,
        (MessageType::DestinationUnreachable, 10) => HostAdministrativelyProhibited,

        (MessageType::Redirect, 0) => RedirectNetwork,
        (MessageType::Redirect, 1) => RedirectHost,
        (MessageType::Redirect, 2) => RedirectTypeOfServiceNetwork,
        (MessageType::Redirect, 3) => RedirectTypeOfServiceHost,

        (MessageType::TimeExceeded, 0) => TtlExceededInTransit,
        (MessageType::TimeExceeded, 1) => FragmentReassemblyTimeExceeded,

        (MessageType::ParameterProblem, 0) => PointerIndicatesError,
        (MessageType::ParameterProblem, 1) => MissingRequiredOption,

        _ => Code::UNKNOWN,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    raw_type: u8,
    raw_code: u8,
    checksum: u16,
    identifier: u16,
    sequence_number: u16,
}

impl Header {
    /// Takes every field as given, the checksum included.
    pub fn from_raw(
        raw_type: u8,
        raw_code: u8,
        checksum: u16,
        identifier: u16,
        sequence_number: u16,
    ) -> Header {
        Header {
            raw_type,
            raw_code,
            checksum,
            identifier,
            sequence_number,
        }
    }

    /// Computes the checksum over the fields and `payload`.
    pub fn from_semantic(
        raw_type: u8,
        raw_code: u8,
        identifier: u16,
        sequence_number: u16,
        payload: &[u8],
    ) -> Header {
        Header {
            raw_type,
            raw_code,
            checksum: checksum(raw_type, raw_code, identifier, sequence_number, payload),
            identifier,
            sequence_number,
        }
    }

    pub fn decode(buffer: &[u8]) -> DecodeResult<Header> {
        if buffer.len() < HEADER_SIZE {
            return Err(DecodeError::InvalidSize {
                len: buffer.len(),
                min: HEADER_SIZE,
            });
        }

        Ok(Header {
            raw_type: buffer[0],
            raw_code: buffer[1],
            checksum: u16::from_be_bytes([buffer[2], buffer[3]]),
            identifier: u16::from_be_bytes([buffer[4], buffer[5]]),
            sequence_number: u16::from_be_bytes([buffer[6], buffer[7]]),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buffer = [0u8; HEADER_SIZE];
        buffer[0] = self.raw_type;
        buffer[1] = self.raw_code;
        buffer[2..4].copy_from_slice(&self.checksum.to_be_bytes());
        buffer[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        buffer[6..8].copy_from_slice(&self.sequence_number.to_be_bytes());
        buffer
    }

    pub fn raw_type(&self) -> u8 {
        self.raw_type
    }

    pub fn raw_code(&self) -> u8 {
        self.raw_code
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from(self.raw_type)
    }

    pub fn code(&self) -> Code {
        derive_code(self.message_type(), self.raw_code)
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn identifier(&self) -> u16 {
        self.identifier
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} ({}/{}) {:?} id={} seq={} checksum={:#06x}",
            self.message_type(),
            self.raw_type,
            self.raw_code,
            self.code(),
            self.identifier,
            self.sequence_number,
            self.checksum
        )
    }
}
