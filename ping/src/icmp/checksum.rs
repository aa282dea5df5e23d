// Checksum (RFC 1071)
//      The checksum is the 16-bit ones's complement of the one's
//      complement sum of the ICMP message starting with the ICMP Type.
//      For computing the checksum, the checksum field should be zero.
//      If the total length is odd, the received data is padded with one
//      octet of zeros for computing the checksum.

use super::HEADER_SIZE;

/// 校验和: ICMP 报文 (头部 + 数据) 的校验和, 校验和字段按 0 计算.
///
/// An empty payload yields 0 rather than the checksum of the bare header.
pub fn checksum(
    raw_type: u8,
    raw_code: u8,
    identifier: u16,
    sequence_number: u16,
    payload: &[u8],
) -> u16 {
    if payload.is_empty() {
        return 0;
    }

    let mut header = [0u8; HEADER_SIZE];
    header[0] = raw_type;
    header[1] = raw_code;
    header[4..6].copy_from_slice(&identifier.to_be_bytes());
    header[6..8].copy_from_slice(&sequence_number.to_be_bytes());

    // The header is an even number of bytes, so the payload words line up
    // with the words of the whole message.
    let sum = words_sum(&header, 0);
    fold(words_sum(payload, sum))
}

/// RFC 1071 checksum over an arbitrary byte slice.
pub fn internet_checksum(buffer: &[u8]) -> u16 {
    fold(words_sum(buffer, 0))
}

fn words_sum(buffer: &[u8], mut sum: u32) -> u32 {
    // 将每两个字节 (16位) 相加, 若最后还剩一个字节, 低位补 0 继续相加
    for word in buffer.chunks(2) {
        let mut part = u16::from(word[0]) << 8;
        if word.len() > 1 {
            part += u16::from(word[1]);
        }
        sum = sum.wrapping_add(u32::from(part));
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    // 将和的高 16 位与低 16 位相加, 直到高 16 位为 0 为止
    while (sum >> 16) > 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    // 取反
    !sum as u16
}
